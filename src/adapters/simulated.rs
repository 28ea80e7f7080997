use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{
    CONTAINER_ENCRYPTION, CONTAINER_FILESYSTEM, Credential, DriverError, ImageRequest,
    VolumeDriver,
};

/// Descriptor stored at the root of a simulated image
const DESCRIPTOR_FILE: &str = "bundle.toml";
/// Data directory inside a simulated image while it is detached
const VOLUME_DIR: &str = "volume";

#[derive(Debug, Serialize, Deserialize)]
struct BundleDescriptor {
    volume_name: String,
    size_mb: u64,
    filesystem: String,
    encryption: String,
    credential: String,
}

/// Filesystem-backed stand-in for `hdiutil`.
///
/// An image is a directory holding a descriptor and a `volume/` data
/// directory. Attaching moves `volume/` to the mount point and detaching moves
/// it back, so copied evidence persists in the image across mounts.
#[derive(Clone, Default)]
pub struct SimulatedDriver {
    // mount point -> image
    mounts: Arc<Mutex<HashMap<PathBuf, PathBuf>>>,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data directory of a detached image
    pub fn volume_path(image: &Path) -> PathBuf {
        image.join(VOLUME_DIR)
    }

    /// Whether anything is attached at `mount_point`
    pub fn is_mounted(&self, mount_point: &Path) -> bool {
        self.lock_mounts().contains_key(mount_point)
    }

    fn lock_mounts(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, PathBuf>> {
        // A poisoned map is still structurally valid
        self.mounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_sync(request: &ImageRequest) -> Result<(), DriverError> {
        if request.path.exists() {
            warn!(path = %request.path.display(), "Sparsebundle already exists");
            return Err(DriverError::AlreadyExists(request.path.clone()));
        }

        fs::create_dir_all(Self::volume_path(&request.path))?;

        let descriptor = BundleDescriptor {
            volume_name: request.volume_name.clone(),
            size_mb: request.size_mb,
            filesystem: CONTAINER_FILESYSTEM.to_string(),
            encryption: CONTAINER_ENCRYPTION.to_string(),
            credential: request.credential.mode().to_string(),
        };
        let content = toml::to_string_pretty(&descriptor)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(request.path.join(DESCRIPTOR_FILE), content)?;

        info!(
            path = %request.path.display(),
            size_mb = request.size_mb,
            "(Simulated) Created sparsebundle"
        );
        Ok(())
    }

    fn detach_sync(&self, mount_point: &Path) -> Result<(), DriverError> {
        let mut mounts = self.lock_mounts();
        let image = mounts
            .get(mount_point)
            .cloned()
            .ok_or_else(|| DriverError::NotMounted(mount_point.to_path_buf()))?;

        fs::rename(mount_point, Self::volume_path(&image))?;
        mounts.remove(mount_point);

        info!(mount_point = %mount_point.display(), "(Simulated) Detached");
        Ok(())
    }
}

#[async_trait]
impl VolumeDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create_image(&self, request: &ImageRequest) -> Result<(), DriverError> {
        let request = request.clone();
        tokio::task::spawn_blocking(move || Self::create_sync(&request)).await?
    }

    async fn attach(
        &self,
        image: &Path,
        mount_point: &Path,
        _credential: &Credential,
    ) -> Result<(), DriverError> {
        let mut mounts = self.lock_mounts();

        if !image.join(DESCRIPTOR_FILE).is_file() {
            return Err(DriverError::NotFound(image.to_path_buf()));
        }
        if mounts.contains_key(mount_point) || mount_point.exists() {
            return Err(DriverError::MountPointBusy(mount_point.to_path_buf()));
        }

        let volume = Self::volume_path(image);
        if !volume.is_dir() {
            // Volume already moved out: the image is attached elsewhere
            return Err(DriverError::MountPointBusy(mount_point.to_path_buf()));
        }

        if let Some(parent) = mount_point.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&volume, mount_point)?;
        mounts.insert(mount_point.to_path_buf(), image.to_path_buf());

        debug!(image = %image.display(), "(Simulated) Volume moved to mount point");
        info!(mount_point = %mount_point.display(), "Sparsebundle mounted");
        Ok(())
    }

    async fn detach(&self, mount_point: &Path) -> Result<(), DriverError> {
        self.detach_sync(mount_point)
    }

    fn detach_blocking(&self, mount_point: &Path) -> Result<(), DriverError> {
        self.detach_sync(mount_point)
    }
}
