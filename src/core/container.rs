//! Evidence container lifecycle: absent → created → mounted → detached.
//!
//! A mounted container is held as a [`MountedContainer`] guard. Releasing it
//! with [`MountedContainer::unmount`] reports the detach result; dropping it
//! without releasing (early return, panic) still force-detaches through the
//! driver's blocking path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapters::{Credential, DriverError, ImageRequest, VolumeDriver};
use crate::core::models::ContainerState;

/// File extension of evidence containers
pub const CONTAINER_EXTENSION: &str = "sparsebundle";

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("cannot {action} container {} in state {state}", path.display())]
    InvalidTransition {
        path: PathBuf,
        state: ContainerState,
        action: &'static str,
    },

    #[error("failed to {action} container {}: {source}", path.display())]
    Driver {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: DriverError,
    },
}

/// Handle on one evidence container
#[derive(Debug, Clone)]
pub struct Container {
    name: String,
    path: PathBuf,
    state: ContainerState,
}

impl Container {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }
}

/// Creates, mounts and detaches containers through a [`VolumeDriver`].
#[derive(Clone)]
pub struct ContainerManager {
    driver: Arc<dyn VolumeDriver>,
    mount_point: PathBuf,
    credential: Credential,
}

impl ContainerManager {
    pub fn new(driver: Arc<dyn VolumeDriver>, mount_point: PathBuf, credential: Credential) -> Self {
        Self {
            driver,
            mount_point,
            credential,
        }
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Path a container named `name` would occupy under `destination_dir`
    pub fn container_path(destination_dir: &Path, name: &str) -> PathBuf {
        destination_dir.join(format!("{}.{}", name, CONTAINER_EXTENSION))
    }

    /// Handle on an existing path without creating anything. The state is
    /// `Created` if something is there, `Absent` otherwise.
    pub fn open(&self, path: &Path) -> Container {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let state = if path.exists() {
            ContainerState::Created
        } else {
            ContainerState::Absent
        };

        Container {
            name,
            path: path.to_path_buf(),
            state,
        }
    }

    /// Create `<destination_dir>/<name>.sparsebundle`. Never overwrites.
    pub async fn create(
        &self,
        destination_dir: &Path,
        name: &str,
        size_mb: u64,
    ) -> Result<Container, ContainerError> {
        let path = Self::container_path(destination_dir, name);
        info!(name, size_mb, path = %path.display(), "Creating sparsebundle");

        if path.exists() {
            warn!(path = %path.display(), "Sparsebundle already exists");
            return Err(ContainerError::Driver {
                path: path.clone(),
                action: "create",
                source: DriverError::AlreadyExists(path),
            });
        }

        let request = ImageRequest {
            path: path.clone(),
            volume_name: name.to_string(),
            size_mb,
            credential: self.credential.clone(),
        };

        self.driver
            .create_image(&request)
            .await
            .map_err(|source| ContainerError::Driver {
                path: path.clone(),
                action: "create",
                source,
            })?;

        Ok(Container {
            name: name.to_string(),
            path,
            state: ContainerState::Created,
        })
    }

    /// Attach a created container at the fixed mount point.
    pub async fn mount(&self, mut container: Container) -> Result<MountedContainer, ContainerError> {
        if container.state != ContainerState::Created {
            error!(
                path = %container.path.display(),
                state = %container.state,
                "Refusing to mount container"
            );
            return Err(ContainerError::InvalidTransition {
                path: container.path,
                state: container.state,
                action: "mount",
            });
        }

        info!(path = %container.path.display(), "Mounting sparsebundle");
        self.driver
            .attach(&container.path, &self.mount_point, &self.credential)
            .await
            .map_err(|source| ContainerError::Driver {
                path: container.path.clone(),
                action: "mount",
                source,
            })?;

        container.state = ContainerState::Mounted;
        Ok(MountedContainer {
            driver: self.driver.clone(),
            mount_point: self.mount_point.clone(),
            container: Some(container),
        })
    }
}

/// A container attached at a mount point. Detached on `unmount` or on drop.
pub struct MountedContainer {
    driver: Arc<dyn VolumeDriver>,
    mount_point: PathBuf,
    // Taken on explicit release so Drop knows there is nothing left to do
    container: Option<Container>,
}

impl std::fmt::Debug for MountedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedContainer")
            .field("mount_point", &self.mount_point)
            .field("container", &self.container)
            .finish()
    }
}

impl MountedContainer {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn container_path(&self) -> &Path {
        self.container
            .as_ref()
            .map(|c| c.path.as_path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// Force-detach and hand back the container in the `Detached` state.
    pub async fn unmount(mut self) -> Result<Container, ContainerError> {
        let Some(mut container) = self.container.take() else {
            return Err(ContainerError::InvalidTransition {
                path: self.mount_point.clone(),
                state: ContainerState::Detached,
                action: "unmount",
            });
        };

        info!(mount_point = %self.mount_point.display(), "Unmounting sparsebundle");
        self.driver
            .detach(&self.mount_point)
            .await
            .map_err(|source| ContainerError::Driver {
                path: container.path.clone(),
                action: "unmount",
                source,
            })?;

        container.state = ContainerState::Detached;
        Ok(container)
    }
}

impl Drop for MountedContainer {
    fn drop(&mut self) {
        let Some(container) = self.container.take() else {
            return;
        };

        warn!(
            path = %container.path.display(),
            mount_point = %self.mount_point.display(),
            "Container dropped while mounted, forcing detach"
        );
        if let Err(e) = self.driver.detach_blocking(&self.mount_point) {
            error!(
                mount_point = %self.mount_point.display(),
                error = %e,
                "Failed to detach container"
            );
        }
    }
}
