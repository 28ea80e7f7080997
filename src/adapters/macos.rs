use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tracing::{info, warn};

use super::command::{run, run_blocking};
use super::{
    CONTAINER_ENCRYPTION, CONTAINER_FILESYSTEM, Credential, DriverError, ImageRequest,
    VolumeDriver,
};

const HDIUTIL: &str = "hdiutil";

/// Drives `hdiutil` to manage encrypted sparsebundles.
pub struct HdiutilDriver;

fn stdin_for(credential: &Credential) -> Option<&str> {
    match credential {
        Credential::Interactive => None,
        Credential::Passphrase(p) => Some(p.as_str()),
    }
}

#[async_trait]
impl VolumeDriver for HdiutilDriver {
    fn name(&self) -> &'static str {
        "hdiutil"
    }

    async fn create_image(&self, request: &ImageRequest) -> Result<(), DriverError> {
        if request.path.exists() {
            warn!(path = %request.path.display(), "Sparsebundle already exists");
            return Err(DriverError::AlreadyExists(request.path.clone()));
        }

        let mut args: Vec<OsString> = vec![
            "create".into(),
            "-size".into(),
            format!("{}m", request.size_mb).into(),
            "-fs".into(),
            CONTAINER_FILESYSTEM.into(),
            "-volname".into(),
            request.volume_name.clone().into(),
            "-type".into(),
            "SPARSEBUNDLE".into(),
            "-encryption".into(),
            CONTAINER_ENCRYPTION.into(),
        ];
        if matches!(request.credential, Credential::Passphrase(_)) {
            args.push("-stdinpass".into());
        }
        args.push(request.path.clone().into_os_string());

        run(
            HDIUTIL,
            args,
            stdin_for(&request.credential),
            "Creating sparsebundle",
        )
        .await?;
        Ok(())
    }

    async fn attach(
        &self,
        image: &Path,
        mount_point: &Path,
        credential: &Credential,
    ) -> Result<(), DriverError> {
        if !image.exists() {
            return Err(DriverError::NotFound(image.to_path_buf()));
        }

        let mut args: Vec<OsString> = vec![
            "attach".into(),
            image.as_os_str().to_os_string(),
            "-mountpoint".into(),
            mount_point.as_os_str().to_os_string(),
        ];
        if matches!(credential, Credential::Passphrase(_)) {
            args.push("-stdinpass".into());
        }

        run(HDIUTIL, args, stdin_for(credential), "Mounting sparsebundle").await?;
        info!(mount_point = %mount_point.display(), "Sparsebundle mounted");
        Ok(())
    }

    async fn detach(&self, mount_point: &Path) -> Result<(), DriverError> {
        run(
            HDIUTIL,
            [
                OsStr::new("detach"),
                mount_point.as_os_str(),
                OsStr::new("-force"),
            ],
            Some(""),
            "Unmounting sparsebundle",
        )
        .await?;
        Ok(())
    }

    fn detach_blocking(&self, mount_point: &Path) -> Result<(), DriverError> {
        run_blocking(
            HDIUTIL,
            [
                OsStr::new("detach"),
                mount_point.as_os_str(),
                OsStr::new("-force"),
            ],
            "Unmounting sparsebundle",
        )
    }
}
