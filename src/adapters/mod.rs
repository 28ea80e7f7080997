//! Volume drivers: the OS-facing side of evidence containers.
//!
//! The pipeline only talks to [`VolumeDriver`]; `hdiutil` on macOS and a
//! filesystem-backed simulation elsewhere implement it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod command;
#[cfg(target_os = "macos")]
mod macos;
mod simulated;

#[cfg(target_os = "macos")]
pub use macos::HdiutilDriver;
pub use simulated::SimulatedDriver;

/// Filesystem the container is formatted with
pub const CONTAINER_FILESYSTEM: &str = "HFS+J";
/// Encryption applied to every container
pub const CONTAINER_ENCRYPTION: &str = "AES-256";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("container already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("no container at {}", .0.display())]
    NotFound(PathBuf),

    #[error("mount point {} is already in use", .0.display())]
    MountPointBusy(PathBuf),

    #[error("nothing is mounted at {}", .0.display())]
    NotMounted(PathBuf),

    #[error("destination already exists: {}. Refusing to overwrite.", .0.display())]
    DestinationExists(PathBuf),

    #[error("{program} exited with code {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("driver is not available on this platform: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How the container's encryption passphrase is supplied.
#[derive(Clone, Default)]
pub enum Credential {
    /// The driver asks the operator directly
    #[default]
    Interactive,
    /// Passphrase piped to the driver
    Passphrase(String),
}

impl Credential {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Passphrase(_) => "passphrase",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interactive => f.write_str("Interactive"),
            Self::Passphrase(_) => f.write_str("Passphrase(<redacted>)"),
        }
    }
}

/// Parameters for a new sparse, encrypted image
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub path: PathBuf,
    pub volume_name: String,
    pub size_mb: u64,
    pub credential: Credential,
}

#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Short driver name for logs
    fn name(&self) -> &'static str;

    /// Create a sparse, growable, encrypted image. Must not overwrite.
    async fn create_image(&self, request: &ImageRequest) -> Result<(), DriverError>;

    /// Attach an image at `mount_point`.
    async fn attach(
        &self,
        image: &Path,
        mount_point: &Path,
        credential: &Credential,
    ) -> Result<(), DriverError>;

    /// Force-detach whatever is mounted at `mount_point`.
    async fn detach(&self, mount_point: &Path) -> Result<(), DriverError>;

    /// Blocking detach, used when a mounted container is dropped without
    /// being released.
    fn detach_blocking(&self, mount_point: &Path) -> Result<(), DriverError>;
}

/// Pick the volume driver for this host.
///
/// Real containers need macOS; anything else is refused unless simulation is on.
pub fn get_driver(simulation: bool) -> Result<Box<dyn VolumeDriver>, DriverError> {
    if simulation {
        return Ok(Box::new(SimulatedDriver::new()));
    }

    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(HdiutilDriver))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(DriverError::Unsupported(format!(
            "encrypted sparsebundles require macOS (running on {}); use --simulation",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts() {
        let cred = Credential::Passphrase("hunter2".to_string());
        let shown = format!("{:?}", cred);
        assert!(!shown.contains("hunter2"));
        assert_eq!(cred.mode(), "passphrase");
    }

    #[test]
    fn test_simulation_driver_always_available() {
        let driver = get_driver(true).unwrap();
        assert_eq!(driver.name(), "simulated");
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_real_driver_refused_off_macos() {
        let err = get_driver(false).err().unwrap();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }
}
