#![allow(dead_code)]

use async_trait::async_trait;
use fsbc::adapters::{Credential, DriverError, ImageRequest, SimulatedDriver, VolumeDriver};
use fsbc::config::AppConfig;
use fsbc::context::AppContext;
use fsbc::core::transfer_engine::{CopyEngine, CopyEngineType, NativeCopyEngine};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Temp layout shared by pipeline tests: sources, a destination and a mount point.
pub struct Workspace {
    pub temp: TempDir,
    pub sources: PathBuf,
    pub destination: PathBuf,
    pub mount_point: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let sources = temp.path().join("sources");
        let destination = temp.path().join("cases");
        fs::create_dir(&sources).unwrap();
        fs::create_dir(&destination).unwrap();
        let mount_point = temp.path().join("Volumes").join("ForensicData");

        Self {
            temp,
            sources,
            destination,
            mount_point,
        }
    }

    pub fn source_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.sources.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            mount_point: Some(self.mount_point.clone()),
            log_directory: self.temp.path().join("logs"),
            simulation: true,
            copy_engine: CopyEngineType::Native,
            ..Default::default()
        }
    }

    pub fn context(&self, driver: Arc<dyn VolumeDriver>) -> AppContext {
        AppContext::new(self.config(), driver)
    }

    /// The single container created under the destination, if any
    pub fn containers(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.destination)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }
}

/// Copies like the native engine but fails for one file name.
pub struct FailingEngine {
    pub inner: NativeCopyEngine,
    pub fail_on: String,
}

impl FailingEngine {
    pub fn new(fail_on: &str) -> Self {
        Self {
            inner: NativeCopyEngine::default(),
            fail_on: fail_on.to_string(),
        }
    }
}

#[async_trait]
impl CopyEngine for FailingEngine {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn copy_item(&self, source: &Path, destination: &Path) -> Result<(), DriverError> {
        if source.file_name().is_some_and(|n| n == self.fail_on.as_str()) {
            return Err(DriverError::CommandFailed {
                program: "ditto".to_string(),
                code: Some(1),
                stderr: "simulated copy failure".to_string(),
            });
        }
        self.inner.copy_item(source, destination).await
    }
}

/// Copies correctly, then appends garbage to one copied file.
pub struct CorruptingEngine {
    pub inner: NativeCopyEngine,
    pub corrupt: String,
}

impl CorruptingEngine {
    pub fn new(corrupt: &str) -> Self {
        Self {
            inner: NativeCopyEngine::default(),
            corrupt: corrupt.to_string(),
        }
    }
}

#[async_trait]
impl CopyEngine for CorruptingEngine {
    fn name(&self) -> &'static str {
        "corrupting"
    }

    async fn copy_item(&self, source: &Path, destination: &Path) -> Result<(), DriverError> {
        self.inner.copy_item(source, destination).await?;

        let target = if destination.is_dir() {
            destination.join(&self.corrupt)
        } else {
            destination.to_path_buf()
        };
        if target.file_name().is_some_and(|n| n == self.corrupt.as_str()) {
            let mut file = OpenOptions::new().append(true).open(&target)?;
            file.write_all(b"tampered")?;
        }
        Ok(())
    }
}

/// Simulated driver whose async detach always fails.
#[derive(Default)]
pub struct StuckDriver {
    pub inner: SimulatedDriver,
}

#[async_trait]
impl VolumeDriver for StuckDriver {
    fn name(&self) -> &'static str {
        "stuck"
    }

    async fn create_image(&self, request: &ImageRequest) -> Result<(), DriverError> {
        self.inner.create_image(request).await
    }

    async fn attach(
        &self,
        image: &Path,
        mount_point: &Path,
        credential: &Credential,
    ) -> Result<(), DriverError> {
        self.inner.attach(image, mount_point, credential).await
    }

    async fn detach(&self, _mount_point: &Path) -> Result<(), DriverError> {
        Err(DriverError::CommandFailed {
            program: "hdiutil".to_string(),
            code: Some(16),
            stderr: "resource busy".to_string(),
        })
    }

    fn detach_blocking(&self, mount_point: &Path) -> Result<(), DriverError> {
        self.inner.detach_blocking(mount_point)
    }
}
