//! Metadata-preserving copy engines.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::DriverError;

mod ditto;
mod native_copy;

pub use ditto::DittoEngine;
pub use native_copy::NativeCopyEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CopyEngineType {
    /// macOS `ditto`: extended attributes, resource forks, ACLs
    Ditto,
    /// In-process copy: permissions, timestamps, extended attributes
    Native,
}

impl Default for CopyEngineType {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Ditto
        } else {
            Self::Native
        }
    }
}

impl std::fmt::Display for CopyEngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ditto => f.write_str("ditto"),
            Self::Native => f.write_str("native"),
        }
    }
}

#[async_trait]
pub trait CopyEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Copy `source` (file or directory tree) to exactly `destination`,
    /// preserving metadata. `destination` must not already exist.
    async fn copy_item(&self, source: &Path, destination: &Path) -> Result<(), DriverError>;
}

pub fn create_engine(engine_type: CopyEngineType) -> Arc<dyn CopyEngine> {
    match engine_type {
        CopyEngineType::Ditto => Arc::new(DittoEngine),
        CopyEngineType::Native => Arc::new(NativeCopyEngine::default()),
    }
}
