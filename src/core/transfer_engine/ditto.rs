use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;

use crate::adapters::DriverError;
use crate::adapters::command::run;
use crate::core::transfer_engine::CopyEngine;

/// Copies through macOS `ditto`, which keeps extended attributes, resource
/// forks, ACLs and permissions.
pub struct DittoEngine;

#[async_trait]
impl CopyEngine for DittoEngine {
    fn name(&self) -> &'static str {
        "ditto"
    }

    async fn copy_item(&self, source: &Path, destination: &Path) -> Result<(), DriverError> {
        if destination.exists() {
            return Err(DriverError::DestinationExists(destination.to_path_buf()));
        }

        // ditto copies a directory's contents into the target, creating it
        run(
            "ditto",
            [
                OsStr::new("-v"),
                source.as_os_str(),
                destination.as_os_str(),
            ],
            Some(""),
            &format!("Copying {}", source.display()),
        )
        .await?;
        Ok(())
    }
}
