//! Runs the evidence pipeline once:
//! estimate → create → mount → copy all → report → unmount.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::core::container::{ContainerError, ContainerManager, MountedContainer};
use crate::core::copier::MetadataCopier;
use crate::core::models::{HashLog, SelectionSet, SizeEstimate};
use crate::core::report::{ReportPaths, VerificationReporter};
use crate::core::sizing;
use crate::core::system_info::SystemInfo;

/// Evidence copies live here inside the mounted volume
pub const COPIED_FILES_DIR: &str = "copied_files";
/// Reports and the run log snapshot live here inside the mounted volume
pub const FORENSIC_LOGS_DIR: &str = "forensic_logs";

/// Conditions that stop a run before or while the container is set up
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no files or folders were selected")]
    EmptySelection,

    #[error("destination is not a writable directory: {}", .0.display())]
    InvalidDestination(PathBuf),

    #[error("size estimation failed: {0}")]
    Estimate(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("failed to prepare evidence layout in {}: {source}", path.display())]
    Layout {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Outcome of a run that got as far as mounting the container
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub container_path: PathBuf,
    pub estimate: SizeEstimate,
    pub items_selected: usize,
    pub items_failed: usize,
    pub hash_log: HashLog,
    pub report: Option<ReportPaths>,
    pub report_error: Option<String>,
    pub unmount_error: Option<String>,
}

impl RunSummary {
    /// Every item copied and verified, report written, container detached
    pub fn is_success(&self) -> bool {
        self.items_failed == 0
            && self.hash_log.failure_count() == 0
            && self.report_error.is_none()
            && self.unmount_error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Work done while the container is mounted
struct Populated {
    hash_log: HashLog,
    items_failed: usize,
    report: Result<ReportPaths, String>,
}

pub struct Orchestrator {
    ctx: AppContext,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Name for a container created now
    pub fn container_name() -> String {
        format!("ForensicData_{}", Local::now().format("%Y%m%d_%H%M%S"))
    }

    pub async fn run(
        &self,
        selection: &SelectionSet,
        destination: &Path,
    ) -> Result<RunSummary, RunError> {
        info!("=== Forensic Sparsebundle Creator Started ===");

        let run_id = Uuid::now_v7();
        let system_info = SystemInfo::collect().await;
        let started_at = self
            .ctx
            .run_log
            .as_ref()
            .map(|l| l.started_at())
            .unwrap_or_else(Local::now);
        system_info.log(started_at);

        if selection.is_empty() {
            error!("No files or folders were selected. Exiting.");
            return Err(RunError::EmptySelection);
        }
        info!(items = selection.len(), "Selection confirmed");
        for path in selection.iter() {
            info!(path = %path.display(), "Selected");
        }

        check_destination(destination)?;

        let estimate = sizing::estimate_async(selection, &self.ctx.config.size_policy()).await?;

        let manager = ContainerManager::new(
            self.ctx.driver.clone(),
            self.ctx.config.mount_point(destination),
            self.ctx.config.credential(),
        );

        let name = Self::container_name();
        let container = manager
            .create(destination, &name, estimate.size_mb)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create sparsebundle. Exiting."))?;
        let container_path = container.path().to_path_buf();

        let mounted = manager
            .mount(container)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to mount sparsebundle. Exiting."))?;

        let reporter =
            VerificationReporter::new(run_id, system_info, self.ctx.config.hash_algorithm);
        let populated = self.populate(&mounted, selection, &reporter).await;

        // Release before looking at the outcome so every path detaches
        let unmount_error = match mounted.unmount().await {
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "Failed to unmount sparsebundle properly");
                Some(e.to_string())
            }
        };

        let populated = populated?;
        let (report, report_error) = match populated.report {
            Ok(paths) => (Some(paths), None),
            Err(e) => (None, Some(e)),
        };

        let summary = RunSummary {
            run_id,
            container_path,
            estimate,
            items_selected: selection.len(),
            items_failed: populated.items_failed,
            hash_log: populated.hash_log,
            report,
            report_error,
            unmount_error,
        };

        if summary.is_success() {
            info!(
                path = %summary.container_path.display(),
                files = summary.hash_log.len(),
                "Sparsebundle created"
            );
        } else {
            error!(
                items_failed = summary.items_failed,
                records_failed = summary.hash_log.failure_count(),
                report_failed = summary.report_error.is_some(),
                unmount_failed = summary.unmount_error.is_some(),
                "Run finished with errors"
            );
        }

        Ok(summary)
    }

    async fn populate(
        &self,
        mounted: &MountedContainer,
        selection: &SelectionSet,
        reporter: &VerificationReporter,
    ) -> Result<Populated, RunError> {
        let mount_point = mounted.mount_point();
        let logs_dir = mount_point.join(FORENSIC_LOGS_DIR);
        let files_dir = mount_point.join(COPIED_FILES_DIR);

        for dir in [&logs_dir, &files_dir] {
            fs::create_dir_all(dir).map_err(|source| RunError::Layout {
                path: dir.clone(),
                source,
            })?;
        }

        let copier = MetadataCopier::new(self.ctx.engine.clone(), self.ctx.config.hash_algorithm);
        let mut hash_log = HashLog::new();
        let mut items_failed = 0;

        for path in selection.iter() {
            if let Err(e) = copier.copy(path, &files_dir, &mut hash_log).await {
                error!(path = %path.display(), error = %e, "Failed to copy");
                items_failed += 1;
            }
        }

        let report = reporter
            .write(&hash_log, &logs_dir, mounted.container_path())
            .map_err(|e| {
                error!(error = %e, "Error creating verification report");
                e.to_string()
            });

        if let Some(run_log) = &self.ctx.run_log {
            match run_log.snapshot_into(&logs_dir) {
                Ok(copied) => info!(path = %copied.display(), "Run log copied into container"),
                Err(e) => warn!(error = %e, "Failed to copy run log into container"),
            }
        }

        Ok(Populated {
            hash_log,
            items_failed,
            report,
        })
    }
}

fn check_destination(destination: &Path) -> Result<(), RunError> {
    let writable = fs::metadata(destination)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false);

    if !writable {
        error!(destination = %destination.display(), "No usable destination. Exiting.");
        return Err(RunError::InvalidDestination(destination.to_path_buf()));
    }
    Ok(())
}
