//! Snapshot of who ran the tool, where, and on what.

use chrono::{DateTime, Local};
use nix::unistd::{Uid, User};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

pub const TOOL_NAME: &str = "Forensic Sparsebundle Creator";
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub user: String,
    pub hostname: String,
    pub os_version: String,
    pub build_version: String,
    pub architecture: String,
    pub kernel_version: String,
}

impl SystemInfo {
    /// Gather identity and OS details. Lookups that fail become "unknown".
    pub async fn collect() -> Self {
        let user = User::from_uid(Uid::current())
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let hostname = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                error!(error = %e, "Error getting hostname");
                UNKNOWN.to_string()
            });

        let (architecture, kernel_version, sysname) = match nix::sys::utsname::uname() {
            Ok(uts) => (
                uts.machine().to_string_lossy().into_owned(),
                uts.release().to_string_lossy().into_owned(),
                uts.sysname().to_string_lossy().into_owned(),
            ),
            Err(e) => {
                error!(error = %e, "Error getting kernel information");
                (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string())
            }
        };

        let (os_version, build_version) = if cfg!(target_os = "macos") {
            (
                sw_vers("-productVersion").await,
                sw_vers("-buildVersion").await,
            )
        } else {
            (format!("{} {}", sysname, kernel_version), UNKNOWN.to_string())
        };

        Self {
            user,
            hostname,
            os_version,
            build_version,
            architecture,
            kernel_version,
        }
    }

    /// Write the snapshot to the run log.
    pub fn log(&self, started_at: DateTime<Local>) {
        info!("=== System Information ===");
        info!(user = %self.user, "User");
        info!(hostname = %self.hostname, "Hostname");
        info!(os_version = %self.os_version, "OS Version");
        info!(build_version = %self.build_version, "Build Version");
        info!(architecture = %self.architecture, "Architecture");
        info!(kernel_version = %self.kernel_version, "Kernel Version");
        info!(current_time = %started_at.to_rfc3339(), "Current Time");
        info!(tool = TOOL_NAME, version = TOOL_VERSION, "Tool Version");
    }
}

async fn sw_vers(flag: &str) -> String {
    match tokio::process::Command::new("sw_vers").arg(flag).output().await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => {
            error!(
                flag,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "sw_vers failed"
            );
            UNKNOWN.to_string()
        }
        Err(e) => {
            error!(flag, error = %e, "Error running sw_vers");
            UNKNOWN.to_string()
        }
    }
}
