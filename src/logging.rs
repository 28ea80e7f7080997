//! Logging and tracing initialization for fsbc.
//!
//! Every event goes to stderr (pretty or JSON). Evidence runs also get a
//! per-run log file under the configured log directory, written synchronously
//! so a snapshot taken mid-run contains everything logged so far.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output console logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

/// The log of one run: where it lives and when it started.
///
/// Created once in `main` and shared with the run context; the run is closed
/// out with [`RunLog::finish`].
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    started_at: DateTime<Local>,
}

impl RunLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Copy the log as written so far into `dir`.
    pub fn snapshot_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let name = self
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("run.log"));
        let target = dir.join(name);
        fs::copy(&self.path, &target)?;
        Ok(target)
    }

    /// Close out the run with a final banner.
    pub fn finish(&self, success: bool) {
        if success {
            info!("=== Forensic Sparsebundle Creator Completed Successfully ===");
        } else {
            tracing::error!("=== Forensic Sparsebundle Creator Completed with Errors ===");
        }
        info!(log_file = %self.path.display(), "Log file");
    }
}

/// File name for a run started at `started_at`
pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!(
        "forensic_sparsebundle_{}.log",
        started_at.format("%Y%m%d_%H%M%S")
    )
}

/// Initialize the tracing subscriber and open the run log in `log_dir`.
///
/// The log level can be overridden at runtime via the `RUST_LOG` environment variable.
pub fn init(config: LogConfig, log_dir: &Path) -> Result<RunLog> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let started_at = Local::now();
    let file_name = log_file_name(started_at);
    let path = log_dir.join(&file_name);

    // Non-rotating appender writes each event straight to the file
    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    install(&config, Some(file_appender))?;

    info!(log_file = %path.display(), "Logging initialized");

    Ok(RunLog { path, started_at })
}

/// Initialize console-only logging for commands that are not evidence runs.
pub fn init_console(config: LogConfig) -> Result<()> {
    install(&config, None)
}

fn install(config: &LogConfig, file: Option<RollingFileAppender>) -> Result<()> {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("fsbc={}", default_level.as_str().to_lowercase()))
    });

    let file_layer = file.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
    });

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}
