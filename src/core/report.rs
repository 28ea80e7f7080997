//! Verification report: a JSON record of the run plus a text rendering.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::core::hasher::HashAlgorithm;
use crate::core::models::{CopyRecord, CopyStatus, HashLog};
use crate::core::system_info::{SystemInfo, TOOL_NAME, TOOL_VERSION};

pub const REPORT_JSON: &str = "verification_report.json";
pub const REPORT_TEXT: &str = "verification_report.txt";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub verified: usize,
    pub mismatched: usize,
    pub failed: usize,
}

impl ReportSummary {
    fn from_records(records: &[CopyRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            verified: 0,
            mismatched: 0,
            failed: 0,
        };
        for r in records {
            match r.status {
                CopyStatus::Verified => summary.verified += 1,
                CopyStatus::Mismatch => summary.mismatched += 1,
                CopyStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub run_id: Uuid,
    pub timestamp: DateTime<Local>,
    pub sparsebundle_path: PathBuf,
    pub tool_name: String,
    pub tool_version: String,
    pub system_info: SystemInfo,
    pub hash_algorithm: HashAlgorithm,
    pub summary: ReportSummary,
    pub file_hashes: Vec<CopyRecord>,
}

/// Where the two report artifacts were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub text: PathBuf,
}

/// Builds and writes reports for one run.
pub struct VerificationReporter {
    run_id: Uuid,
    system_info: SystemInfo,
    algorithm: HashAlgorithm,
}

impl VerificationReporter {
    pub fn new(run_id: Uuid, system_info: SystemInfo, algorithm: HashAlgorithm) -> Self {
        Self {
            run_id,
            system_info,
            algorithm,
        }
    }

    pub fn build(&self, log: &HashLog, container_path: &Path) -> VerificationReport {
        VerificationReport {
            run_id: self.run_id,
            timestamp: Local::now(),
            sparsebundle_path: container_path.to_path_buf(),
            tool_name: TOOL_NAME.to_string(),
            tool_version: TOOL_VERSION.to_string(),
            system_info: self.system_info.clone(),
            hash_algorithm: self.algorithm,
            summary: ReportSummary::from_records(log.records()),
            file_hashes: log.records().to_vec(),
        }
    }

    /// Write `verification_report.json` and `verification_report.txt` into `output_dir`.
    pub fn write(
        &self,
        log: &HashLog,
        output_dir: &Path,
        container_path: &Path,
    ) -> Result<ReportPaths, ReportError> {
        info!("Creating verification report");

        let report = self.build(log, container_path);

        let json = serde_json::to_vec_pretty(&report)?;
        let json_path = output_dir.join(REPORT_JSON);
        write_file(&json_path, &json)?;
        info!(path = %json_path.display(), "Verification report created");

        let text = render_text(&report, &hex::encode(Sha256::digest(&json)));
        let text_path = output_dir.join(REPORT_TEXT);
        write_file(&text_path, text.as_bytes())?;
        info!(path = %text_path.display(), "Text verification report created");

        Ok(ReportPaths {
            json: json_path,
            text: text_path,
        })
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), ReportError> {
    fs::write(path, content).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Human-readable rendering. `json_sha256` ties the text to its JSON twin.
pub fn render_text(report: &VerificationReport, json_sha256: &str) -> String {
    TextReport {
        report,
        json_sha256,
    }
    .to_string()
}

struct TextReport<'a> {
    report: &'a VerificationReport,
    json_sha256: &'a str,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let algo = report.hash_algorithm.label();

        writeln!(f, "FORENSIC SPARSEBUNDLE VERIFICATION REPORT")?;
        writeln!(f, "=========================================\n")?;
        writeln!(f, "Run ID: {}", report.run_id)?;
        writeln!(f, "Created: {}", report.timestamp.to_rfc3339())?;
        writeln!(f, "Sparsebundle: {}", report.sparsebundle_path.display())?;
        writeln!(
            f,
            "Tool Version: {} {}\n",
            report.tool_name, report.tool_version
        )?;

        let info = &report.system_info;
        writeln!(f, "SYSTEM INFORMATION")?;
        writeln!(f, "------------------")?;
        writeln!(f, "user: {}", info.user)?;
        writeln!(f, "hostname: {}", info.hostname)?;
        writeln!(f, "os_version: {}", info.os_version)?;
        writeln!(f, "build_version: {}", info.build_version)?;
        writeln!(f, "architecture: {}", info.architecture)?;
        writeln!(f, "kernel_version: {}\n", info.kernel_version)?;

        let s = &report.summary;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "-------")?;
        writeln!(f, "Files: {}", s.total)?;
        writeln!(f, "Verified: {}", s.verified)?;
        writeln!(f, "Mismatched: {}", s.mismatched)?;
        writeln!(f, "Failed: {}\n", s.failed)?;

        writeln!(f, "FILE HASHES")?;
        writeln!(f, "-----------")?;
        for entry in &report.file_hashes {
            writeln!(f, "Source: {}", entry.source_path.display())?;
            writeln!(f, "Destination: {}", entry.destination_path.display())?;
            writeln!(
                f,
                "Source {}: {}",
                algo,
                entry.source_digest.as_deref().unwrap_or("-")
            )?;
            writeln!(
                f,
                "Destination {}: {}",
                algo,
                entry.destination_digest.as_deref().unwrap_or("-")
            )?;
            writeln!(f, "Match: {}", entry.digests_match())?;
            match &entry.status {
                CopyStatus::Verified => writeln!(f, "Status: verified")?,
                CopyStatus::Mismatch => writeln!(f, "Status: MISMATCH")?,
                CopyStatus::Failed { reason } => writeln!(f, "Status: FAILED ({})", reason)?,
            }
            writeln!(f, "Timestamp: {}\n", entry.timestamp.to_rfc3339())?;
        }

        writeln!(f, "{} SHA256: {}", REPORT_JSON, self.json_sha256)
    }
}
