use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Ordered, de-duplicated set of absolute paths chosen by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    paths: Vec<PathBuf>,
}

impl SelectionSet {
    /// Build a selection, making every path absolute and lexically normal
    /// (`.` and `..` resolved) and keeping the first occurrence of duplicates.
    pub fn new<I, P>(paths: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();

        for p in paths {
            let absolute = normalize(&std::path::absolute(p.as_ref())?);
            if seen.insert(absolute.clone()) {
                ordered.push(absolute);
            }
        }

        Ok(Self { paths: ordered })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }
}

/// Resolve `.` and `..` without touching the filesystem. Symlinks are left
/// alone so a selected link keeps its own name.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if out.parent().is_some() {
                    out.pop();
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Container capacity derived from a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Bytes of every regular file reachable from the selection
    pub total_bytes: u64,
    /// Capacity to request, in megabytes (MiB)
    pub size_mb: u64,
}

/// Lifecycle of an evidence container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Absent,
    Created,
    Mounted,
    Detached,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Created => "created-unmounted",
            Self::Mounted => "mounted",
            Self::Detached => "detached",
        };
        f.write_str(s)
    }
}

/// Outcome of copying one evidence file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CopyStatus {
    /// Source and destination digests match
    Verified,
    /// Both digests were computed and differ
    Mismatch,
    /// Copy or hashing did not complete
    Failed { reason: String },
}

/// One entry of the audit trail. Built once, never modified after being appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyRecord {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub source_digest: Option<String>,
    pub destination_digest: Option<String>,
    pub timestamp: DateTime<Local>,
    #[serde(flatten)]
    pub status: CopyStatus,
}

impl CopyRecord {
    /// Record a completed copy, classifying it by digest comparison.
    pub fn hashed(
        source_path: PathBuf,
        destination_path: PathBuf,
        source_digest: String,
        destination_digest: String,
    ) -> Self {
        let status = if source_digest == destination_digest {
            CopyStatus::Verified
        } else {
            CopyStatus::Mismatch
        };

        Self {
            source_path,
            destination_path,
            source_digest: Some(source_digest),
            destination_digest: Some(destination_digest),
            timestamp: Local::now(),
            status,
        }
    }

    /// Record an attempt that never produced a comparable pair of digests.
    pub fn failed(
        source_path: PathBuf,
        destination_path: PathBuf,
        source_digest: Option<String>,
        destination_digest: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_path,
            destination_path,
            source_digest,
            destination_digest,
            timestamp: Local::now(),
            status: CopyStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    /// True only when both digests exist and are equal
    pub fn digests_match(&self) -> bool {
        matches!(
            (&self.source_digest, &self.destination_digest),
            (Some(s), Some(d)) if s == d
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == CopyStatus::Verified
    }
}

/// Append-only, in-memory sequence of copy records for one run.
#[derive(Debug, Clone, Default)]
pub struct HashLog {
    records: Vec<CopyRecord>,
}

impl HashLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: CopyRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[CopyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_success()).count()
    }
}
