//! Metadata-preserving copy with per-file digest verification.
//!
//! Every regular file that lands in the container is hashed on both sides
//! and appended to the run's [`HashLog`]. Files inside a selected directory
//! are hashed individually, so a directory selection yields one record per
//! file. A failure is recorded and returned, never silently dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::adapters::DriverError;
use crate::core::hasher::{self, HashAlgorithm, HashError};
use crate::core::models::{CopyRecord, HashLog};
use crate::core::transfer_engine::CopyEngine;

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("cannot read source {}: {source}", path.display())]
    Source { path: PathBuf, source: io::Error },

    #[error("not a regular file or directory: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("copy of {} failed: {source}", path.display())]
    Engine { path: PathBuf, source: DriverError },

    #[error("{failed} of {total} file(s) under {} failed verification", path.display())]
    Integrity {
        path: PathBuf,
        failed: usize,
        total: usize,
    },
}

pub struct MetadataCopier {
    engine: Arc<dyn CopyEngine>,
    algorithm: HashAlgorithm,
}

impl MetadataCopier {
    pub fn new(engine: Arc<dyn CopyEngine>, algorithm: HashAlgorithm) -> Self {
        Self { engine, algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Copy one selected item into `destination_dir`, appending its records to `log`.
    pub async fn copy(
        &self,
        source: &Path,
        destination_dir: &Path,
        log: &mut HashLog,
    ) -> Result<(), CopyError> {
        let Some(file_name) = source.file_name() else {
            log.append(CopyRecord::failed(
                source.to_path_buf(),
                destination_dir.to_path_buf(),
                None,
                None,
                "source has no file name",
            ));
            return Err(CopyError::Unsupported(source.to_path_buf()));
        };
        let target = destination_dir.join(file_name);

        info!(
            source = %source.display(),
            destination = %target.display(),
            engine = self.engine.name(),
            "Copying"
        );

        // Top-level selections are followed even if they are symlinks
        let metadata = match fs::metadata(source) {
            Ok(m) => m,
            Err(e) => {
                error!(source = %source.display(), error = %e, "Cannot read source");
                log.append(CopyRecord::failed(
                    source.to_path_buf(),
                    target,
                    None,
                    None,
                    format!("cannot read source: {}", e),
                ));
                return Err(CopyError::Source {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        };

        if metadata.is_file() {
            self.copy_file(source, &target, log).await
        } else if metadata.is_dir() {
            self.copy_directory(source, &target, log).await
        } else {
            warn!(source = %source.display(), "Skipping special file");
            log.append(CopyRecord::failed(
                source.to_path_buf(),
                target,
                None,
                None,
                "not a regular file or directory",
            ));
            Err(CopyError::Unsupported(source.to_path_buf()))
        }
    }

    async fn copy_file(
        &self,
        source: &Path,
        target: &Path,
        log: &mut HashLog,
    ) -> Result<(), CopyError> {
        if let Err(e) = self.engine.copy_item(source, target).await {
            error!(source = %source.display(), error = %e, "Copy failed");
            log.append(CopyRecord::failed(
                source.to_path_buf(),
                target.to_path_buf(),
                None,
                None,
                e.to_string(),
            ));
            return Err(CopyError::Engine {
                path: source.to_path_buf(),
                source: e,
            });
        }

        let record = self.verify_pair(source, target).await;
        let ok = record.is_success();
        log.append(record);

        if ok {
            Ok(())
        } else {
            Err(CopyError::Integrity {
                path: source.to_path_buf(),
                failed: 1,
                total: 1,
            })
        }
    }

    async fn copy_directory(
        &self,
        source: &Path,
        target: &Path,
        log: &mut HashLog,
    ) -> Result<(), CopyError> {
        if let Err(e) = self.engine.copy_item(source, target).await {
            error!(source = %source.display(), error = %e, "Directory copy failed");
            log.append(CopyRecord::failed(
                source.to_path_buf(),
                target.to_path_buf(),
                None,
                None,
                e.to_string(),
            ));
            return Err(CopyError::Engine {
                path: source.to_path_buf(),
                source: e,
            });
        }

        let root = source.to_path_buf();
        let files = match tokio::task::spawn_blocking(move || regular_files(&root)).await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => return Err(self.walk_failed(source, target, e.to_string(), log)),
            Err(e) => return Err(self.walk_failed(source, target, e.to_string(), log)),
        };

        debug!(source = %source.display(), files = files.len(), "Verifying directory contents");

        let total = files.len();
        let mut failed = 0;
        for relative in files {
            let record = self
                .verify_pair(&source.join(&relative), &target.join(&relative))
                .await;
            if !record.is_success() {
                failed += 1;
            }
            log.append(record);
        }

        if failed > 0 {
            error!(
                source = %source.display(),
                failed,
                total,
                "Directory failed verification"
            );
            return Err(CopyError::Integrity {
                path: source.to_path_buf(),
                failed,
                total,
            });
        }

        info!(source = %source.display(), files = total, "Directory copied and verified");
        Ok(())
    }

    fn walk_failed(
        &self,
        source: &Path,
        target: &Path,
        reason: String,
        log: &mut HashLog,
    ) -> CopyError {
        error!(source = %source.display(), error = %reason, "Cannot enumerate copied directory");
        log.append(CopyRecord::failed(
            source.to_path_buf(),
            target.to_path_buf(),
            None,
            None,
            format!("cannot enumerate source tree: {}", reason),
        ));
        CopyError::Integrity {
            path: source.to_path_buf(),
            failed: 1,
            total: 1,
        }
    }

    /// Hash both sides of one copied file and classify the result.
    async fn verify_pair(&self, source: &Path, target: &Path) -> CopyRecord {
        let source_digest = hasher::digest_file(source, self.algorithm).await;
        let dest_digest = hasher::digest_file(target, self.algorithm).await;

        match (source_digest, dest_digest) {
            (Ok(s), Ok(d)) => {
                let record = CopyRecord::hashed(source.to_path_buf(), target.to_path_buf(), s, d);
                if !record.digests_match() {
                    error!(
                        source = %source.display(),
                        source_digest = ?record.source_digest,
                        destination_digest = ?record.destination_digest,
                        "Hash mismatch"
                    );
                }
                record
            }
            (s, d) => {
                let reason = describe_hash_failure(s.as_ref().err(), d.as_ref().err());
                CopyRecord::failed(
                    source.to_path_buf(),
                    target.to_path_buf(),
                    s.ok(),
                    d.ok(),
                    reason,
                )
            }
        }
    }
}

fn describe_hash_failure(source: Option<&HashError>, destination: Option<&HashError>) -> String {
    match (source, destination) {
        (Some(s), Some(d)) => format!("source: {}; destination: {}", s, d),
        (Some(s), None) => format!("source: {}", s),
        (None, Some(d)) => format!("destination: {}", d),
        (None, None) => "hashing failed".to_string(),
    }
}

/// Relative paths of every regular file under `root`, in sorted walk order.
/// Symlinks are not followed; special files are left out.
fn regular_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;
    Ok(files)
}

fn collect_files(base: &Path, current: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = path.symlink_metadata()?;

        if metadata.is_dir() {
            collect_files(base, &path, files)?;
        } else if metadata.is_file() {
            if let Ok(relative) = path.strip_prefix(base) {
                files.push(relative.to_path_buf());
            }
        } else {
            debug!(path = %path.display(), "Not hashing symlink or special file");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CopyStatus;
    use crate::core::transfer_engine::NativeCopyEngine;
    use tempfile::tempdir;

    fn copier(algorithm: HashAlgorithm) -> MetadataCopier {
        MetadataCopier::new(Arc::new(NativeCopyEngine::default()), algorithm)
    }

    #[tokio::test]
    async fn test_copy_file_records_matching_digests() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("memo.txt");
        let dest_dir = temp.path().join("out");
        fs::create_dir(&dest_dir).unwrap();
        fs::write(&source, b"chain of custody").unwrap();

        let mut log = HashLog::new();
        copier(HashAlgorithm::Sha256)
            .copy(&source, &dest_dir, &mut log)
            .await
            .unwrap();

        assert_eq!(log.len(), 1);
        let record = &log.records()[0];
        assert_eq!(record.status, CopyStatus::Verified);
        assert_eq!(record.destination_path, dest_dir.join("memo.txt"));
        assert!(record.digests_match());
    }

    #[tokio::test]
    async fn test_copy_directory_hashes_each_file() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("case");
        let dest_dir = temp.path().join("out");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::create_dir(&dest_dir).unwrap();
        fs::write(source.join("a.txt"), b"a").unwrap();
        fs::write(source.join("nested/b.txt"), b"b").unwrap();

        let mut log = HashLog::new();
        copier(HashAlgorithm::Blake3)
            .copy(&source, &dest_dir, &mut log)
            .await
            .unwrap();

        assert_eq!(log.len(), 2);
        assert!(log.records().iter().all(|r| r.is_success()));
        assert_eq!(
            log.records()[1].destination_path,
            dest_dir.join("case/nested/b.txt")
        );
        assert!(dest_dir.join("case/nested/b.txt").is_file());
    }

    #[tokio::test]
    async fn test_empty_directory_yields_no_records() {
        let temp = tempdir().unwrap();
        let source = temp.path().join("empty");
        let dest_dir = temp.path().join("out");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&dest_dir).unwrap();

        let mut log = HashLog::new();
        copier(HashAlgorithm::Sha256)
            .copy(&source, &dest_dir, &mut log)
            .await
            .unwrap();

        assert!(log.is_empty());
        assert!(dest_dir.join("empty").is_dir());
    }

    #[tokio::test]
    async fn test_missing_source_is_recorded() {
        let temp = tempdir().unwrap();
        let dest_dir = temp.path().join("out");
        fs::create_dir(&dest_dir).unwrap();

        let mut log = HashLog::new();
        let err = copier(HashAlgorithm::Sha256)
            .copy(&temp.path().join("gone.txt"), &dest_dir, &mut log)
            .await
            .unwrap_err();

        assert!(matches!(err, CopyError::Source { .. }));
        assert_eq!(log.len(), 1);
        assert!(matches!(log.records()[0].status, CopyStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_name_collision_is_refused() {
        let temp = tempdir().unwrap();
        let first = temp.path().join("a/report.txt");
        let second = temp.path().join("b/report.txt");
        let dest_dir = temp.path().join("out");
        fs::create_dir_all(first.parent().unwrap()).unwrap();
        fs::create_dir_all(second.parent().unwrap()).unwrap();
        fs::create_dir(&dest_dir).unwrap();
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let copier = copier(HashAlgorithm::Sha256);
        let mut log = HashLog::new();
        copier.copy(&first, &dest_dir, &mut log).await.unwrap();
        let err = copier.copy(&second, &dest_dir, &mut log).await.unwrap_err();

        assert!(matches!(err, CopyError::Engine { .. }));
        assert_eq!(fs::read(dest_dir.join("report.txt")).unwrap(), b"first");
        assert_eq!(log.len(), 2);
        assert_eq!(log.failure_count(), 1);
    }

    #[test]
    fn test_regular_files_sorted_and_filtered() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("z.txt"), b"z").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b/c.txt"), b"c").unwrap();
        std::os::unix::fs::symlink("a.txt", root.join("link")).unwrap();

        let files = regular_files(root).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b/c.txt"),
                PathBuf::from("z.txt"),
            ]
        );
    }
}
