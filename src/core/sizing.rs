//! Container capacity estimation.
//!
//! Walks the selection and sums the size of every reachable regular file,
//! then over-provisions by a margin and applies a floor. Entries that cannot
//! be read are logged and skipped so one bad file never aborts the estimate.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::core::models::{SelectionSet, SizeEstimate};

const MIB: u128 = 1024 * 1024;

/// Sizing policy. Defaults give `ceil(total_mib * 1.1)` floored at 100 MB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    pub minimum_mb: u64,
    pub margin_percent: u32,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self {
            minimum_mb: 100,
            margin_percent: 10,
        }
    }
}

impl SizePolicy {
    /// Capacity in MB for a measured byte total.
    pub fn capacity_mb(&self, total_bytes: u64) -> u64 {
        // Integer arithmetic keeps the ceiling exact: ceil(bytes * (100 + p) / (100 * MiB))
        let scaled = total_bytes as u128 * (100 + self.margin_percent as u128);
        let divisor = 100 * MIB;
        let mb = scaled.div_ceil(divisor);
        let mb = u64::try_from(mb).unwrap_or(u64::MAX);
        mb.max(self.minimum_mb)
    }
}

/// Estimate the container size needed for a selection.
pub fn estimate(selection: &SelectionSet, policy: &SizePolicy) -> SizeEstimate {
    info!(items = selection.len(), "Estimating size needed for selection");

    let mut total_bytes: u64 = 0;
    for path in selection.iter() {
        total_bytes = total_bytes.saturating_add(measure_path(path));
    }

    let size_mb = policy.capacity_mb(total_bytes);
    info!(total_bytes, size_mb, "Estimated container size");

    SizeEstimate {
        total_bytes,
        size_mb,
    }
}

/// Estimate on the blocking pool.
pub async fn estimate_async(
    selection: &SelectionSet,
    policy: &SizePolicy,
) -> Result<SizeEstimate, tokio::task::JoinError> {
    let selection = selection.clone();
    let policy = *policy;
    tokio::task::spawn_blocking(move || estimate(&selection, &policy)).await
}

/// Bytes under one selected path. Top-level selections are followed.
fn measure_path(path: &Path) -> u64 {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unreadable selection");
            return 0;
        }
    };

    if metadata.is_file() {
        metadata.len()
    } else if metadata.is_dir() {
        let mut total = 0;
        sum_directory_recursive(path, &mut total);
        total
    } else {
        debug!(path = %path.display(), "Skipping special file in selection");
        0
    }
}

fn sum_directory_recursive(current: &Path, total_bytes: &mut u64) {
    let entries = match fs::read_dir(current) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %current.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %current.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();

        // Symlinks are not followed inside trees
        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            sum_directory_recursive(&path, total_bytes);
        } else if metadata.is_file() {
            *total_bytes = total_bytes.saturating_add(metadata.len());
        } else {
            debug!(path = %path.display(), "Skipping symlink or special file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_floor_applies_to_small_selections() {
        let policy = SizePolicy::default();
        assert_eq!(policy.capacity_mb(0), 100);
        assert_eq!(policy.capacity_mb(1), 100);
        assert_eq!(policy.capacity_mb(90 * MB), 100);
    }

    #[test]
    fn test_margin_rounds_up() {
        let policy = SizePolicy::default();
        // 1000 MiB * 1.1 = 1100 exactly
        assert_eq!(policy.capacity_mb(1000 * MB), 1100);
        // One byte more must round up
        assert_eq!(policy.capacity_mb(1000 * MB + 1), 1101);
        // 200 MiB + half a MiB: 200.5 * 1.1 = 220.55 -> 221
        assert_eq!(policy.capacity_mb(200 * MB + MB / 2), 221);
    }

    #[test]
    fn test_capacity_invariants_hold_across_sizes() {
        let policy = SizePolicy::default();
        let mut bytes: u64 = 1;
        while bytes < (1 << 50) {
            for total in [bytes - 1, bytes, bytes + 12345] {
                let mb = policy.capacity_mb(total);
                assert!(mb >= 100);
                let needed = (total as f64 / MB as f64 * 1.1).ceil() as u64;
                // Float rounding can land one unit either way on exact boundaries
                assert!(mb + 1 >= needed, "total={} mb={} needed={}", total, mb, needed);
                assert!(mb as u128 * 100 * MIB >= total as u128 * 110);
            }
            bytes *= 7;
        }
    }

    #[test]
    fn test_custom_policy() {
        let policy = SizePolicy {
            minimum_mb: 1,
            margin_percent: 0,
        };
        assert_eq!(policy.capacity_mb(5 * MB), 5);
        assert_eq!(policy.capacity_mb(5 * MB + 1), 6);
    }

    #[test]
    fn test_estimate_files_and_directories() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("single.bin");
        std::fs::write(&file, vec![0u8; 1000]).unwrap();

        let dir = temp.path().join("tree");
        std::fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        std::fs::write(dir.join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.join("nested/b.txt"), b"world!!!").unwrap();
        std::fs::write(dir.join("nested/deeper/c.txt"), b"nested").unwrap();

        let selection = SelectionSet::new([&file, &dir]).unwrap();
        let estimate = estimate(&selection, &SizePolicy::default());

        assert_eq!(estimate.total_bytes, 1000 + 5 + 8 + 6);
        assert_eq!(estimate.size_mb, 100);
    }

    #[test]
    fn test_estimate_skips_missing_paths() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("present.txt");
        std::fs::write(&file, b"12345").unwrap();

        let selection = SelectionSet::new([file, temp.path().join("missing.txt")]).unwrap();
        let estimate = estimate(&selection, &SizePolicy::default());

        assert_eq!(estimate.total_bytes, 5);
    }

    #[test]
    fn test_estimate_does_not_follow_symlinks_in_trees() {
        let temp = tempdir().unwrap();
        let outside = temp.path().join("outside.bin");
        std::fs::write(&outside, vec![1u8; 4096]).unwrap();

        let dir = temp.path().join("tree");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("real.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(&outside, dir.join("link.bin")).unwrap();

        let selection = SelectionSet::new([&dir]).unwrap();
        let estimate = estimate(&selection, &SizePolicy::default());

        assert_eq!(estimate.total_bytes, 3);
    }

    #[tokio::test]
    async fn test_estimate_async() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("f"), b"xyz").unwrap();

        let selection = SelectionSet::new([temp.path()]).unwrap();
        let estimate = estimate_async(&selection, &SizePolicy::default())
            .await
            .unwrap();
        assert_eq!(estimate.total_bytes, 3);
    }
}
