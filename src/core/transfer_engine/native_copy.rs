use async_trait::async_trait;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::adapters::DriverError;
use crate::core::transfer_engine::CopyEngine;

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// In-process copy engine.
///
/// Preserves:
/// - Permission bits
/// - Access and modification times
/// - Extended attributes (best effort, not all filesystems support them)
/// - Symlinks, recreated as symlinks
///
/// Device nodes, sockets and FIFOs are skipped with a warning.
pub struct NativeCopyEngine {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
}

impl Default for NativeCopyEngine {
    fn default() -> Self {
        Self { sync_files: true }
    }
}

#[async_trait]
impl CopyEngine for NativeCopyEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn copy_item(&self, source: &Path, destination: &Path) -> Result<(), DriverError> {
        // Safety check: fail if destination already exists to prevent overwrites
        if destination.exists() {
            return Err(DriverError::DestinationExists(destination.to_path_buf()));
        }

        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let sync_files = self.sync_files;

        tokio::task::spawn_blocking(move || -> Result<(), DriverError> {
            let metadata = fs::metadata(&source)?;
            if metadata.is_dir() {
                let stats = copy_tree(&source, &destination, sync_files)?;
                info!(
                    source = %source.display(),
                    files = stats.files,
                    bytes = stats.bytes,
                    skipped = stats.skipped,
                    "Native copy of directory complete"
                );
            } else {
                let bytes = copy_single_file(&source, &destination, sync_files)?;
                debug!(source = %source.display(), bytes, "Native copy of file complete");
            }
            Ok(())
        })
        .await?
    }
}

#[derive(Debug, Default)]
struct TreeStats {
    files: u64,
    bytes: u64,
    skipped: u64,
}

/// Copy a directory tree. Parents are created before children so each
/// directory's metadata can be applied after its contents are written.
fn copy_tree(source: &Path, destination: &Path, sync_files: bool) -> Result<TreeStats, DriverError> {
    let mut stats = TreeStats::default();
    copy_tree_recursive(source, destination, sync_files, &mut stats)?;
    Ok(stats)
}

fn copy_tree_recursive(
    source: &Path,
    destination: &Path,
    sync_files: bool,
    stats: &mut TreeStats,
) -> Result<(), DriverError> {
    fs::create_dir_all(destination)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let target = destination.join(entry.file_name());

        // Use symlink_metadata to avoid following symlinks
        let metadata = path.symlink_metadata()?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            copy_tree_recursive(&path, &target, sync_files, stats)?;
        } else if file_type.is_file() {
            stats.bytes += copy_single_file(&path, &target, sync_files)?;
            stats.files += 1;
        } else if file_type.is_symlink() {
            let link = fs::read_link(&path)?;
            std::os::unix::fs::symlink(&link, &target)?;
            debug!(path = %path.display(), target = %link.display(), "Recreated symlink");
        } else {
            warn!(path = %path.display(), "Skipping special file");
            stats.skipped += 1;
        }
    }

    preserve_metadata(source, destination);
    Ok(())
}

/// Copy a single file with metadata preservation
fn copy_single_file(source: &Path, dest: &Path, sync_file: bool) -> Result<u64, DriverError> {
    let source_file = File::open(source)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    let dest_file = File::create_new(dest)?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        bytes_written += bytes_read as u64;
    }

    writer.flush()?;

    if sync_file {
        let inner = writer.into_inner().map_err(|e| e.into_error())?;
        inner.sync_all()?;
    }

    preserve_metadata(source, dest);
    Ok(bytes_written)
}

/// Carry permissions, extended attributes and timestamps over. Failures are
/// logged, not fatal: content integrity is checked separately by hashing.
fn preserve_metadata(source: &Path, dest: &Path) {
    if let Err(e) = preserve_xattrs(source, dest) {
        debug!(dest = %dest.display(), error = %e, "Failed to copy extended attributes");
    }

    match fs::metadata(source) {
        Ok(metadata) => {
            if let Err(e) = fs::set_permissions(dest, metadata.permissions()) {
                debug!(dest = %dest.display(), error = %e, "Failed to set permissions");
            }

            // Timestamps last, since writing xattrs can bump them
            let atime = filetime::FileTime::from_last_access_time(&metadata);
            let mtime = filetime::FileTime::from_last_modification_time(&metadata);
            if let Err(e) = filetime::set_file_times(dest, atime, mtime) {
                debug!(dest = %dest.display(), error = %e, "Failed to preserve timestamps");
            }
        }
        Err(e) => {
            debug!(source = %source.display(), error = %e, "Failed to read source metadata");
        }
    }
}

fn preserve_xattrs(source: &Path, dest: &Path) -> std::io::Result<()> {
    for name in xattr::list(source)? {
        if let Some(value) = xattr::get(source, &name)? {
            xattr::set(dest, &name, &value)?;
        }
    }
    Ok(())
}
