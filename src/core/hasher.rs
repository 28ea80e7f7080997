//! Streaming content digests for evidence files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error};

/// Chunk size for streaming reads. Memory use is bounded by this regardless of file size.
pub const CHUNK_SIZE: usize = 4096;

/// Digest algorithms supported for chain-of-custody records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// Label used in the human-readable report
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Blake3 => "BLAKE3",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("permission denied reading {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl HashError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Incremental accumulator over either supported algorithm
enum Accumulator {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(chunk),
            Self::Blake3(h) => {
                h.update(chunk);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Compute the hex digest of a file, reading it in `CHUNK_SIZE` chunks.
pub fn digest(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    let result = digest_inner(path, algorithm);
    if let Err(e) = &result {
        error!(path = %path.display(), error = %e, "Failed to hash file");
    }
    result
}

fn digest_inner(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    // Opening a FIFO blocks until a writer shows up, so check the type first
    let metadata = fs::metadata(path).map_err(|e| HashError::from_io(path, e))?;
    if !metadata.is_file() {
        return Err(HashError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

    let mut acc = Accumulator::new(algorithm);
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HashError::from_io(path, e)),
        };
        acc.update(&buffer[..n]);
    }

    let hex = acc.finalize_hex();
    debug!(path = %path.display(), algorithm = %algorithm, digest = %hex, "Hashed file");
    Ok(hex)
}

/// Hash a file on the blocking pool.
pub async fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || digest(&path, algorithm)).await?
}
