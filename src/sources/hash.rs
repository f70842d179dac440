// Hash computation and checksum verification

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::{HostdbError, Result};

/// Buffer size for streaming file hashes (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha3-256")]
    Sha3_256,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha3_256 => "sha3-256",
        }
    }
}

/// Outcome of checking a file against an optional expected checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Expected checksum matched.
    Verified(String),
    /// No checksum on file; the artifact was used as-is.
    Unverified(String),
}

fn digest_reader<D: Digest, R: Read>(mut reader: R, path: &Path) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| HostdbError::io(format!("failed to read {}", path.display()), e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the lowercase hex digest of a file without loading it into memory
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| HostdbError::io(format!("failed to open {}", path.display()), e))?;

    match algorithm {
        HashAlgorithm::Sha256 => digest_reader::<Sha256, _>(file, path),
        HashAlgorithm::Sha3_256 => digest_reader::<Sha3_256, _>(file, path),
    }
}

/// Check a file against an expected checksum.
///
/// A missing expectation is not an error; the caller decides how loudly to
/// report [`Verification::Unverified`]. A mismatch is always an error.
pub fn verify_file(
    path: &Path,
    algorithm: HashAlgorithm,
    expected: Option<&str>,
) -> Result<Verification> {
    let actual = hash_file(path, algorithm)?;

    let Some(expected) = expected else {
        return Ok(Verification::Unverified(actual));
    };

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(Verification::Verified(actual))
    } else {
        Err(HostdbError::ChecksumMismatch {
            file: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            expected: format!("{}:{}", algorithm.name(), expected.trim().to_lowercase()),
            actual: format!("{}:{}", algorithm.name(), actual),
        })
    }
}
