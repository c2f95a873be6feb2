//! Dependency lock file fingerprinting.

use crate::error::BuildError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Content fingerprint of the dependency lock file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDigest {
    /// No lock file present
    Absent,
    /// Hex-encoded SHA-256 of the lock file contents
    Sha256(String),
}

impl LockDigest {
    /// Fingerprint raw lock file contents
    pub fn of_bytes(contents: &[u8]) -> Self {
        LockDigest::Sha256(hex::encode(Sha256::digest(contents)))
    }

    /// Fingerprint the file at `path`, or [`LockDigest::Absent`] if it does not exist
    pub async fn of_file(path: &Path) -> Result<Self, BuildError> {
        match tokio::fs::read(path).await {
            Ok(contents) => Ok(Self::of_bytes(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockDigest::Absent),
            Err(source) => Err(BuildError::LockDigest {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl fmt::Display for LockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockDigest::Absent => f.write_str("none"),
            LockDigest::Sha256(hex) => f.write_str(hex),
        }
    }
}
