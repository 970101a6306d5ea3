//! Content-addressed blob storage.
//!
//! Storage layout per account:
//!
//! ```text
//! <backup_root>/<provider>/<account_id>/
//!     current/                      browsable backup tree
//!     blobs/sha256/aa/bb/<hex>      immutable content blobs, mode 0444
//!     tmp/<uuid>.tmp                in-progress writes
//!     archive/                      files moved aside on deletion
//! ```
//!
//! Writes are all-or-nothing: bytes stream into a unique temp file while a
//! running SHA-256 accumulates, and only a fully fsynced, digest-verified
//! temp file is renamed to its canonical sharded path. A partial write is
//! never observable at the canonical location.

mod reader;
mod store;

pub use reader::VerifyingReader;
pub use store::{AccountStore, StorageStats};

use std::path::PathBuf;

use cloudkeep_core::domain::Digest;
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Errors from blob store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Content did not hash to the expected digest.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },

    /// No blob exists at the digest's canonical path.
    #[error("Blob not found: {0}")]
    BlobNotFound(Digest),

    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

/// SHA-256 digest of a byte slice.
pub fn compute_digest(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    digest_from_hasher(hasher)
}

pub(crate) fn digest_from_hasher(hasher: Sha256) -> Digest {
    let hex = format!("{:x}", hasher.finalize());
    Digest::from_sha256_hex(&hex).expect("sha256 output is a valid digest")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(
            compute_digest(b"").as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_of_known_content() {
        assert_eq!(
            compute_digest(b"hello world\n").as_str(),
            "sha256:a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447"
        );
    }
}
