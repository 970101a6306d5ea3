//! Sync error taxonomy.

use thiserror::Error;

/// Failure kinds surfaced by a sync run.
///
/// `Aborted` and `TokenRefresh` are terminal for the run. `Download`,
/// `Storage`, and `DigestMismatch` are caught per change: the change is
/// recorded as an error event and the batch continues. `PathConflict` is
/// rare; the path builder falls back to a provider-id-suffixed path before
/// raising it.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Preconditions failed (account disabled, root disabled, sync already
    /// running). Does not retry.
    #[error("Sync aborted: {0}")]
    Aborted(String),

    /// The auth surface cannot produce a usable token.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// One file could not be fetched.
    #[error("Download failed for {file_id}: {message}")]
    Download { file_id: String, message: String },

    /// Blob write or filesystem operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Content integrity violation.
    #[error("Digest mismatch: {0}")]
    DigestMismatch(String),

    /// The path builder ran out of conflict suffixes.
    #[error("Path conflict could not be resolved for {0}")]
    PathConflict(String),

    /// Catalog or other infrastructure failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = SyncError::Aborted("account 3 is disabled".into());
        assert_eq!(err.to_string(), "Sync aborted: account 3 is disabled");

        let err = SyncError::Download {
            file_id: "A".into(),
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Download failed for A: connection reset");
    }
}
