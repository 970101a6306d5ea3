//! Cloud provider port.
//!
//! One implementation per provider tag; the engine selects a client by the
//! account's [`crate::domain::ProviderKind`] and never touches
//! provider-specific types beyond this interface. The DTOs here are
//! port-level records, not domain entities — the engine maps them onto
//! [`crate::domain::BackupItem`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a provider adapter can surface to the engine.
///
/// The engine's handling differs per variant: `TokenExpired` aborts the run,
/// `NotDownloadable` and `NotFound` are expected operational conditions, and
/// `Transient` is eligible for retry with backoff.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The auth surface cannot produce a usable access token.
    #[error("Token expired or refresh failed: {0}")]
    TokenExpired(String),

    /// The referenced file does not exist upstream.
    #[error("Remote file not found: {0}")]
    NotFound(String),

    /// The file's type has no byte representation to fetch.
    #[error("File type {0} cannot be downloaded")]
    NotDownloadable(String),

    /// Network-level or 5xx/429 failure worth retrying.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Anything else (malformed responses, unexpected status codes).
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// A file record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    /// Provider-computed content checksum, when offered.
    pub checksum: Option<String>,
    /// Parent container ids; the first entry drives path construction.
    pub parents: Vec<String>,
    pub trashed: bool,
    pub etag: Option<String>,
}

/// A single change event from the provider's change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub file_id: String,
    /// The provider reports the file permanently removed.
    pub removed: bool,
    /// Metadata snapshot; absent for removals.
    pub file: Option<RemoteFile>,
    pub change_type: String,
    pub time: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    /// Whether this change must be treated as a deletion
    /// (hard removal or moved to trash).
    pub fn is_deletion(&self) -> bool {
        self.removed || self.file.as_ref().is_some_and(|f| f.trashed)
    }
}

/// One page of the change stream.
#[derive(Debug, Clone, Default)]
pub struct ChangesPage {
    pub changes: Vec<ChangeRecord>,
    /// Present only on the final page; becomes the cursor for the next sync.
    pub new_start_page_token: Option<String>,
    /// Present when more pages follow.
    pub next_page_token: Option<String>,
}

impl ChangesPage {
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

/// Port trait for cloud storage provider operations.
///
/// Implementations own authentication headers, pagination plumbing, and
/// provider-specific export handling. All methods assume tokens were loaded
/// at construction; [`ProviderClient::refresh_tokens_if_needed`] must be
/// idempotent — two concurrent syncs of one account may both call it, and
/// whichever persists the newer token last wins.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Refresh the access token if it is expired or about to expire.
    ///
    /// Returns whether a refresh was performed.
    async fn refresh_tokens_if_needed(&self) -> Result<bool, ProviderError>;

    /// Token representing "now" in the change stream; enumerating up to it
    /// covers the provider's current state.
    async fn get_start_page_token(&self) -> Result<String, ProviderError>;

    /// List one page of changes at the given page token.
    async fn list_changes(&self, page_token: &str, page_size: u32)
        -> Result<ChangesPage, ProviderError>;

    /// Fetch the current metadata for a single file.
    async fn get_file_metadata(&self, file_id: &str) -> Result<RemoteFile, ProviderError>;

    /// Download a file's bytes. Cloud-native documents are exported through
    /// the provider's export mapping and returned as ordinary bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, ProviderError>;

    /// Whether this MIME type denotes a folder.
    fn is_folder(&self, mime_type: &str) -> bool;

    /// Whether files of this MIME type have downloadable content
    /// (folders and shortcut-like types do not).
    fn is_downloadable(&self, mime_type: &str) -> bool;

    /// Filename extension appended when exporting a cloud-native document
    /// of this MIME type, e.g. `".docx"`. `None` for ordinary files.
    fn export_extension(&self, mime_type: &str) -> Option<&'static str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_file(trashed: bool) -> RemoteFile {
        RemoteFile {
            id: "f1".into(),
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            size: Some(3),
            modified_time: None,
            checksum: None,
            parents: vec![],
            trashed,
            etag: Some("e1".into()),
        }
    }

    #[test]
    fn removal_is_deletion() {
        let change = ChangeRecord {
            file_id: "f1".into(),
            removed: true,
            file: None,
            change_type: "file".into(),
            time: None,
        };
        assert!(change.is_deletion());
    }

    #[test]
    fn trashed_file_is_deletion() {
        let change = ChangeRecord {
            file_id: "f1".into(),
            removed: false,
            file: Some(remote_file(true)),
            change_type: "file".into(),
            time: None,
        };
        assert!(change.is_deletion());
    }

    #[test]
    fn live_file_is_not_deletion() {
        let change = ChangeRecord {
            file_id: "f1".into(),
            removed: false,
            file: Some(remote_file(false)),
            change_type: "file".into(),
            time: None,
        };
        assert!(!change.is_deletion());
    }

    #[test]
    fn page_has_more_only_with_next_token() {
        let page = ChangesPage {
            next_page_token: Some("p2".into()),
            ..Default::default()
        };
        assert!(page.has_more());
        assert!(!ChangesPage::default().has_more());
    }
}
