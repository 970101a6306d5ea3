//! Blobs and historical file versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{AccountId, BackupItemId, Digest, FileVersionId};

/// An immutable byte payload, identified by its content digest.
///
/// For every row there is a file at the digest's sharded path (and vice
/// versa); GC is the only operation allowed to break that pairing, and only
/// atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupBlob {
    pub digest: Digest,
    pub account_id: AccountId,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Why a version was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionReason {
    /// Content changed upstream and was downloaded.
    Update,
    /// Tombstone written immediately before archiving a deleted item.
    PreDelete,
    /// Operator-requested snapshot.
    ManualSnapshot,
    /// Capture taken while resolving concurrent upstream edits.
    Conflict,
    /// Capture taken before a restore operation.
    RestorePoint,
}

impl VersionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionReason::Update => "update",
            VersionReason::PreDelete => "pre_delete",
            VersionReason::ManualSnapshot => "manual_snapshot",
            VersionReason::Conflict => "conflict",
            VersionReason::RestorePoint => "restore_point",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "update" => Ok(VersionReason::Update),
            "pre_delete" => Ok(VersionReason::PreDelete),
            "manual_snapshot" => Ok(VersionReason::ManualSnapshot),
            "conflict" => Ok(VersionReason::Conflict),
            "restore_point" => Ok(VersionReason::RestorePoint),
            other => Err(DomainError::InvalidEnumValue {
                field: "reason",
                value: other.to_string(),
            }),
        }
    }
}

/// A historical capture of a backup item's content.
///
/// Holds a strong reference to its blob: the blob may not be deleted while
/// any version references it. GC enforces this by purging versions before
/// reclaiming orphan blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: FileVersionId,
    pub account_id: AccountId,
    pub backup_item_id: BackupItemId,
    pub digest: Digest,
    /// Path the item held when this capture was taken.
    pub observed_path: String,
    pub etag_or_revision: String,
    pub content_modified_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
    pub reason: VersionReason,
}

/// Insertion form of [`FileVersion`].
#[derive(Debug, Clone)]
pub struct NewFileVersion {
    pub account_id: AccountId,
    pub backup_item_id: BackupItemId,
    pub digest: Digest,
    pub observed_path: String,
    pub etag_or_revision: String,
    pub content_modified_at: Option<DateTime<Utc>>,
    pub reason: VersionReason,
}
