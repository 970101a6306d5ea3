//! Backup items and their deletion-state machine.
//!
//! A [`BackupItem`] is a logical file or folder known to the system, unique
//! by `(sync_root, provider_item_id)`. Items never leave the catalog; their
//! lifecycle is expressed by [`ItemState`]:
//!
//! ```text
//!  ACTIVE ──(missing ≥1)──► MISSING_UPSTREAM ──(missing again)──► QUARANTINED
//!    ▲  ▲                         │                                  │
//!    │  └──(reappears)────────────┘                                  │
//!    └──(reappears)──────────────────────────────────────────────────┘
//!  ACTIVE ──(explicit delete)──► DELETED_UPSTREAM
//!  QUARANTINED ──(retention expiry, GC)──► PURGED
//! ```
//!
//! `PURGED` is terminal. A single absence from the change stream is not
//! proof of deletion (the provider may transiently omit items), so archiving
//! only happens on the second consecutive miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BackupItemId, SyncRootId};

/// Number of consecutive missed syncs before an item is quarantined.
pub const QUARANTINE_MISS_THRESHOLD: u32 = 2;

/// Whether an item is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    File,
    Folder,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Folder => "folder",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "file" => Ok(ItemType::File),
            "folder" => Ok(ItemType::Folder),
            other => Err(DomainError::InvalidEnumValue {
                field: "item_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Deletion-state of a backup item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Present upstream as of the last sync.
    Active,
    /// Explicitly removed or trashed upstream.
    DeletedUpstream,
    /// Absent from one change stream; no filesystem action yet.
    MissingUpstream,
    /// Absent from two consecutive syncs; file moved to `archive/`.
    Quarantined,
    /// Retention expired; archived copy deleted. Terminal.
    Purged,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Active => "active",
            ItemState::DeletedUpstream => "deleted_upstream",
            ItemState::MissingUpstream => "missing_upstream",
            ItemState::Quarantined => "quarantined",
            ItemState::Purged => "purged",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "active" => Ok(ItemState::Active),
            "deleted_upstream" => Ok(ItemState::DeletedUpstream),
            "missing_upstream" => Ok(ItemState::MissingUpstream),
            "quarantined" => Ok(ItemState::Quarantined),
            "purged" => Ok(ItemState::Purged),
            other => Err(DomainError::InvalidEnumValue {
                field: "state",
                value: other.to_string(),
            }),
        }
    }
}

/// A logical file or folder tracked by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupItem {
    pub id: BackupItemId,
    pub sync_root_id: SyncRootId,
    pub provider_item_id: String,
    pub name: String,
    /// Relative path within `current/`, built by the path builder.
    /// Unique within a sync root for items not in `PURGED`.
    pub path: String,
    pub item_type: ItemType,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub provider_modified_at: Option<DateTime<Utc>>,
    pub etag: String,
    pub state: ItemState,
    pub state_changed_at: DateTime<Utc>,
    /// Consecutive syncs this item has been absent from the change stream.
    pub missing_since_sync_count: u32,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub parent_id: Option<BackupItemId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupItem {
    pub fn is_file(&self) -> bool {
        self.item_type == ItemType::File
    }

    /// Whether a change to this remote record implies new content.
    ///
    /// Either a differing etag or a differing provider modification time
    /// counts; providers are not consistent about which one moves.
    pub fn content_changed(
        &self,
        etag: Option<&str>,
        modified_at: Option<DateTime<Utc>>,
    ) -> bool {
        self.etag != etag.unwrap_or("") || self.provider_modified_at != modified_at
    }

    /// Reset deletion tracking when the item shows up in a change stream.
    pub fn mark_reappeared(&mut self, now: DateTime<Utc>) {
        if self.state != ItemState::Active {
            self.state = ItemState::Active;
            self.state_changed_at = now;
        }
        self.missing_since_sync_count = 0;
    }

    /// Record one sweep strike and return the resulting state.
    ///
    /// The first strike only flags the item; the second moves it to
    /// [`ItemState::Quarantined`], at which point the caller archives the
    /// materialized file.
    pub fn record_missing(&mut self, now: DateTime<Utc>) -> ItemState {
        self.missing_since_sync_count += 1;
        let next = if self.missing_since_sync_count >= QUARANTINE_MISS_THRESHOLD {
            ItemState::Quarantined
        } else {
            ItemState::MissingUpstream
        };
        if self.state != next {
            self.state = next;
            self.state_changed_at = now;
        }
        next
    }

    /// The provider explicitly reported this item removed or trashed.
    pub fn mark_deleted_upstream(&mut self, now: DateTime<Utc>) {
        self.state = ItemState::DeletedUpstream;
        self.state_changed_at = now;
        self.missing_since_sync_count = 0;
    }

    /// Retention expired for a quarantined item; only GC calls this.
    pub fn mark_purged(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.state != ItemState::Quarantined {
            return Err(DomainError::InvalidState {
                from: self.state.as_str(),
                to: ItemState::Purged.as_str(),
            });
        }
        self.state = ItemState::Purged;
        self.state_changed_at = now;
        Ok(())
    }
}

/// Insertion form of [`BackupItem`].
#[derive(Debug, Clone)]
pub struct NewBackupItem {
    pub sync_root_id: SyncRootId,
    pub provider_item_id: String,
    pub name: String,
    pub path: String,
    pub item_type: ItemType,
    pub mime_type: String,
    pub size_bytes: Option<i64>,
    pub provider_modified_at: Option<DateTime<Utc>>,
    pub etag: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub parent_id: Option<BackupItemId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(state: ItemState) -> BackupItem {
        let now = Utc::now();
        BackupItem {
            id: BackupItemId(1),
            sync_root_id: SyncRootId(1),
            provider_item_id: "file-1".into(),
            name: "report.pdf".into(),
            path: "Docs/report.pdf".into(),
            item_type: ItemType::File,
            mime_type: "application/pdf".into(),
            size_bytes: Some(12),
            provider_modified_at: Some(now),
            etag: "e1".into(),
            state,
            state_changed_at: now,
            missing_since_sync_count: 0,
            last_seen_at: Some(now),
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn two_strikes_reach_quarantine() {
        let mut item = item(ItemState::Active);
        assert_eq!(item.record_missing(Utc::now()), ItemState::MissingUpstream);
        assert_eq!(item.missing_since_sync_count, 1);
        assert_eq!(item.record_missing(Utc::now()), ItemState::Quarantined);
        assert_eq!(item.missing_since_sync_count, 2);
    }

    #[test]
    fn reappearance_resets_counter_and_state() {
        let mut item = item(ItemState::Active);
        item.record_missing(Utc::now());
        item.mark_reappeared(Utc::now());
        assert_eq!(item.state, ItemState::Active);
        assert_eq!(item.missing_since_sync_count, 0);
    }

    #[test]
    fn reappearance_from_quarantine_restores_active() {
        let mut item = item(ItemState::Quarantined);
        item.missing_since_sync_count = 2;
        item.mark_reappeared(Utc::now());
        assert_eq!(item.state, ItemState::Active);
        assert_eq!(item.missing_since_sync_count, 0);
    }

    #[test]
    fn missing_count_is_monotonic_while_unseen() {
        let mut item = item(ItemState::Active);
        let mut last = 0;
        for _ in 0..4 {
            item.record_missing(Utc::now());
            assert!(item.missing_since_sync_count > last);
            last = item.missing_since_sync_count;
        }
        assert_eq!(item.state, ItemState::Quarantined);
    }

    #[test]
    fn explicit_delete_zeroes_counter() {
        let mut item = item(ItemState::Active);
        item.record_missing(Utc::now());
        item.mark_deleted_upstream(Utc::now());
        assert_eq!(item.state, ItemState::DeletedUpstream);
        assert_eq!(item.missing_since_sync_count, 0);
    }

    #[test]
    fn purge_only_from_quarantine() {
        let mut active = item(ItemState::Active);
        assert!(active.mark_purged(Utc::now()).is_err());

        let mut quarantined = item(ItemState::Quarantined);
        quarantined.mark_purged(Utc::now()).unwrap();
        assert_eq!(quarantined.state, ItemState::Purged);
    }

    #[test]
    fn content_changed_compares_etag_and_mtime() {
        let item = item(ItemState::Active);
        let mtime = item.provider_modified_at;
        assert!(!item.content_changed(Some("e1"), mtime));
        assert!(item.content_changed(Some("e2"), mtime));
        assert!(item.content_changed(Some("e1"), Some(Utc::now())));
        // Providers that omit the etag fall back to the modification time.
        assert!(item.content_changed(None, mtime));
    }

    #[test]
    fn state_round_trip() {
        for state in [
            ItemState::Active,
            ItemState::DeletedUpstream,
            ItemState::MissingUpstream,
            ItemState::Quarantined,
            ItemState::Purged,
        ] {
            assert_eq!(ItemState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ItemState::parse("gone").is_err());
    }
}
