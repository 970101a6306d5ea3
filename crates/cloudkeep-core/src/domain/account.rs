//! Account and sync-root entities.
//!
//! An [`Account`] is a credential-holding principal, unique by
//! `(provider, email)`. Its OAuth tokens live outside the catalog, in the
//! secrets file (see [`crate::secrets`]). A [`SyncRoot`] is one subtree of
//! the account's remote storage selected for replication; it owns the
//! resumable change cursor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{AccountId, ProviderKind, SyncRootId};

/// A configured cloud storage account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub provider: ProviderKind,
    /// Display name shown by the CLI.
    pub name: String,
    pub email: String,
    /// Disabled accounts abort sync before any provider call.
    pub is_active: bool,
    /// Minutes between scheduled syncs; 0 leaves scheduling to the caller.
    pub sync_interval_minutes: u32,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Key for this account's token record in the secrets file.
    pub fn secrets_key(&self) -> String {
        format!("{}:{}", self.provider, self.email)
    }
}

/// Insertion form of [`Account`] (the catalog assigns the id).
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub provider: ProviderKind,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub sync_interval_minutes: u32,
}

impl NewAccount {
    pub fn new(provider: ProviderKind, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
            email: email.into(),
            is_active: true,
            sync_interval_minutes: 360,
        }
    }
}

/// A remote subtree being replicated, with its persisted change cursor.
///
/// The cursor is the resume point: sync is idempotent from any persisted
/// cursor, and it only advances when a sync completes successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRoot {
    pub id: SyncRootId,
    pub account_id: AccountId,
    /// Provider-side id of the subtree root (e.g. `"root"` for My Drive).
    pub provider_root_id: String,
    pub name: String,
    /// Opaque provider token; empty until the first successful sync.
    pub sync_cursor: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl SyncRoot {
    /// Whether the next sync must be an initial bulk replication.
    ///
    /// Both conditions are required: a cursor without a completed sync (or
    /// the reverse) means the previous initial run did not finish.
    pub fn needs_initial_sync(&self) -> bool {
        self.sync_cursor.is_empty() || self.last_sync_at.is_none()
    }
}

/// Insertion form of [`SyncRoot`].
#[derive(Debug, Clone)]
pub struct NewSyncRoot {
    pub account_id: AccountId,
    pub provider_root_id: String,
    pub name: String,
    pub is_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: AccountId(1),
            provider: ProviderKind::GoogleDrive,
            name: "Personal".into(),
            email: "user@example.com".into(),
            is_active: true,
            sync_interval_minutes: 360,
            next_sync_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn secrets_key_is_provider_colon_email() {
        assert_eq!(account().secrets_key(), "google_drive:user@example.com");
    }

    #[test]
    fn fresh_root_needs_initial_sync() {
        let mut root = SyncRoot {
            id: SyncRootId(1),
            account_id: AccountId(1),
            provider_root_id: "root".into(),
            name: "My Drive".into(),
            sync_cursor: String::new(),
            last_sync_at: None,
            is_enabled: true,
            created_at: Utc::now(),
        };
        assert!(root.needs_initial_sync());

        // A cursor alone is not enough; the initial run must have completed.
        root.sync_cursor = "1042".into();
        assert!(root.needs_initial_sync());

        root.last_sync_at = Some(Utc::now());
        assert!(!root.needs_initial_sync());
    }
}
