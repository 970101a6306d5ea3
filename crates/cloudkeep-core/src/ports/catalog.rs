//! Catalog port (persistent metadata store).
//!
//! Covers every entity the engine and GC read or write. Storage errors are
//! adapter-specific, so methods return `anyhow::Result`; each call is
//! individually atomic, and upserts are keyed by the natural keys from the
//! data model (`(sync_root, provider_item_id)` for items, digest for blobs)
//! so that replaying a change stream is idempotent.

use chrono::{DateTime, Utc};

use crate::domain::{
    Account, AccountId, BackupBlob, BackupItem, BackupItemId, Digest, FileVersion, FileVersionId,
    NewAccount, NewBackupItem, NewFileVersion, NewRetentionPolicy, NewSyncEvent, NewSyncRoot,
    NewSyncSession, RetentionPolicy, SessionId, SyncEvent, SyncRoot, SyncRootId, SyncSession,
};

/// Port trait for the persistent metadata catalog.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    // --- Accounts ---

    async fn insert_account(&self, account: &NewAccount) -> anyhow::Result<Account>;

    async fn get_account(&self, id: AccountId) -> anyhow::Result<Option<Account>>;

    /// Write back an account's mutable fields (activation, scheduling).
    async fn update_account(&self, account: &Account) -> anyhow::Result<()>;

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>>;

    // --- Sync roots ---

    async fn insert_sync_root(&self, root: &NewSyncRoot) -> anyhow::Result<SyncRoot>;

    async fn get_sync_root(&self, id: SyncRootId) -> anyhow::Result<Option<SyncRoot>>;

    async fn sync_roots_for_account(&self, account_id: AccountId)
        -> anyhow::Result<Vec<SyncRoot>>;

    /// Persist the cursor and last-sync time after a successful sync.
    /// This is the only legal cursor advance.
    async fn update_sync_root_cursor(
        &self,
        id: SyncRootId,
        cursor: &str,
        last_sync_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    // --- Backup items ---

    async fn find_item(
        &self,
        sync_root_id: SyncRootId,
        provider_item_id: &str,
    ) -> anyhow::Result<Option<BackupItem>>;

    /// Path-uniqueness lookup for the path builder; ignores `PURGED` items.
    async fn find_item_by_path(
        &self,
        sync_root_id: SyncRootId,
        path: &str,
    ) -> anyhow::Result<Option<BackupItem>>;

    async fn insert_item(&self, item: &NewBackupItem) -> anyhow::Result<BackupItem>;

    /// Write back every mutable field of an existing item.
    async fn update_item(&self, item: &BackupItem) -> anyhow::Result<()>;

    /// `(provider_item_id, path)` pairs for warm-starting a path cache.
    async fn item_paths(&self, sync_root_id: SyncRootId) -> anyhow::Result<Vec<(String, String)>>;

    /// Items in ACTIVE or MISSING_UPSTREAM state whose `last_seen_at`
    /// predates `since` — the deletion sweep's working set.
    async fn items_unseen_since(
        &self,
        sync_root_id: SyncRootId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupItem>>;

    /// Every item belonging to the account, across its sync roots.
    async fn items_for_account(&self, account_id: AccountId) -> anyhow::Result<Vec<BackupItem>>;

    /// QUARANTINED items whose state change predates `cutoff`.
    async fn quarantined_items_before(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupItem>>;

    // --- Blobs ---

    /// Insert the blob row if absent; existing rows are left untouched
    /// (a dedup hit in the store maps to a no-op here).
    async fn upsert_blob(
        &self,
        digest: &Digest,
        account_id: AccountId,
        size_bytes: i64,
    ) -> anyhow::Result<BackupBlob>;

    async fn get_blob(&self, digest: &Digest) -> anyhow::Result<Option<BackupBlob>>;

    /// Blobs with zero referencing file versions, optionally scoped to one
    /// account.
    async fn orphan_blobs(&self, account_id: Option<AccountId>)
        -> anyhow::Result<Vec<BackupBlob>>;

    async fn delete_blob_record(&self, digest: &Digest) -> anyhow::Result<()>;

    // --- File versions ---

    async fn insert_version(&self, version: &NewFileVersion) -> anyhow::Result<FileVersion>;

    /// Most recently captured version for an item, if any.
    async fn latest_version(&self, item_id: BackupItemId)
        -> anyhow::Result<Option<FileVersion>>;

    /// All versions for an item, newest first.
    async fn versions_for_item(&self, item_id: BackupItemId)
        -> anyhow::Result<Vec<FileVersion>>;

    async fn delete_versions(&self, ids: &[FileVersionId]) -> anyhow::Result<u64>;

    // --- Sessions and events ---

    async fn insert_session(&self, session: &NewSyncSession) -> anyhow::Result<SyncSession>;

    async fn update_session(&self, session: &SyncSession) -> anyhow::Result<()>;

    /// Sessions for a root, newest first.
    async fn sessions_for_root(
        &self,
        sync_root_id: SyncRootId,
    ) -> anyhow::Result<Vec<SyncSession>>;

    async fn insert_event(&self, event: &NewSyncEvent) -> anyhow::Result<SyncEvent>;

    /// Events for a session in insertion order.
    async fn events_for_session(&self, session_id: SessionId)
        -> anyhow::Result<Vec<SyncEvent>>;

    // --- Retention ---

    async fn insert_retention_policy(
        &self,
        policy: &NewRetentionPolicy,
    ) -> anyhow::Result<RetentionPolicy>;

    /// The account-scoped policy (`sync_root IS NULL`), if one exists.
    async fn retention_policy_for_account(
        &self,
        account_id: AccountId,
    ) -> anyhow::Result<Option<RetentionPolicy>>;
}
