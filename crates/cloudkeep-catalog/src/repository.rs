//! SQLite implementation of the Catalog port.
//!
//! ## Type mapping
//!
//! | Domain type       | SQL type | Strategy                                  |
//! |-------------------|----------|-------------------------------------------|
//! | id newtypes       | INTEGER  | `as_i64()` / `From<i64>`                  |
//! | Digest            | TEXT     | `as_str()` / `Digest::parse`              |
//! | ProviderKind      | TEXT     | `as_str()` / `FromStr`                    |
//! | state enums       | TEXT     | `as_str()` / `parse`                      |
//! | DateTime<Utc>     | TEXT     | fixed-width RFC 3339 (`.123456Z`), so     |
//! |                   |          | lexicographic order == chronological      |

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use cloudkeep_core::domain::{
    Account, AccountId, BackupBlob, BackupItem, BackupItemId, Digest, EventKind, FileVersion,
    FileVersionId, ItemState, ItemType, NewAccount, NewBackupItem, NewFileVersion,
    NewRetentionPolicy, NewSyncEvent, NewSyncRoot, NewSyncSession, ProviderKind, RetentionPolicy,
    SessionId, SessionStatus, SyncEvent, SyncRoot, SyncRootId, SyncSession, VersionReason,
};
use cloudkeep_core::ports::Catalog;

use crate::{CatalogError, CatalogPool};

/// SQLite-backed catalog.
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: &CatalogPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }
}

// ============================================================================
// Timestamp helpers
// ============================================================================

fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn fmt_opt_ts(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_ts)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::Decode(format!("bad timestamp '{s}': {e}")))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, CatalogError> {
    match s {
        Some(ref v) if !v.is_empty() => parse_ts(v).map(Some),
        _ => Ok(None),
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn account_from_row(row: &SqliteRow) -> Result<Account, CatalogError> {
    let provider: String = row.get("provider");
    let next_sync_at: Option<String> = row.get("next_sync_at");
    let created_at: String = row.get("created_at");
    Ok(Account {
        id: AccountId(row.get("id")),
        provider: provider
            .parse::<ProviderKind>()
            .map_err(|e| CatalogError::Decode(e.to_string()))?,
        name: row.get("name"),
        email: row.get("email"),
        is_active: row.get::<i64, _>("is_active") != 0,
        sync_interval_minutes: row.get::<i64, _>("sync_interval_minutes") as u32,
        next_sync_at: parse_opt_ts(next_sync_at)?,
        created_at: parse_ts(&created_at)?,
    })
}

fn sync_root_from_row(row: &SqliteRow) -> Result<SyncRoot, CatalogError> {
    let last_sync_at: Option<String> = row.get("last_sync_at");
    let created_at: String = row.get("created_at");
    Ok(SyncRoot {
        id: SyncRootId(row.get("id")),
        account_id: AccountId(row.get("account_id")),
        provider_root_id: row.get("provider_root_id"),
        name: row.get("name"),
        sync_cursor: row.get("sync_cursor"),
        last_sync_at: parse_opt_ts(last_sync_at)?,
        is_enabled: row.get::<i64, _>("is_enabled") != 0,
        created_at: parse_ts(&created_at)?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<BackupItem, CatalogError> {
    let item_type: String = row.get("item_type");
    let state: String = row.get("state");
    let provider_modified_at: Option<String> = row.get("provider_modified_at");
    let state_changed_at: String = row.get("state_changed_at");
    let last_seen_at: Option<String> = row.get("last_seen_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(BackupItem {
        id: BackupItemId(row.get("id")),
        sync_root_id: SyncRootId(row.get("sync_root_id")),
        provider_item_id: row.get("provider_item_id"),
        name: row.get("name"),
        path: row.get("path"),
        item_type: ItemType::parse(&item_type)
            .map_err(|e| CatalogError::Decode(e.to_string()))?,
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        provider_modified_at: parse_opt_ts(provider_modified_at)?,
        etag: row.get("etag"),
        state: ItemState::parse(&state).map_err(|e| CatalogError::Decode(e.to_string()))?,
        state_changed_at: parse_ts(&state_changed_at)?,
        missing_since_sync_count: row.get::<i64, _>("missing_since_sync_count") as u32,
        last_seen_at: parse_opt_ts(last_seen_at)?,
        parent_id: row
            .get::<Option<i64>, _>("parent_id")
            .map(BackupItemId),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn blob_from_row(row: &SqliteRow) -> Result<BackupBlob, CatalogError> {
    let digest: String = row.get("digest");
    let created_at: String = row.get("created_at");
    Ok(BackupBlob {
        digest: Digest::parse(digest).map_err(|e| CatalogError::Decode(e.to_string()))?,
        account_id: AccountId(row.get("account_id")),
        size_bytes: row.get("size_bytes"),
        created_at: parse_ts(&created_at)?,
    })
}

fn version_from_row(row: &SqliteRow) -> Result<FileVersion, CatalogError> {
    let digest: String = row.get("digest");
    let reason: String = row.get("reason");
    let content_modified_at: Option<String> = row.get("content_modified_at");
    let captured_at: String = row.get("captured_at");
    Ok(FileVersion {
        id: FileVersionId(row.get("id")),
        account_id: AccountId(row.get("account_id")),
        backup_item_id: BackupItemId(row.get("backup_item_id")),
        digest: Digest::parse(digest).map_err(|e| CatalogError::Decode(e.to_string()))?,
        observed_path: row.get("observed_path"),
        etag_or_revision: row.get("etag_or_revision"),
        content_modified_at: parse_opt_ts(content_modified_at)?,
        captured_at: parse_ts(&captured_at)?,
        reason: VersionReason::parse(&reason)
            .map_err(|e| CatalogError::Decode(e.to_string()))?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SyncSession, CatalogError> {
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");
    Ok(SyncSession {
        id: SessionId(row.get("id")),
        sync_root_id: SyncRootId(row.get("sync_root_id")),
        started_at: parse_ts(&started_at)?,
        completed_at: parse_opt_ts(completed_at)?,
        is_initial: row.get::<i64, _>("is_initial") != 0,
        start_cursor: row.get("start_cursor"),
        end_cursor: row.get("end_cursor"),
        status: SessionStatus::parse(&status)
            .map_err(|e| CatalogError::Decode(e.to_string()))?,
        files_added: row.get::<i64, _>("files_added") as u32,
        files_updated: row.get::<i64, _>("files_updated") as u32,
        files_deleted: row.get::<i64, _>("files_deleted") as u32,
        files_quarantined: row.get::<i64, _>("files_quarantined") as u32,
        bytes_downloaded: row.get::<i64, _>("bytes_downloaded") as u64,
        error_message: row.get("error_message"),
    })
}

fn event_from_row(row: &SqliteRow) -> Result<SyncEvent, CatalogError> {
    let event_type: String = row.get("event_type");
    let timestamp: String = row.get("timestamp");
    Ok(SyncEvent {
        id: row.get("id"),
        session_id: SessionId(row.get("session_id")),
        timestamp: parse_ts(&timestamp)?,
        event_type: EventKind::parse(&event_type)
            .map_err(|e| CatalogError::Decode(e.to_string()))?,
        backup_item_id: row
            .get::<Option<i64>, _>("backup_item_id")
            .map(BackupItemId),
        provider_file_id: row.get("provider_file_id"),
        file_path: row.get("file_path"),
        message: row.get("message"),
    })
}

fn policy_from_row(row: &SqliteRow) -> Result<RetentionPolicy, CatalogError> {
    let created_at: String = row.get("created_at");
    Ok(RetentionPolicy {
        id: row.get("id"),
        account_id: row.get::<Option<i64>, _>("account_id").map(AccountId),
        sync_root_id: row.get::<Option<i64>, _>("sync_root_id").map(SyncRootId),
        keep_last_n: row.get::<i64, _>("keep_last_n") as u32,
        keep_days: row.get::<i64, _>("keep_days") as u32,
        max_storage_bytes: row.get("max_storage_bytes"),
        created_at: parse_ts(&created_at)?,
    })
}

// ============================================================================
// Catalog implementation
// ============================================================================

#[async_trait::async_trait]
impl Catalog for SqliteCatalog {
    async fn insert_account(&self, account: &NewAccount) -> anyhow::Result<Account> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO accounts \
             (provider, name, email, is_active, sync_interval_minutes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(account.provider.as_str())
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.is_active as i64)
        .bind(account.sync_interval_minutes as i64)
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(Account {
            id: AccountId(result.last_insert_rowid()),
            provider: account.provider,
            name: account.name.clone(),
            email: account.email.clone(),
            is_active: account.is_active,
            sync_interval_minutes: account.sync_interval_minutes,
            next_sync_at: None,
            created_at: now,
        })
    }

    async fn get_account(&self, id: AccountId) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose().map_err(Into::into)
    }

    async fn update_account(&self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE accounts SET \
             name = ?, is_active = ?, sync_interval_minutes = ?, next_sync_at = ? \
             WHERE id = ?",
        )
        .bind(&account.name)
        .bind(account.is_active as i64)
        .bind(account.sync_interval_minutes as i64)
        .bind(fmt_opt_ts(account.next_sync_at))
        .bind(account.id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(account_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn insert_sync_root(&self, root: &NewSyncRoot) -> anyhow::Result<SyncRoot> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sync_roots \
             (account_id, provider_root_id, name, sync_cursor, is_enabled, created_at) \
             VALUES (?, ?, ?, '', ?, ?)",
        )
        .bind(root.account_id.as_i64())
        .bind(&root.provider_root_id)
        .bind(&root.name)
        .bind(root.is_enabled as i64)
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(SyncRoot {
            id: SyncRootId(result.last_insert_rowid()),
            account_id: root.account_id,
            provider_root_id: root.provider_root_id.clone(),
            name: root.name.clone(),
            sync_cursor: String::new(),
            last_sync_at: None,
            is_enabled: root.is_enabled,
            created_at: now,
        })
    }

    async fn get_sync_root(&self, id: SyncRootId) -> anyhow::Result<Option<SyncRoot>> {
        let row = sqlx::query("SELECT * FROM sync_roots WHERE id = ?")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(sync_root_from_row).transpose().map_err(Into::into)
    }

    async fn sync_roots_for_account(
        &self,
        account_id: AccountId,
    ) -> anyhow::Result<Vec<SyncRoot>> {
        let rows = sqlx::query("SELECT * FROM sync_roots WHERE account_id = ? ORDER BY id")
            .bind(account_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(sync_root_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn update_sync_root_cursor(
        &self,
        id: SyncRootId,
        cursor: &str,
        last_sync_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE sync_roots SET sync_cursor = ?, last_sync_at = ? WHERE id = ?")
            .bind(cursor)
            .bind(fmt_ts(last_sync_at))
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_item(
        &self,
        sync_root_id: SyncRootId,
        provider_item_id: &str,
    ) -> anyhow::Result<Option<BackupItem>> {
        let row = sqlx::query(
            "SELECT * FROM backup_items WHERE sync_root_id = ? AND provider_item_id = ?",
        )
        .bind(sync_root_id.as_i64())
        .bind(provider_item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(item_from_row).transpose().map_err(Into::into)
    }

    async fn find_item_by_path(
        &self,
        sync_root_id: SyncRootId,
        path: &str,
    ) -> anyhow::Result<Option<BackupItem>> {
        let row = sqlx::query(
            "SELECT * FROM backup_items \
             WHERE sync_root_id = ? AND path = ? AND state != 'purged' \
             LIMIT 1",
        )
        .bind(sync_root_id.as_i64())
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(item_from_row).transpose().map_err(Into::into)
    }

    async fn insert_item(&self, item: &NewBackupItem) -> anyhow::Result<BackupItem> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO backup_items \
             (sync_root_id, provider_item_id, name, path, item_type, mime_type, size_bytes, \
              provider_modified_at, etag, state, state_changed_at, missing_since_sync_count, \
              last_seen_at, parent_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, 0, ?, ?, ?, ?)",
        )
        .bind(item.sync_root_id.as_i64())
        .bind(&item.provider_item_id)
        .bind(&item.name)
        .bind(&item.path)
        .bind(item.item_type.as_str())
        .bind(&item.mime_type)
        .bind(item.size_bytes)
        .bind(fmt_opt_ts(item.provider_modified_at))
        .bind(&item.etag)
        .bind(fmt_ts(now))
        .bind(fmt_opt_ts(item.last_seen_at))
        .bind(item.parent_id.map(|p| p.as_i64()))
        .bind(fmt_ts(now))
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(BackupItem {
            id: BackupItemId(result.last_insert_rowid()),
            sync_root_id: item.sync_root_id,
            provider_item_id: item.provider_item_id.clone(),
            name: item.name.clone(),
            path: item.path.clone(),
            item_type: item.item_type,
            mime_type: item.mime_type.clone(),
            size_bytes: item.size_bytes,
            provider_modified_at: item.provider_modified_at,
            etag: item.etag.clone(),
            state: ItemState::Active,
            state_changed_at: now,
            missing_since_sync_count: 0,
            last_seen_at: item.last_seen_at,
            parent_id: item.parent_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_item(&self, item: &BackupItem) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE backup_items SET \
             name = ?, path = ?, item_type = ?, mime_type = ?, size_bytes = ?, \
             provider_modified_at = ?, etag = ?, state = ?, state_changed_at = ?, \
             missing_since_sync_count = ?, last_seen_at = ?, parent_id = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&item.name)
        .bind(&item.path)
        .bind(item.item_type.as_str())
        .bind(&item.mime_type)
        .bind(item.size_bytes)
        .bind(fmt_opt_ts(item.provider_modified_at))
        .bind(&item.etag)
        .bind(item.state.as_str())
        .bind(fmt_ts(item.state_changed_at))
        .bind(item.missing_since_sync_count as i64)
        .bind(fmt_opt_ts(item.last_seen_at))
        .bind(item.parent_id.map(|p| p.as_i64()))
        .bind(fmt_ts(Utc::now()))
        .bind(item.id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn item_paths(
        &self,
        sync_root_id: SyncRootId,
    ) -> anyhow::Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT provider_item_id, path FROM backup_items WHERE sync_root_id = ?",
        )
        .bind(sync_root_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("provider_item_id"), row.get("path")))
            .collect())
    }

    async fn items_unseen_since(
        &self,
        sync_root_id: SyncRootId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupItem>> {
        let rows = sqlx::query(
            "SELECT * FROM backup_items \
             WHERE sync_root_id = ? \
               AND state IN ('active', 'missing_upstream') \
               AND last_seen_at IS NOT NULL AND last_seen_at < ? \
             ORDER BY id",
        )
        .bind(sync_root_id.as_i64())
        .bind(fmt_ts(since))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(item_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn items_for_account(
        &self,
        account_id: AccountId,
    ) -> anyhow::Result<Vec<BackupItem>> {
        let rows = sqlx::query(
            "SELECT i.* FROM backup_items i \
             JOIN sync_roots r ON r.id = i.sync_root_id \
             WHERE r.account_id = ? \
             ORDER BY i.id",
        )
        .bind(account_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(item_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn quarantined_items_before(
        &self,
        account_id: AccountId,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<BackupItem>> {
        let rows = sqlx::query(
            "SELECT i.* FROM backup_items i \
             JOIN sync_roots r ON r.id = i.sync_root_id \
             WHERE r.account_id = ? AND i.state = 'quarantined' AND i.state_changed_at < ? \
             ORDER BY i.id",
        )
        .bind(account_id.as_i64())
        .bind(fmt_ts(cutoff))
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(item_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn upsert_blob(
        &self,
        digest: &Digest,
        account_id: AccountId,
        size_bytes: i64,
    ) -> anyhow::Result<BackupBlob> {
        sqlx::query(
            "INSERT INTO backup_blobs (digest, account_id, size_bytes, created_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (digest) DO NOTHING",
        )
        .bind(digest.as_str())
        .bind(account_id.as_i64())
        .bind(size_bytes)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.get_blob(digest)
            .await?
            .ok_or_else(|| anyhow::anyhow!("blob row vanished after upsert: {digest}"))
    }

    async fn get_blob(&self, digest: &Digest) -> anyhow::Result<Option<BackupBlob>> {
        let row = sqlx::query("SELECT * FROM backup_blobs WHERE digest = ?")
            .bind(digest.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(blob_from_row).transpose().map_err(Into::into)
    }

    async fn orphan_blobs(
        &self,
        account_id: Option<AccountId>,
    ) -> anyhow::Result<Vec<BackupBlob>> {
        let sql = "SELECT b.* FROM backup_blobs b \
                   LEFT JOIN file_versions v ON v.digest = b.digest \
                   WHERE v.id IS NULL AND (? IS NULL OR b.account_id = ?) \
                   ORDER BY b.digest";
        let account = account_id.map(|a| a.as_i64());
        let rows = sqlx::query(sql)
            .bind(account)
            .bind(account)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(blob_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn delete_blob_record(&self, digest: &Digest) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM backup_blobs WHERE digest = ?")
            .bind(digest.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_version(&self, version: &NewFileVersion) -> anyhow::Result<FileVersion> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO file_versions \
             (account_id, backup_item_id, digest, observed_path, etag_or_revision, \
              content_modified_at, captured_at, reason) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(version.account_id.as_i64())
        .bind(version.backup_item_id.as_i64())
        .bind(version.digest.as_str())
        .bind(&version.observed_path)
        .bind(&version.etag_or_revision)
        .bind(fmt_opt_ts(version.content_modified_at))
        .bind(fmt_ts(now))
        .bind(version.reason.as_str())
        .execute(&self.pool)
        .await?;

        Ok(FileVersion {
            id: FileVersionId(result.last_insert_rowid()),
            account_id: version.account_id,
            backup_item_id: version.backup_item_id,
            digest: version.digest.clone(),
            observed_path: version.observed_path.clone(),
            etag_or_revision: version.etag_or_revision.clone(),
            content_modified_at: version.content_modified_at,
            captured_at: now,
            reason: version.reason,
        })
    }

    async fn latest_version(
        &self,
        item_id: BackupItemId,
    ) -> anyhow::Result<Option<FileVersion>> {
        let row = sqlx::query(
            "SELECT * FROM file_versions WHERE backup_item_id = ? \
             ORDER BY captured_at DESC, id DESC LIMIT 1",
        )
        .bind(item_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(version_from_row).transpose().map_err(Into::into)
    }

    async fn versions_for_item(
        &self,
        item_id: BackupItemId,
    ) -> anyhow::Result<Vec<FileVersion>> {
        let rows = sqlx::query(
            "SELECT * FROM file_versions WHERE backup_item_id = ? \
             ORDER BY captured_at DESC, id DESC",
        )
        .bind(item_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(version_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn delete_versions(&self, ids: &[FileVersionId]) -> anyhow::Result<u64> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM file_versions WHERE id = ?")
                .bind(id.as_i64())
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    async fn insert_session(&self, session: &NewSyncSession) -> anyhow::Result<SyncSession> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sync_sessions (sync_root_id, started_at, is_initial, start_cursor) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(session.sync_root_id.as_i64())
        .bind(fmt_ts(now))
        .bind(session.is_initial as i64)
        .bind(&session.start_cursor)
        .execute(&self.pool)
        .await?;

        Ok(SyncSession {
            id: SessionId(result.last_insert_rowid()),
            sync_root_id: session.sync_root_id,
            started_at: now,
            completed_at: None,
            is_initial: session.is_initial,
            start_cursor: session.start_cursor.clone(),
            end_cursor: String::new(),
            status: SessionStatus::Running,
            files_added: 0,
            files_updated: 0,
            files_deleted: 0,
            files_quarantined: 0,
            bytes_downloaded: 0,
            error_message: String::new(),
        })
    }

    async fn update_session(&self, session: &SyncSession) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE sync_sessions SET \
             completed_at = ?, end_cursor = ?, status = ?, files_added = ?, \
             files_updated = ?, files_deleted = ?, files_quarantined = ?, \
             bytes_downloaded = ?, error_message = ? \
             WHERE id = ?",
        )
        .bind(fmt_opt_ts(session.completed_at))
        .bind(&session.end_cursor)
        .bind(session.status.as_str())
        .bind(session.files_added as i64)
        .bind(session.files_updated as i64)
        .bind(session.files_deleted as i64)
        .bind(session.files_quarantined as i64)
        .bind(session.bytes_downloaded as i64)
        .bind(&session.error_message)
        .bind(session.id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sessions_for_root(
        &self,
        sync_root_id: SyncRootId,
    ) -> anyhow::Result<Vec<SyncSession>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_sessions WHERE sync_root_id = ? ORDER BY id DESC",
        )
        .bind(sync_root_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(session_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn insert_event(&self, event: &NewSyncEvent) -> anyhow::Result<SyncEvent> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sync_events \
             (session_id, timestamp, event_type, backup_item_id, provider_file_id, \
              file_path, message) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.session_id.as_i64())
        .bind(fmt_ts(now))
        .bind(event.event_type.as_str())
        .bind(event.backup_item_id.map(|i| i.as_i64()))
        .bind(&event.provider_file_id)
        .bind(&event.file_path)
        .bind(&event.message)
        .execute(&self.pool)
        .await?;

        Ok(SyncEvent {
            id: result.last_insert_rowid(),
            session_id: event.session_id,
            timestamp: now,
            event_type: event.event_type,
            backup_item_id: event.backup_item_id,
            provider_file_id: event.provider_file_id.clone(),
            file_path: event.file_path.clone(),
            message: event.message.clone(),
        })
    }

    async fn events_for_session(
        &self,
        session_id: SessionId,
    ) -> anyhow::Result<Vec<SyncEvent>> {
        let rows = sqlx::query("SELECT * FROM sync_events WHERE session_id = ? ORDER BY id")
            .bind(session_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(event_from_row)
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    async fn insert_retention_policy(
        &self,
        policy: &NewRetentionPolicy,
    ) -> anyhow::Result<RetentionPolicy> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO retention_policies \
             (account_id, sync_root_id, keep_last_n, keep_days, max_storage_bytes, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(policy.account_id.map(|a| a.as_i64()))
        .bind(policy.sync_root_id.map(|r| r.as_i64()))
        .bind(policy.keep_last_n as i64)
        .bind(policy.keep_days as i64)
        .bind(policy.max_storage_bytes)
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;

        Ok(RetentionPolicy {
            id: result.last_insert_rowid(),
            account_id: policy.account_id,
            sync_root_id: policy.sync_root_id,
            keep_last_n: policy.keep_last_n,
            keep_days: policy.keep_days,
            max_storage_bytes: policy.max_storage_bytes,
            created_at: now,
        })
    }

    async fn retention_policy_for_account(
        &self,
        account_id: AccountId,
    ) -> anyhow::Result<Option<RetentionPolicy>> {
        let row = sqlx::query(
            "SELECT * FROM retention_policies \
             WHERE account_id = ? AND sync_root_id IS NULL \
             ORDER BY id LIMIT 1",
        )
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(policy_from_row).transpose().map_err(Into::into)
    }
}
