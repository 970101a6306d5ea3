//! The sync engine.
//!
//! Orchestrates one sync of one sync root. A run is *initial* when the root
//! has no persisted cursor or no completed sync; otherwise it is
//! *incremental*:
//!
//! 1. Refresh tokens, check preconditions, claim the per-root lock.
//! 2. Open a session (status `running`, `start_cursor` recorded).
//! 3. Initial: enumerate everything from token `"1"` up to a freshly
//!    fetched start page token, processing additions only — the initial
//!    replication must not fabricate deletions for files it never knew.
//!    Incremental: stream changes from the persisted cursor, then run the
//!    two-strike deletion sweep.
//! 4. Checkpoint the session cursor after every batch; advance the sync
//!    root's cursor only on successful completion.
//!
//! Per-change failures are caught, logged as error events, and accumulated;
//! the batch continues. Transient provider errors retry with exponential
//! backoff before they count as failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cloudkeep_core::domain::{
    Account, BackupItem, BackupItemId, Digest, EventKind, ItemState, ItemType, NewBackupItem,
    NewFileVersion, NewSyncEvent, NewSyncSession, SyncRoot, SyncRootId, SyncSession,
    VersionReason,
};
use cloudkeep_core::ports::{Catalog, ChangeRecord, ChangesPage, ProviderClient, ProviderError,
    RemoteFile};
use cloudkeep_store::{AccountStore, StoreError};

use crate::path_builder::PathBuilder;
use crate::root_lock::RootLockRegistry;
use crate::SyncError;

/// Maximum retries for transient provider errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff.
const BASE_DELAY_SECS: u64 = 1;

/// Summary of a completed sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub files_added: u32,
    pub files_updated: u32,
    pub files_deleted: u32,
    pub files_quarantined: u32,
    pub bytes_downloaded: u64,
    /// Per-change errors that were caught and skipped.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Retry a provider call on transient errors with exponential backoff.
async fn with_retry<F, Fut, T>(operation: &str, f: F) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < MAX_RETRIES && err.is_transient() => {
                let delay = BASE_DELAY_SECS * 2u64.pow(attempt);
                warn!(operation, attempt, delay, error = %err, "Transient error, retrying");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Sync engine for one account's store.
///
/// The engine is single-threaded within a run: changes are consumed
/// sequentially. Distinct roots and accounts may run in parallel; the
/// [`RootLockRegistry`] refuses a second concurrent run of the same root.
pub struct SyncEngine {
    catalog: Arc<dyn Catalog>,
    provider: Arc<dyn ProviderClient>,
    store: AccountStore,
    locks: Arc<RootLockRegistry>,
    page_size: u32,
    use_hardlinks: bool,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        provider: Arc<dyn ProviderClient>,
        store: AccountStore,
        locks: Arc<RootLockRegistry>,
        page_size: u32,
        use_hardlinks: bool,
    ) -> Self {
        Self {
            catalog,
            provider,
            store,
            locks,
            page_size,
            use_hardlinks,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the run mid-stream when cancelled. The in-flight
    /// change is not committed, the session is marked failed, and the
    /// root's cursor stays put, so the next sync resumes cleanly.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute a sync of the given root.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, sync_root_id: SyncRootId) -> Result<SyncOutcome, SyncError> {
        let started = std::time::Instant::now();

        let root = self
            .catalog
            .get_sync_root(sync_root_id)
            .await
            .map_err(SyncError::Other)?
            .ok_or_else(|| SyncError::Aborted(format!("unknown sync root {sync_root_id}")))?;
        let account = self
            .catalog
            .get_account(root.account_id)
            .await
            .map_err(SyncError::Other)?
            .ok_or_else(|| SyncError::Aborted(format!("unknown account {}", root.account_id)))?;

        let _lock = self.locks.try_acquire(root.id).ok_or_else(|| {
            SyncError::Aborted(format!("sync already running for root {}", root.id))
        })?;

        self.provider
            .refresh_tokens_if_needed()
            .await
            .map_err(|e| SyncError::TokenRefresh(e.to_string()))?;

        if !account.is_active {
            return Err(SyncError::Aborted(format!(
                "account {} is disabled",
                account.id
            )));
        }
        if !root.is_enabled {
            return Err(SyncError::Aborted(format!("sync root {} is disabled", root.id)));
        }

        let sync_start = Utc::now();
        let is_initial = root.needs_initial_sync();

        let session = self
            .catalog
            .insert_session(&NewSyncSession {
                sync_root_id: root.id,
                is_initial,
                start_cursor: root.sync_cursor.clone(),
            })
            .await
            .map_err(SyncError::Other)?;

        info!(
            root = %root.id,
            account = %account.id,
            initial = is_initial,
            "Starting sync"
        );

        let paths = PathBuilder::new(root.clone(), Arc::clone(&self.catalog))
            .await
            .map_err(SyncError::Other)?;

        let mut run = SyncRun {
            engine: self,
            account,
            root,
            session,
            paths,
            sync_start,
            outcome: SyncOutcome::default(),
        };

        let result = if is_initial {
            run.run_initial().await
        } else {
            run.run_incremental().await
        };

        match result {
            Ok(()) => {
                let had_errors = !run.outcome.errors.is_empty();
                run.session.files_added = run.outcome.files_added;
                run.session.files_updated = run.outcome.files_updated;
                run.session.files_deleted = run.outcome.files_deleted;
                run.session.files_quarantined = run.outcome.files_quarantined;
                run.session.bytes_downloaded = run.outcome.bytes_downloaded;
                run.session.finish(had_errors, Utc::now());
                self.catalog
                    .update_session(&run.session)
                    .await
                    .map_err(SyncError::Other)?;

                run.outcome.duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    added = run.outcome.files_added,
                    updated = run.outcome.files_updated,
                    deleted = run.outcome.files_deleted,
                    quarantined = run.outcome.files_quarantined,
                    errors = run.outcome.errors.len(),
                    duration_ms = run.outcome.duration_ms,
                    "Sync completed"
                );
                Ok(run.outcome)
            }
            Err(err) => {
                error!(error = %err, "Sync failed");
                run.session.fail(err.to_string(), Utc::now());
                if let Err(save_err) = self.catalog.update_session(&run.session).await {
                    warn!(error = %save_err, "Failed to record failed session");
                }
                Err(err)
            }
        }
    }
}

/// Working state of one run.
struct SyncRun<'a> {
    engine: &'a SyncEngine,
    account: Account,
    root: SyncRoot,
    session: SyncSession,
    paths: PathBuilder,
    sync_start: DateTime<Utc>,
    outcome: SyncOutcome,
}

impl SyncRun<'_> {
    /// Initial bulk replication. Enumerates all changes from token `"1"`,
    /// filters out removals, and persists the pre-fetched start page token
    /// as the cursor once everything is in.
    async fn run_initial(&mut self) -> Result<(), SyncError> {
        let terminal = with_retry("get_start_page_token", || {
            let provider = Arc::clone(&self.engine.provider);
            async move { provider.get_start_page_token().await }
        })
        .await
        .map_err(|e| SyncError::Other(e.into()))?;
        debug!(terminal, "Initial sync terminal token");

        let mut page_token = "1".to_string();
        loop {
            let page = self.fetch_page(&page_token).await?;
            let current_token = current_token_of(&page, &page_token);

            let additions: Vec<&ChangeRecord> =
                page.changes.iter().filter(|c| !c.removed).collect();
            if !additions.is_empty() {
                debug!(
                    additions = additions.len(),
                    filtered = page.changes.len() - additions.len(),
                    "Processing initial batch"
                );
                self.process_batch(&additions, &current_token).await?;
            }

            if page.new_start_page_token.is_some() {
                break;
            }
            match page.next_page_token {
                Some(next) => page_token = next,
                None => break,
            }
        }

        self.finish_run(terminal).await
    }

    /// Incremental sync from the persisted cursor, followed by the
    /// deletion-state sweep.
    async fn run_incremental(&mut self) -> Result<(), SyncError> {
        let mut page_token = self.root.sync_cursor.clone();
        debug!(cursor = page_token, "Incremental sync from cursor");

        loop {
            let page = self.fetch_page(&page_token).await?;
            let current_token = current_token_of(&page, &page_token);

            if !page.changes.is_empty() {
                let changes: Vec<&ChangeRecord> = page.changes.iter().collect();
                self.process_batch(&changes, &current_token).await?;
            }

            if page.new_start_page_token.is_some() {
                break;
            }
            match page.next_page_token {
                Some(next) => page_token = next,
                None => break,
            }
        }

        let quarantined = self.sweep_deletions().await?;
        self.outcome.files_quarantined = quarantined;

        let cursor = if self.session.end_cursor.is_empty() {
            self.root.sync_cursor.clone()
        } else {
            self.session.end_cursor.clone()
        };
        self.finish_run(cursor).await
    }

    /// Persist the final cursor on the root and mirror it on the session.
    async fn finish_run(&mut self, cursor: String) -> Result<(), SyncError> {
        self.session.end_cursor = cursor.clone();
        self.engine
            .catalog
            .update_sync_root_cursor(self.root.id, &cursor, Utc::now())
            .await
            .map_err(SyncError::Other)?;
        debug!(cursor, "Cursor persisted");
        Ok(())
    }

    async fn fetch_page(&self, page_token: &str) -> Result<ChangesPage, SyncError> {
        let page_size = self.engine.page_size;
        with_retry("list_changes", || {
            let provider = Arc::clone(&self.engine.provider);
            let token = page_token.to_string();
            async move { provider.list_changes(&token, page_size).await }
        })
        .await
        .map_err(|e| SyncError::Other(e.into()))
    }

    /// Process one batch of changes, isolating per-change failures, then
    /// checkpoint the latest known cursor on the session.
    async fn process_batch(
        &mut self,
        changes: &[&ChangeRecord],
        current_token: &str,
    ) -> Result<(), SyncError> {
        for change in changes {
            if self.engine.cancel.is_cancelled() {
                return Err(SyncError::Aborted("sync cancelled".to_string()));
            }

            match self.process_change(change).await {
                Ok(()) => {}
                Err(err @ (SyncError::Aborted(_) | SyncError::Other(_))) => {
                    // Infrastructure failures are not per-change conditions.
                    return Err(err);
                }
                Err(err) => {
                    let message = format!(
                        "Error processing change for {}: {err}",
                        change.file_id
                    );
                    warn!(%message);
                    self.emit_event(
                        NewSyncEvent::new(self.session.id, EventKind::Error)
                            .with_provider_file_id(&change.file_id)
                            .with_message(err.to_string()),
                    )
                    .await?;
                    self.outcome.errors.push(message);
                }
            }
        }

        self.checkpoint(current_token).await
    }

    async fn process_change(&mut self, change: &ChangeRecord) -> Result<(), SyncError> {
        if change.is_deletion() {
            return self.process_deleted(change).await;
        }

        let Some(file) = &change.file else {
            return Ok(());
        };

        if self.engine.provider.is_folder(&file.mime_type) {
            self.process_folder(file).await
        } else {
            self.process_file(file).await
        }
    }

    /// Folders get a catalog entry and a directory in `current/`, never a
    /// download.
    async fn process_folder(&mut self, file: &RemoteFile) -> Result<(), SyncError> {
        let path = self.paths.build_path(file, None).await?;
        let parent_id = self.lookup_parent(file).await?;
        let existing = self
            .engine
            .catalog
            .find_item(self.root.id, &file.id)
            .await
            .map_err(SyncError::Other)?;

        let created = existing.is_none();
        let item = match existing {
            None => {
                self.engine
                    .catalog
                    .insert_item(&NewBackupItem {
                        sync_root_id: self.root.id,
                        provider_item_id: file.id.clone(),
                        name: file.name.clone(),
                        path: path.clone(),
                        item_type: ItemType::Folder,
                        mime_type: file.mime_type.clone(),
                        size_bytes: None,
                        provider_modified_at: file.modified_time,
                        etag: file.etag.clone().unwrap_or_default(),
                        last_seen_at: Some(self.sync_start),
                        parent_id,
                    })
                    .await
                    .map_err(SyncError::Other)?
            }
            Some(mut item) => {
                item.name = file.name.clone();
                item.path = path.clone();
                item.mime_type = file.mime_type.clone();
                item.provider_modified_at = file.modified_time;
                item.last_seen_at = Some(self.sync_start);
                item.parent_id = parent_id;
                item.mark_reappeared(Utc::now());
                self.engine
                    .catalog
                    .update_item(&item)
                    .await
                    .map_err(SyncError::Other)?;
                item
            }
        };

        self.engine
            .store
            .create_current_dir(&path)
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        if created {
            debug!(path, "Folder created");
            self.emit_event(
                NewSyncEvent::new(self.session.id, EventKind::FileAdded)
                    .with_item(item.id)
                    .with_provider_file_id(&file.id)
                    .with_path(&path)
                    .with_message(format!("Folder created: {}", file.name)),
            )
            .await?;
            self.outcome.files_added += 1;
        } else {
            debug!(path, "Folder updated");
            self.outcome.files_updated += 1;
        }

        Ok(())
    }

    async fn process_file(&mut self, file: &RemoteFile) -> Result<(), SyncError> {
        let provider = &self.engine.provider;
        let export_ext = provider.export_extension(&file.mime_type);
        let path = self.paths.build_path(file, export_ext).await?;
        let parent_id = self.lookup_parent(file).await?;

        let existing = self
            .engine
            .catalog
            .find_item(self.root.id, &file.id)
            .await
            .map_err(SyncError::Other)?;

        let is_new = existing.is_none();
        let content_changed = existing
            .as_ref()
            .map_or(true, |item| {
                item.content_changed(file.etag.as_deref(), file.modified_time)
            });

        let mut digest: Option<Digest> = None;
        if content_changed && provider.is_downloadable(&file.mime_type) {
            match self.download_and_store(file).await {
                Ok(d) => {
                    digest = Some(d);
                    self.outcome.bytes_downloaded += file.size.unwrap_or(0);
                }
                Err(err) => {
                    warn!(file = file.name, error = %err, "Failed to fetch content");
                    if is_new {
                        // A new file without content is not worth recording.
                        return Err(err);
                    }
                    // For updates, keep the catalog current and retain the
                    // previous version's bytes.
                }
            }
        }

        let item = match existing {
            None => {
                let item = self
                    .engine
                    .catalog
                    .insert_item(&NewBackupItem {
                        sync_root_id: self.root.id,
                        provider_item_id: file.id.clone(),
                        name: file.name.clone(),
                        path: path.clone(),
                        item_type: ItemType::File,
                        mime_type: file.mime_type.clone(),
                        size_bytes: file.size.map(|s| s as i64),
                        provider_modified_at: file.modified_time,
                        etag: file.etag.clone().unwrap_or_default(),
                        last_seen_at: Some(self.sync_start),
                        parent_id,
                    })
                    .await
                    .map_err(SyncError::Other)?;

                info!(path, "File added");
                self.emit_event(
                    NewSyncEvent::new(self.session.id, EventKind::FileAdded)
                        .with_item(item.id)
                        .with_provider_file_id(&file.id)
                        .with_path(&path)
                        .with_message(format!("File added: {}", file.name)),
                )
                .await?;
                self.outcome.files_added += 1;
                item
            }
            Some(mut item) => {
                item.name = file.name.clone();
                item.path = path.clone();
                item.mime_type = file.mime_type.clone();
                item.size_bytes = file.size.map(|s| s as i64);
                item.provider_modified_at = file.modified_time;
                item.etag = file.etag.clone().unwrap_or_default();
                item.last_seen_at = Some(self.sync_start);
                item.parent_id = parent_id;

                if item.state != ItemState::Active {
                    info!(path, state = item.state.as_str(), "File reappeared");
                }
                item.mark_reappeared(Utc::now());

                self.engine
                    .catalog
                    .update_item(&item)
                    .await
                    .map_err(SyncError::Other)?;

                if content_changed {
                    info!(path, "File updated");
                    self.emit_event(
                        NewSyncEvent::new(self.session.id, EventKind::FileUpdated)
                            .with_item(item.id)
                            .with_provider_file_id(&file.id)
                            .with_path(&path)
                            .with_message(format!("File updated: {}", file.name)),
                    )
                    .await?;
                    self.outcome.files_updated += 1;
                }
                item
            }
        };

        if let Some(digest) = digest {
            self.record_version(&item, file, &digest, &path).await?;
        }

        Ok(())
    }

    /// Create an UPDATE version and materialize, unless the item's latest
    /// version already holds this digest (idempotent replay).
    async fn record_version(
        &mut self,
        item: &BackupItem,
        file: &RemoteFile,
        digest: &Digest,
        path: &str,
    ) -> Result<(), SyncError> {
        let latest = self
            .engine
            .catalog
            .latest_version(item.id)
            .await
            .map_err(SyncError::Other)?;

        if latest.as_ref().map(|v| &v.digest) != Some(digest) {
            self.engine
                .catalog
                .insert_version(&NewFileVersion {
                    account_id: self.account.id,
                    backup_item_id: item.id,
                    digest: digest.clone(),
                    observed_path: path.to_string(),
                    etag_or_revision: file.etag.clone().unwrap_or_default(),
                    content_modified_at: file.modified_time,
                    reason: VersionReason::Update,
                })
                .await
                .map_err(SyncError::Other)?;
        } else {
            debug!(path, digest = digest.short(), "Version already captured");
        }

        self.engine
            .store
            .materialize_to_current(digest, path, self.engine.use_hardlinks)
            .map_err(|e| SyncError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Explicit deletion: tombstone version, archive the file, flip state.
    async fn process_deleted(&mut self, change: &ChangeRecord) -> Result<(), SyncError> {
        let Some(mut item) = self
            .engine
            .catalog
            .find_item(self.root.id, &change.file_id)
            .await
            .map_err(SyncError::Other)?
        else {
            // Never tracked; nothing to delete.
            return Ok(());
        };

        if item.is_file() {
            self.write_pre_delete_version(&item).await?;
            if let Err(err) = self.engine.store.move_to_archive(&item.path) {
                warn!(path = item.path, error = %err, "Failed to archive deleted file");
            }
        }

        item.mark_deleted_upstream(Utc::now());
        self.engine
            .catalog
            .update_item(&item)
            .await
            .map_err(SyncError::Other)?;

        info!(path = item.path, "File deleted upstream");
        self.emit_event(
            NewSyncEvent::new(self.session.id, EventKind::FileDeleted)
                .with_item(item.id)
                .with_provider_file_id(&change.file_id)
                .with_path(&item.path)
                .with_message("File deleted upstream"),
        )
        .await?;
        self.outcome.files_deleted += 1;

        Ok(())
    }

    /// Two-strike deletion sweep over items absent from this sync's change
    /// stream. First strike flags the item; the second archives it and
    /// quarantines. Runs only on incremental syncs.
    async fn sweep_deletions(&mut self) -> Result<u32, SyncError> {
        let missing = self
            .engine
            .catalog
            .items_unseen_since(self.root.id, self.sync_start)
            .await
            .map_err(SyncError::Other)?;

        let mut quarantined = 0;
        for mut item in missing {
            let next_state = item.record_missing(Utc::now());

            if next_state == ItemState::Quarantined {
                if item.is_file() {
                    self.write_pre_delete_version(&item).await?;
                    if let Err(err) = self.engine.store.move_to_archive(&item.path) {
                        warn!(path = item.path, error = %err, "Failed to archive quarantined file");
                    }
                }

                info!(
                    path = item.path,
                    missed = item.missing_since_sync_count,
                    "File quarantined"
                );
                self.emit_event(
                    NewSyncEvent::new(self.session.id, EventKind::FileQuarantined)
                        .with_item(item.id)
                        .with_path(&item.path)
                        .with_message(format!(
                            "Missing for {} consecutive syncs",
                            item.missing_since_sync_count
                        )),
                )
                .await?;
                quarantined += 1;
            } else {
                debug!(
                    path = item.path,
                    count = item.missing_since_sync_count,
                    "File missing upstream"
                );
            }

            self.engine
                .catalog
                .update_item(&item)
                .await
                .map_err(SyncError::Other)?;
        }

        if quarantined > 0 {
            info!(quarantined, "Quarantine sweep complete");
        }
        Ok(quarantined)
    }

    /// Tombstone referencing the latest captured blob, if any exists.
    async fn write_pre_delete_version(&self, item: &BackupItem) -> Result<(), SyncError> {
        let Some(latest) = self
            .engine
            .catalog
            .latest_version(item.id)
            .await
            .map_err(SyncError::Other)?
        else {
            return Ok(());
        };

        self.engine
            .catalog
            .insert_version(&NewFileVersion {
                account_id: self.account.id,
                backup_item_id: item.id,
                digest: latest.digest,
                observed_path: item.path.clone(),
                etag_or_revision: item.etag.clone(),
                content_modified_at: item.provider_modified_at,
                reason: VersionReason::PreDelete,
            })
            .await
            .map_err(SyncError::Other)?;
        Ok(())
    }

    /// Download a file's bytes, write them to the blob store, and upsert
    /// the blob row.
    async fn download_and_store(&self, file: &RemoteFile) -> Result<Digest, SyncError> {
        let data = with_retry("download", || {
            let provider = Arc::clone(&self.engine.provider);
            let file_id = file.id.clone();
            async move { provider.download(&file_id).await }
        })
        .await
        .map_err(|err| SyncError::Download {
            file_id: file.id.clone(),
            message: err.to_string(),
        })?;

        let digest = self
            .engine
            .store
            .write_blob(&data, None)
            .map_err(|err| match err {
                StoreError::DigestMismatch { .. } => SyncError::DigestMismatch(err.to_string()),
                other => SyncError::Storage(other.to_string()),
            })?;

        self.engine
            .catalog
            .upsert_blob(&digest, self.account.id, data.len() as i64)
            .await
            .map_err(SyncError::Other)?;

        debug!(
            file = file.name,
            digest = digest.short(),
            size = data.len(),
            "Content stored"
        );
        Ok(digest)
    }

    /// First parent's catalog item id, when the parent is already known.
    async fn lookup_parent(
        &self,
        file: &RemoteFile,
    ) -> Result<Option<BackupItemId>, SyncError> {
        let Some(parent) = file.parents.first() else {
            return Ok(None);
        };
        if *parent == self.root.provider_root_id {
            return Ok(None);
        }
        Ok(self
            .engine
            .catalog
            .find_item(self.root.id, parent)
            .await
            .map_err(SyncError::Other)?
            .map(|item| item.id))
    }

    /// Write the latest known cursor to the session (not the root) and log
    /// a checkpoint event.
    async fn checkpoint(&mut self, cursor: &str) -> Result<(), SyncError> {
        self.session.end_cursor = cursor.to_string();
        self.engine
            .catalog
            .update_session(&self.session)
            .await
            .map_err(SyncError::Other)?;

        self.emit_event(
            NewSyncEvent::new(self.session.id, EventKind::Checkpoint)
                .with_message(format!("Checkpoint: cursor={cursor}")),
        )
        .await?;

        debug!(cursor, "Checkpoint saved");
        Ok(())
    }

    async fn emit_event(&self, event: NewSyncEvent) -> Result<(), SyncError> {
        self.engine
            .catalog
            .insert_event(&event)
            .await
            .map(|_| ())
            .map_err(SyncError::Other)
    }
}

/// Latest known cursor represented by a page: the terminal token when the
/// stream is drained, otherwise the next page token.
fn current_token_of(page: &ChangesPage, fallback: &str) -> String {
    page.new_start_page_token
        .clone()
        .or_else(|| page.next_page_token.clone())
        .unwrap_or_else(|| fallback.to_string())
}
