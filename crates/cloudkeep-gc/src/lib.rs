//! Garbage collection for backup storage.
//!
//! Three phases, strictly in order:
//!
//! 1. **Version purge** — for each item, retain the newest `keep_last_n`
//!    versions plus anything captured within `keep_days`; delete the rest.
//! 2. **Orphan blob reclamation** — blobs no version references any more
//!    are deleted from disk, then from the catalog.
//! 3. **Quarantine expiry** — quarantined items past retention lose their
//!    archived file and become `PURGED`.
//!
//! Phase 1 must complete before phase 2: reversing them could reclaim a
//! blob that phase 1 would have kept a version for. The phases are never
//! parallelized.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use cloudkeep_core::domain::{Account, AccountId, RetentionLimits};
use cloudkeep_core::ports::Catalog;
use cloudkeep_store::AccountStore;

/// Counters from one garbage collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub versions_purged: u64,
    pub blobs_deleted: u64,
    pub quarantine_purged: u64,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Retention-driven garbage collector.
pub struct GarbageCollector {
    catalog: Arc<dyn Catalog>,
    backup_root: PathBuf,
    defaults: RetentionLimits,
    dry_run: bool,
}

impl GarbageCollector {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        backup_root: impl Into<PathBuf>,
        defaults: RetentionLimits,
    ) -> Self {
        Self {
            catalog,
            backup_root: backup_root.into(),
            defaults,
            dry_run: false,
        }
    }

    /// In dry-run mode every candidate is counted and logged, nothing is
    /// deleted.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Run all three phases for one account, or for every account when
    /// `account_id` is `None`.
    pub async fn run(&self, account_id: Option<AccountId>) -> anyhow::Result<GcReport> {
        let mut report = GcReport::default();

        let accounts = match account_id {
            Some(id) => match self.catalog.get_account(id).await? {
                Some(account) => vec![account],
                None => anyhow::bail!("unknown account {id}"),
            },
            None => self.catalog.list_accounts().await?,
        };

        info!(
            dry_run = self.dry_run,
            accounts = accounts.len(),
            "Starting garbage collection"
        );

        self.purge_old_versions(&accounts, &mut report).await?;
        self.reclaim_orphan_blobs(account_id, &accounts, &mut report)
            .await?;
        self.purge_quarantined_items(&accounts, &mut report).await?;

        info!(
            versions_purged = report.versions_purged,
            blobs_deleted = report.blobs_deleted,
            bytes_freed = report.bytes_freed,
            quarantine_purged = report.quarantine_purged,
            errors = report.errors.len(),
            "Garbage collection complete"
        );

        Ok(report)
    }

    async fn limits_for(&self, account: &Account) -> anyhow::Result<RetentionLimits> {
        let policy = self
            .catalog
            .retention_policy_for_account(account.id)
            .await?;
        Ok(RetentionLimits::resolve(policy.as_ref(), self.defaults))
    }

    fn store_for(&self, account: &Account) -> AccountStore {
        AccountStore::new(&self.backup_root, account.provider, account.id)
    }

    /// Phase 1. A version is retained iff it is among the newest
    /// `keep_last_n` OR was captured after the `keep_days` cutoff.
    async fn purge_old_versions(
        &self,
        accounts: &[Account],
        report: &mut GcReport,
    ) -> anyhow::Result<()> {
        for account in accounts {
            let limits = self.limits_for(account).await?;
            let cutoff = Utc::now() - Duration::days(limits.keep_days as i64);
            debug!(
                account = %account.id,
                keep_last_n = limits.keep_last_n,
                keep_days = limits.keep_days,
                "Purging versions"
            );

            for item in self.catalog.items_for_account(account.id).await? {
                let versions = self.catalog.versions_for_item(item.id).await?;
                if versions.len() <= limits.keep_last_n as usize {
                    continue;
                }

                let doomed: Vec<_> = versions
                    .iter()
                    .enumerate()
                    .filter(|(index, version)| {
                        *index >= limits.keep_last_n as usize && version.captured_at < cutoff
                    })
                    .map(|(_, version)| version.id)
                    .collect();

                if doomed.is_empty() {
                    continue;
                }

                if self.dry_run {
                    info!(
                        item = %item.id,
                        path = item.path,
                        count = doomed.len(),
                        "[dry run] would delete versions"
                    );
                } else {
                    self.catalog.delete_versions(&doomed).await?;
                    debug!(item = %item.id, count = doomed.len(), "Versions deleted");
                }
                report.versions_purged += doomed.len() as u64;
            }
        }
        Ok(())
    }

    /// Phase 2. Delete the on-disk blob first, then the catalog row; a
    /// filesystem failure keeps the row so the pointer is not lost.
    async fn reclaim_orphan_blobs(
        &self,
        scope: Option<AccountId>,
        accounts: &[Account],
        report: &mut GcReport,
    ) -> anyhow::Result<()> {
        let orphans = self.catalog.orphan_blobs(scope).await?;
        if orphans.is_empty() {
            return Ok(());
        }

        let by_id: HashMap<AccountId, &Account> =
            accounts.iter().map(|a| (a.id, a)).collect();

        for blob in orphans {
            let Some(account) = by_id.get(&blob.account_id) else {
                // Orphan of an account outside this run's scope.
                continue;
            };

            if self.dry_run {
                info!(
                    digest = blob.digest.short(),
                    size = blob.size_bytes,
                    "[dry run] would delete orphan blob"
                );
                report.blobs_deleted += 1;
                report.bytes_freed += blob.size_bytes as u64;
                continue;
            }

            match self.store_for(account).delete_blob(&blob.digest) {
                Ok(existed) => {
                    if existed {
                        report.bytes_freed += blob.size_bytes as u64;
                    }
                    self.catalog.delete_blob_record(&blob.digest).await?;
                    report.blobs_deleted += 1;
                    debug!(digest = blob.digest.short(), "Orphan blob deleted");
                }
                Err(err) => {
                    let message =
                        format!("Failed to delete blob {}: {err}", blob.digest.short());
                    warn!(%message);
                    report.errors.push(message);
                }
            }
        }
        Ok(())
    }

    /// Phase 3. Quarantined items past retention lose their archived copy
    /// and transition to the terminal `PURGED` state.
    async fn purge_quarantined_items(
        &self,
        accounts: &[Account],
        report: &mut GcReport,
    ) -> anyhow::Result<()> {
        for account in accounts {
            let limits = self.limits_for(account).await?;
            let cutoff = Utc::now() - Duration::days(limits.keep_days as i64);

            let expired = self
                .catalog
                .quarantined_items_before(account.id, cutoff)
                .await?;
            if expired.is_empty() {
                continue;
            }

            if self.dry_run {
                for item in &expired {
                    info!(
                        item = %item.id,
                        path = item.path,
                        "[dry run] would purge quarantined item"
                    );
                }
                report.quarantine_purged += expired.len() as u64;
                continue;
            }

            let store = self.store_for(account);
            for mut item in expired {
                if let Err(err) = store.remove_from_archive(&item.path) {
                    warn!(path = item.path, error = %err, "Failed to delete archived file");
                }

                item.mark_purged(Utc::now())
                    .map_err(|e| anyhow::anyhow!("purging item {}: {e}", item.id))?;
                self.catalog.update_item(&item).await?;
                report.quarantine_purged += 1;
                debug!(path = item.path, "Quarantined item purged");
            }
            info!(
                account = %account.id,
                purged = report.quarantine_purged,
                "Quarantine expiry complete"
            );
        }
        Ok(())
    }
}
