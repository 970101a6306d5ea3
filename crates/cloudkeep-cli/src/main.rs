//! cloudkeep command-line interface.
//!
//! The operational surface the scheduler and operator use: run a sync for
//! an account or a single root, run garbage collection, and inspect
//! accounts and storage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cloudkeep_catalog::{CatalogPool, SqliteCatalog};
use cloudkeep_core::config::Config;
use cloudkeep_core::domain::{Account, AccountId, ProviderKind, RetentionLimits, SyncRootId};
use cloudkeep_core::ports::{Catalog, ProviderClient};
use cloudkeep_core::secrets::SecretsStore;
use cloudkeep_drive::DriveClient;
use cloudkeep_gc::GarbageCollector;
use cloudkeep_store::AccountStore;
use cloudkeep_sync::{RootLockRegistry, SyncEngine};

#[derive(Parser)]
#[command(name = "cloudkeep", version, about = "Multi-account cloud storage backup")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured accounts and their sync roots.
    Accounts,
    /// Run a sync for an account (all enabled roots) or one root.
    Sync {
        /// Account to sync.
        #[arg(long, conflicts_with = "root")]
        account: Option<i64>,
        /// Single sync root to sync.
        #[arg(long)]
        root: Option<i64>,
    },
    /// Run garbage collection.
    Gc {
        /// Limit collection to one account.
        #[arg(long)]
        account: Option<i64>,
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show storage statistics for an account.
    Stats {
        #[arg(long)]
        account: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for err in &validation_errors {
            eprintln!("config error: {err}");
        }
        bail!("invalid configuration in {}", config_path.display());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    let pool = CatalogPool::open(&config.database.path)
        .await
        .context("Failed to open catalog database")?;
    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(&pool));
    let secrets = SecretsStore::new(config.secrets.path.clone());

    match cli.command {
        Command::Accounts => list_accounts(&*catalog).await,
        Command::Sync { account, root } => {
            run_sync(&config, catalog, secrets, account, root).await
        }
        Command::Gc { account, dry_run } => run_gc(&config, catalog, account, dry_run).await,
        Command::Stats { account } => show_stats(&config, &*catalog, account).await,
    }
}

async fn list_accounts(catalog: &dyn Catalog) -> Result<()> {
    let accounts = catalog.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts configured.");
        return Ok(());
    }

    for account in accounts {
        let status = if account.is_active { "active" } else { "disabled" };
        println!(
            "[{}] {} <{}> ({}, {})",
            account.id, account.name, account.email, account.provider, status
        );
        for root in catalog.sync_roots_for_account(account.id).await? {
            let last_sync = root
                .last_sync_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "    root [{}] {} (enabled: {}, last sync: {})",
                root.id, root.name, root.is_enabled, last_sync
            );
        }
    }
    Ok(())
}

/// Build the provider client for an account's provider tag.
fn provider_for(account: &Account, secrets: &SecretsStore) -> Result<Arc<dyn ProviderClient>> {
    match account.provider {
        ProviderKind::GoogleDrive => Ok(Arc::new(DriveClient::new(
            account.clone(),
            secrets.clone(),
        ))),
        ProviderKind::OneDrive => bail!("provider {} is not supported yet", account.provider),
    }
}

async fn run_sync(
    config: &Config,
    catalog: Arc<dyn Catalog>,
    secrets: SecretsStore,
    account: Option<i64>,
    root: Option<i64>,
) -> Result<()> {
    let locks = RootLockRegistry::new();

    let roots = match (account, root) {
        (_, Some(root_id)) => {
            let root = catalog
                .get_sync_root(SyncRootId(root_id))
                .await?
                .with_context(|| format!("unknown sync root {root_id}"))?;
            vec![root]
        }
        (Some(account_id), None) => catalog
            .sync_roots_for_account(AccountId(account_id))
            .await?
            .into_iter()
            .filter(|r| r.is_enabled)
            .collect(),
        (None, None) => bail!("pass --account or --root"),
    };

    if roots.is_empty() {
        println!("Nothing to sync.");
        return Ok(());
    }

    for root in roots {
        let account = catalog
            .get_account(root.account_id)
            .await?
            .with_context(|| format!("unknown account {}", root.account_id))?;
        let provider = provider_for(&account, &secrets)?;
        let store = AccountStore::new(&config.storage.backup_root, account.provider, account.id);

        let engine = SyncEngine::new(
            Arc::clone(&catalog),
            provider,
            store,
            Arc::clone(&locks),
            config.sync.page_size,
            config.storage.use_hardlinks,
        );

        match engine.run(root.id).await {
            Ok(outcome) => {
                println!(
                    "root [{}] {}: {} added, {} updated, {} deleted, {} quarantined, \
                     {} bytes in {} ms",
                    root.id,
                    root.name,
                    outcome.files_added,
                    outcome.files_updated,
                    outcome.files_deleted,
                    outcome.files_quarantined,
                    outcome.bytes_downloaded,
                    outcome.duration_ms,
                );
                for error in &outcome.errors {
                    warn!(root = %root.id, error, "Per-change error");
                }
            }
            Err(err) => {
                eprintln!("root [{}] {}: sync failed: {err}", root.id, root.name);
            }
        }
    }
    Ok(())
}

async fn run_gc(
    config: &Config,
    catalog: Arc<dyn Catalog>,
    account: Option<i64>,
    dry_run: bool,
) -> Result<()> {
    let defaults = RetentionLimits {
        keep_last_n: config.retention.keep_last_n,
        keep_days: config.retention.keep_days,
    };
    let collector = GarbageCollector::new(catalog, &config.storage.backup_root, defaults)
        .dry_run(dry_run);

    let report = collector.run(account.map(AccountId)).await?;
    println!(
        "{}{} versions purged, {} blobs deleted ({} bytes freed), {} quarantined items purged",
        if dry_run { "[dry run] " } else { "" },
        report.versions_purged,
        report.blobs_deleted,
        report.bytes_freed,
        report.quarantine_purged,
    );
    for error in &report.errors {
        eprintln!("gc error: {error}");
    }
    Ok(())
}

async fn show_stats(config: &Config, catalog: &dyn Catalog, account: i64) -> Result<()> {
    let account = catalog
        .get_account(AccountId(account))
        .await?
        .with_context(|| format!("unknown account {account}"))?;
    let store = AccountStore::new(&config.storage.backup_root, account.provider, account.id);
    let stats = store.storage_stats()?;

    println!("{} <{}>", account.name, account.email);
    println!("  blobs:         {}", stats.blob_count);
    println!("  blob bytes:    {}", stats.total_size_bytes);
    println!("  current files: {}", stats.current_file_count);
    Ok(())
}
