//! SQLite-backed metadata catalog.
//!
//! Implements the [`cloudkeep_core::ports::Catalog`] port on a sqlx
//! connection pool. All timestamps are stored as fixed-width RFC 3339 TEXT
//! so that SQL comparisons order chronologically.

mod pool;
mod repository;

pub use pool::CatalogPool;
pub use repository::SqliteCatalog;

use thiserror::Error;

/// Errors from catalog infrastructure (connection, migration, row decoding).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to connect to catalog database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to run catalog migrations: {0}")]
    MigrationFailed(String),

    #[error("Failed to decode catalog row: {0}")]
    Decode(String),
}
