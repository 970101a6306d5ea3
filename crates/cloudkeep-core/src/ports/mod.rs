//! Port traits (driven/secondary ports).
//!
//! The sync engine and garbage collector depend only on these interfaces;
//! `cloudkeep-catalog` and `cloudkeep-drive` provide the concrete adapters.

pub mod catalog;
pub mod provider;

pub use catalog::Catalog;
pub use provider::{ChangeRecord, ChangesPage, ProviderClient, ProviderError, RemoteFile};
