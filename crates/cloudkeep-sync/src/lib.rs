//! Sync engine for cloudkeep.
//!
//! Drives one sync of one sync root: asks the provider for changes since the
//! persisted cursor, walks each change through the catalog and blob store,
//! and runs the deletion-state sweep. See [`engine::SyncEngine`].

pub mod engine;
pub mod error;
pub mod path_builder;
pub mod root_lock;

pub use engine::{SyncEngine, SyncOutcome};
pub use error::SyncError;
pub use path_builder::PathBuilder;
pub use root_lock::{RootLockGuard, RootLockRegistry};
