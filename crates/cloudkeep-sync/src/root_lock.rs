//! Per-root advisory locks.
//!
//! At most one sync may be active per sync root at any time; violating this
//! risks duplicate file versions and competing cursor updates. The registry
//! is the in-process half of that guarantee (the external dispatcher's
//! claim-with-skip-locked is the other half).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cloudkeep_core::domain::SyncRootId;

/// Registry of sync roots with an active sync.
#[derive(Debug, Default)]
pub struct RootLockRegistry {
    active: Mutex<HashSet<SyncRootId>>,
}

impl RootLockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Try to claim a root. Returns `None` if a sync already holds it.
    pub fn try_acquire(self: &Arc<Self>, id: SyncRootId) -> Option<RootLockGuard> {
        let mut active = self.active.lock().expect("root lock registry poisoned");
        if !active.insert(id) {
            return None;
        }
        Some(RootLockGuard {
            registry: Arc::clone(self),
            id,
        })
    }

    fn release(&self, id: SyncRootId) {
        self.active
            .lock()
            .expect("root lock registry poisoned")
            .remove(&id);
    }
}

/// RAII claim on a sync root; dropping releases it.
#[derive(Debug)]
pub struct RootLockGuard {
    registry: Arc<RootLockRegistry>,
    id: SyncRootId,
}

impl Drop for RootLockGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}
