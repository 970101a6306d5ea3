//! Retention policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{AccountId, SyncRootId};

/// Global fallback when no policy row applies.
pub const DEFAULT_KEEP_LAST_N: u32 = 10;
/// Global fallback when no policy row applies.
pub const DEFAULT_KEEP_DAYS: u32 = 30;

/// A stored retention policy, scoped to an account or a sync root
/// (at most one of the two scope fields is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub id: i64,
    pub account_id: Option<AccountId>,
    pub sync_root_id: Option<SyncRootId>,
    pub keep_last_n: u32,
    pub keep_days: u32,
    pub max_storage_bytes: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insertion form of [`RetentionPolicy`].
#[derive(Debug, Clone)]
pub struct NewRetentionPolicy {
    pub account_id: Option<AccountId>,
    pub sync_root_id: Option<SyncRootId>,
    pub keep_last_n: u32,
    pub keep_days: u32,
    pub max_storage_bytes: Option<i64>,
}

/// The resolved limits GC actually applies.
///
/// A version survives if it is among the newest `keep_last_n` OR was
/// captured within `keep_days` — the max of the two policies, so recent
/// history survives even for files that rarely change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionLimits {
    pub keep_last_n: u32,
    pub keep_days: u32,
}

impl RetentionLimits {
    /// Resolve limits from an optional account-scoped policy row, falling
    /// back to configured defaults.
    pub fn resolve(policy: Option<&RetentionPolicy>, defaults: RetentionLimits) -> Self {
        match policy {
            Some(p) => Self {
                keep_last_n: p.keep_last_n,
                keep_days: p.keep_days,
            },
            None => defaults,
        }
    }
}

impl Default for RetentionLimits {
    fn default() -> Self {
        Self {
            keep_last_n: DEFAULT_KEEP_LAST_N,
            keep_days: DEFAULT_KEEP_DAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_policy_row() {
        let policy = RetentionPolicy {
            id: 1,
            account_id: Some(AccountId(1)),
            sync_root_id: None,
            keep_last_n: 3,
            keep_days: 7,
            max_storage_bytes: None,
            created_at: Utc::now(),
        };
        let limits = RetentionLimits::resolve(Some(&policy), RetentionLimits::default());
        assert_eq!(limits.keep_last_n, 3);
        assert_eq!(limits.keep_days, 7);
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let limits = RetentionLimits::resolve(None, RetentionLimits::default());
        assert_eq!(limits.keep_last_n, DEFAULT_KEEP_LAST_N);
        assert_eq!(limits.keep_days, DEFAULT_KEEP_DAYS);
    }
}
