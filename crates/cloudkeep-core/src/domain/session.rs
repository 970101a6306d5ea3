//! Sync sessions and their event log.
//!
//! A [`SyncSession`] records one sync run of one sync root, with counters
//! and the cursor window it covered. [`SyncEvent`]s are an append-only audit
//! trail within the session, monotonically timestamped by insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{BackupItemId, SessionId, SyncRootId};

/// Outcome of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    /// Finished, but some changes failed and were skipped.
    Partial,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "partial" => Ok(SessionStatus::Partial),
            other => Err(DomainError::InvalidEnumValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_finished(self) -> bool {
        self != SessionStatus::Running
    }
}

/// One sync run of one sync root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: SessionId,
    pub sync_root_id: SyncRootId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_initial: bool,
    /// Cursor the run started from (empty on initial sync).
    pub start_cursor: String,
    /// Latest checkpointed cursor. Advances per batch and may lead the
    /// sync root's persisted cursor until the run completes.
    pub end_cursor: String,
    pub status: SessionStatus,
    pub files_added: u32,
    pub files_updated: u32,
    pub files_deleted: u32,
    pub files_quarantined: u32,
    pub bytes_downloaded: u64,
    pub error_message: String,
}

impl SyncSession {
    /// Close the session, deriving the final status from whether any
    /// per-change errors were accumulated.
    pub fn finish(&mut self, had_errors: bool, now: DateTime<Utc>) {
        self.status = if had_errors {
            SessionStatus::Partial
        } else {
            SessionStatus::Completed
        };
        self.completed_at = Some(now);
    }

    /// Close the session as failed with the given message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = SessionStatus::Failed;
        self.error_message = message.into();
        self.completed_at = Some(now);
    }
}

/// Insertion form of [`SyncSession`].
#[derive(Debug, Clone)]
pub struct NewSyncSession {
    pub sync_root_id: SyncRootId,
    pub is_initial: bool,
    pub start_cursor: String,
}

/// Kind of audit event within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileAdded,
    FileUpdated,
    FileDeleted,
    FileQuarantined,
    Error,
    Checkpoint,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FileAdded => "file_added",
            EventKind::FileUpdated => "file_updated",
            EventKind::FileDeleted => "file_deleted",
            EventKind::FileQuarantined => "file_quarantined",
            EventKind::Error => "error",
            EventKind::Checkpoint => "checkpoint",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "file_added" => Ok(EventKind::FileAdded),
            "file_updated" => Ok(EventKind::FileUpdated),
            "file_deleted" => Ok(EventKind::FileDeleted),
            "file_quarantined" => Ok(EventKind::FileQuarantined),
            "error" => Ok(EventKind::Error),
            "checkpoint" => Ok(EventKind::Checkpoint),
            other => Err(DomainError::InvalidEnumValue {
                field: "event_type",
                value: other.to_string(),
            }),
        }
    }
}

/// An append-only audit record within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: i64,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub backup_item_id: Option<BackupItemId>,
    pub provider_file_id: String,
    pub file_path: String,
    pub message: String,
}

/// Insertion form of [`SyncEvent`].
#[derive(Debug, Clone)]
pub struct NewSyncEvent {
    pub session_id: SessionId,
    pub event_type: EventKind,
    pub backup_item_id: Option<BackupItemId>,
    pub provider_file_id: String,
    pub file_path: String,
    pub message: String,
}

impl NewSyncEvent {
    pub fn new(session_id: SessionId, event_type: EventKind) -> Self {
        Self {
            session_id,
            event_type,
            backup_item_id: None,
            provider_file_id: String::new(),
            file_path: String::new(),
            message: String::new(),
        }
    }

    pub fn with_item(mut self, item_id: BackupItemId) -> Self {
        self.backup_item_id = Some(item_id);
        self
    }

    pub fn with_provider_file_id(mut self, id: impl Into<String>) -> Self {
        self.provider_file_id = id.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = path.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SyncSession {
        SyncSession {
            id: SessionId(1),
            sync_root_id: SyncRootId(1),
            started_at: Utc::now(),
            completed_at: None,
            is_initial: false,
            start_cursor: "100".into(),
            end_cursor: String::new(),
            status: SessionStatus::Running,
            files_added: 0,
            files_updated: 0,
            files_deleted: 0,
            files_quarantined: 0,
            bytes_downloaded: 0,
            error_message: String::new(),
        }
    }

    #[test]
    fn finish_without_errors_is_completed() {
        let mut s = session();
        s.finish(false, Utc::now());
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn finish_with_errors_is_partial() {
        let mut s = session();
        s.finish(true, Utc::now());
        assert_eq!(s.status, SessionStatus::Partial);
    }

    #[test]
    fn fail_records_message() {
        let mut s = session();
        s.fail("token refresh failed", Utc::now());
        assert_eq!(s.status, SessionStatus::Failed);
        assert_eq!(s.error_message, "token refresh failed");
        assert!(s.status.is_finished());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Partial,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn event_builder_sets_fields() {
        let event = NewSyncEvent::new(SessionId(4), EventKind::FileAdded)
            .with_provider_file_id("file-1")
            .with_path("Docs/report.pdf")
            .with_message("File added: report.pdf");
        assert_eq!(event.event_type, EventKind::FileAdded);
        assert_eq!(event.session_id, SessionId(4));
        assert_eq!(event.file_path, "Docs/report.pdf");
    }
}
