//! Per-pass summary returned by `run_sync`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::{PartitionId, RemoteId};

/// A record that failed during a pass. The pass continued without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    /// `push`, `delete` or `erasure_conflict_delete`.
    pub operation: String,
    pub message: String,
}

/// Summary of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub partition: PartitionId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checkpoint_before: Option<DateTime<Utc>>,
    pub checkpoint_after: Option<DateTime<Utc>>,
    pub checkpoint_advanced: bool,
    /// Local records created from pulled data.
    pub created: usize,
    /// Local records updated from pulled data.
    pub updated: usize,
    /// Records erased, from either side.
    pub deleted: usize,
    /// Local changes pushed to the remote.
    pub pushed: usize,
    pub errored: usize,
    /// Fields dropped because their masking rule failed.
    pub masked_fields_dropped: usize,
    pub erasure_conflicts: usize,
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

impl SyncReport {
    pub(crate) fn begin(
        partition: PartitionId,
        started_at: DateTime<Utc>,
        checkpoint_before: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            partition,
            started_at,
            finished_at: started_at,
            checkpoint_before,
            checkpoint_after: checkpoint_before,
            checkpoint_advanced: false,
            created: 0,
            updated: 0,
            deleted: 0,
            pushed: 0,
            errored: 0,
            masked_fields_dropped: 0,
            erasure_conflicts: 0,
            errors: Vec::new(),
        }
    }

    pub(crate) fn record_error(
        &mut self,
        remote_id: Option<RemoteId>,
        operation: &str,
        message: impl Into<String>,
    ) {
        self.errored += 1;
        self.errors.push(RecordError {
            remote_id,
            operation: operation.to_string(),
            message: message.into(),
        });
    }

    /// No record failed.
    pub fn is_clean(&self) -> bool {
        self.errored == 0
    }

    /// Whether the pass changed anything on either side.
    pub fn has_changes(&self) -> bool {
        self.created + self.updated + self.deleted + self.pushed > 0
    }
}
