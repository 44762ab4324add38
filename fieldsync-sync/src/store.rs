//! Store contracts the synchronizer runs against.
//!
//! Transports and storage engines live behind these traits; the synchronizer
//! only relies on the call contracts below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::{PartitionId, Record, RemoteId};

use crate::error::{RemoteError, SyncError};

/// Effect of a local upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Fields and erasure flag already matched; nothing was written.
    Unchanged,
}

/// The remote record store for one partition.
pub trait RemoteStore {
    /// The partition this endpoint serves.
    fn partition(&self) -> &PartitionId;

    /// Records modified strictly after `since`.
    fn list(&mut self, since: DateTime<Utc>) -> Result<Vec<Record>, RemoteError>;

    /// Create or replace a record, returning its remote id.
    fn upsert(&mut self, record: &Record) -> Result<RemoteId, RemoteError>;

    /// Delete a record. Deleting an unknown id succeeds.
    fn delete(&mut self, id: &RemoteId) -> Result<(), RemoteError>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for &mut R {
    fn partition(&self) -> &PartitionId {
        (**self).partition()
    }

    fn list(&mut self, since: DateTime<Utc>) -> Result<Vec<Record>, RemoteError> {
        (**self).list(since)
    }

    fn upsert(&mut self, record: &Record) -> Result<RemoteId, RemoteError> {
        (**self).upsert(record)
    }

    fn delete(&mut self, id: &RemoteId) -> Result<(), RemoteError> {
        (**self).delete(id)
    }
}

/// The local record store for one partition.
pub trait LocalStore {
    /// Records modified strictly after `since`, excluding erased ones.
    ///
    /// Records flagged for erasure but not yet erased are included.
    fn find_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<Record>, SyncError>;

    /// Insert or update by remote id. `record.remote_id` must be set.
    fn upsert_by_remote_id(&mut self, record: &Record) -> Result<UpsertOutcome, SyncError>;

    /// Anonymize the record and tombstone its id.
    ///
    /// Returns `true` if a live record was erased. The id is tombstoned even
    /// when no record exists, so it can never be re-created.
    fn erase_by_remote_id(&mut self, id: &RemoteId) -> Result<bool, SyncError>;

    /// Whether `id` has been erased.
    fn is_erased(&self, id: &RemoteId) -> Result<bool, SyncError>;

    /// Look up a record by remote id.
    fn get(&self, id: &RemoteId) -> Result<Option<Record>, SyncError>;
}

/// Per-partition sync checkpoints.
pub trait CheckpointStore {
    fn get(&self, partition: &PartitionId) -> Result<Option<DateTime<Utc>>, SyncError>;

    /// Store `at`. Implementations never move a checkpoint backwards.
    fn set(&mut self, partition: &PartitionId, at: DateTime<Utc>) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// Processing log
// ---------------------------------------------------------------------------

/// Which side a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Pull,
    Push,
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Pushed,
    Erased,
    ErasureConflict,
    Skipped,
    Failed,
}

/// One processing-log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub partition: PartitionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub direction: Direction,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only record of every record a pass touched.
pub trait ProcessingLog {
    fn append(&mut self, entry: LogEntry) -> Result<(), SyncError>;
}
