//! In-memory store implementations.
//!
//! [`MemoryLocal`] is also the state behind the file-backed local store.
//! [`MemoryRemote`] can be scripted to fail, which the synchronizer tests use
//! to exercise retry and error accounting.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::{PartitionId, Record, RemoteId};

use crate::error::{RemoteError, SyncError};
use crate::store::{
    CheckpointStore, LocalStore, LogEntry, ProcessingLog, RemoteStore, UpsertOutcome,
};

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FailurePlan {
    /// `None` fails forever.
    remaining: Option<usize>,
    error: RemoteError,
}

impl FailurePlan {
    fn take(&mut self) -> Option<RemoteError> {
        match &mut self.remaining {
            None => Some(self.error.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(self.error.clone())
            }
        }
    }
}

/// Number of calls a [`MemoryRemote`] has served, failed ones included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub upsert: usize,
    pub delete: usize,
}

/// An in-memory remote record store serving one partition.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    partition: PartitionId,
    records: BTreeMap<RemoteId, Record>,
    next_id: u64,
    list_failures: Option<FailurePlan>,
    upsert_failures: HashMap<RemoteId, FailurePlan>,
    delete_failures: HashMap<RemoteId, FailurePlan>,
    calls: CallCounts,
}

impl MemoryRemote {
    pub fn new(partition: impl Into<PartitionId>) -> Self {
        Self {
            partition: partition.into(),
            records: BTreeMap::new(),
            next_id: 1,
            list_failures: None,
            upsert_failures: HashMap::new(),
            delete_failures: HashMap::new(),
            calls: CallCounts::default(),
        }
    }

    /// Store `record` as-is, keeping its `modified_at`.
    pub fn put(&mut self, record: Record) {
        if let Some(id) = record.remote_id.clone() {
            self.records.insert(id, record);
        }
    }

    pub fn get(&self, id: &RemoteId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn calls(&self) -> CallCounts {
        self.calls
    }

    /// Fail the next `times` list calls (`None`: every call) with `error`.
    pub fn fail_lists(&mut self, times: Option<usize>, error: RemoteError) {
        self.list_failures = Some(FailurePlan {
            remaining: times,
            error,
        });
    }

    /// Fail upserts of `id` `times` times (`None`: every call) with `error`.
    pub fn fail_upserts_of(
        &mut self,
        id: impl Into<RemoteId>,
        times: Option<usize>,
        error: RemoteError,
    ) {
        self.upsert_failures.insert(
            id.into(),
            FailurePlan {
                remaining: times,
                error,
            },
        );
    }

    /// Fail deletes of `id` `times` times (`None`: every call) with `error`.
    pub fn fail_deletes_of(
        &mut self,
        id: impl Into<RemoteId>,
        times: Option<usize>,
        error: RemoteError,
    ) {
        self.delete_failures.insert(
            id.into(),
            FailurePlan {
                remaining: times,
                error,
            },
        );
    }

    pub fn clear_failures(&mut self) {
        self.list_failures = None;
        self.upsert_failures.clear();
        self.delete_failures.clear();
    }
}

impl RemoteStore for MemoryRemote {
    fn partition(&self) -> &PartitionId {
        &self.partition
    }

    fn list(&mut self, since: DateTime<Utc>) -> Result<Vec<Record>, RemoteError> {
        self.calls.list += 1;
        if let Some(err) = self.list_failures.as_mut().and_then(FailurePlan::take) {
            return Err(err);
        }
        let mut out: Vec<Record> = self
            .records
            .values()
            .filter(|r| r.modified_at > since)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.modified_at);
        Ok(out)
    }

    fn upsert(&mut self, record: &Record) -> Result<RemoteId, RemoteError> {
        self.calls.upsert += 1;
        let id = match record.remote_id.clone() {
            Some(id) => id,
            None => {
                let id = RemoteId(format!("r-{}", self.next_id));
                self.next_id += 1;
                id
            }
        };
        if let Some(err) = self.upsert_failures.get_mut(&id).and_then(FailurePlan::take) {
            return Err(err);
        }

        if let Some(existing) = self.records.get(&id) {
            if existing.same_content(record) {
                return Ok(id);
            }
        }
        let stored = Record {
            remote_id: Some(id.clone()),
            fields: record.fields.clone(),
            modified_at: Utc::now(),
            erased: record.erased,
        };
        self.records.insert(id.clone(), stored);
        Ok(id)
    }

    fn delete(&mut self, id: &RemoteId) -> Result<(), RemoteError> {
        self.calls.delete += 1;
        if let Some(err) = self.delete_failures.get_mut(id).and_then(FailurePlan::take) {
            return Err(err);
        }
        self.records.remove(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// An in-memory local record store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryLocal {
    #[serde(default)]
    records: BTreeMap<RemoteId, Record>,
    /// Records created locally that the remote has never seen.
    #[serde(default)]
    unsynced: Vec<Record>,
    #[serde(default)]
    tombstones: BTreeSet<RemoteId>,
}

impl MemoryLocal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `record` as a local edit would, bypassing change detection.
    pub fn insert(&mut self, record: Record) {
        match record.remote_id.clone() {
            Some(id) => {
                self.records.insert(id, record);
            }
            None => self.unsynced.push(record),
        }
    }

    /// Records that are neither erased nor pending erasure.
    pub fn live_count(&self) -> usize {
        self.records
            .iter()
            .filter(|(id, r)| !r.erased && !self.tombstones.contains(*id))
            .count()
            + self.unsynced.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().chain(self.unsynced.iter())
    }
}

impl LocalStore for MemoryLocal {
    fn find_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<Record>, SyncError> {
        let mut out: Vec<Record> = self
            .records
            .iter()
            .filter(|(id, r)| r.modified_at > since && !self.tombstones.contains(*id))
            .map(|(_, r)| r.clone())
            .chain(
                self.unsynced
                    .iter()
                    .filter(|r| r.modified_at > since)
                    .cloned(),
            )
            .collect();
        out.sort_by_key(|r| r.modified_at);
        Ok(out)
    }

    fn upsert_by_remote_id(&mut self, record: &Record) -> Result<UpsertOutcome, SyncError> {
        let Some(id) = record.remote_id.clone() else {
            return Err(SyncError::Store("upsert requires a remote id".to_string()));
        };
        if self.tombstones.contains(&id) {
            return Err(SyncError::Store(format!("record {id} has been erased")));
        }

        let outcome = match self.records.get(&id) {
            Some(existing) if existing.same_content(record) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };
        self.records.insert(id, record.clone());
        Ok(outcome)
    }

    fn erase_by_remote_id(&mut self, id: &RemoteId) -> Result<bool, SyncError> {
        let newly_tombstoned = self.tombstones.insert(id.clone());
        if !newly_tombstoned {
            return Ok(false);
        }
        match self.records.get(id) {
            Some(record) => {
                let anonymized = record.anonymized(Utc::now());
                self.records.insert(id.clone(), anonymized);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_erased(&self, id: &RemoteId) -> Result<bool, SyncError> {
        Ok(self.tombstones.contains(id))
    }

    fn get(&self, id: &RemoteId) -> Result<Option<Record>, SyncError> {
        Ok(self.records.get(id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Checkpoints and log
// ---------------------------------------------------------------------------

/// In-memory checkpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoints {
    checkpoints: BTreeMap<PartitionId, DateTime<Utc>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn get(&self, partition: &PartitionId) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.checkpoints.get(partition).copied())
    }

    fn set(&mut self, partition: &PartitionId, at: DateTime<Utc>) -> Result<(), SyncError> {
        let entry = self.checkpoints.entry(partition.clone()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
        Ok(())
    }
}

/// In-memory processing log.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Vec<LogEntry>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

impl ProcessingLog for MemoryLog {
    fn append(&mut self, entry: LogEntry) -> Result<(), SyncError> {
        self.entries.push(entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fieldsync_core::FieldMap;
    use serde_json::json;

    fn record(id: &str, name: &str, at: DateTime<Utc>) -> Record {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), json!(name));
        Record::new(id, fields, at)
    }

    #[test]
    fn remote_list_is_strictly_after_since() {
        let t0 = Utc::now();
        let mut remote = MemoryRemote::new("lt");
        remote.put(record("r1", "a", t0));
        remote.put(record("r2", "b", t0 + Duration::seconds(1)));

        let listed = remote.list(t0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].remote_id, Some(RemoteId::from("r2")));
    }

    #[test]
    fn remote_upsert_of_identical_content_keeps_timestamp() {
        let t0 = Utc::now() - Duration::hours(1);
        let mut remote = MemoryRemote::new("lt");
        remote.put(record("r1", "a", t0));

        remote.upsert(&record("r1", "a", Utc::now())).unwrap();
        assert_eq!(remote.get(&RemoteId::from("r1")).unwrap().modified_at, t0);

        remote.upsert(&record("r1", "b", Utc::now())).unwrap();
        assert!(remote.get(&RemoteId::from("r1")).unwrap().modified_at > t0);
    }

    #[test]
    fn remote_upsert_assigns_ids_to_new_records() {
        let mut remote = MemoryRemote::new("lt");
        let mut rec = record("ignored", "a", Utc::now());
        rec.remote_id = None;
        let id = remote.upsert(&rec).unwrap();
        assert_eq!(id, RemoteId::from("r-1"));
        assert_eq!(remote.len(), 1);
    }

    #[test]
    fn scripted_failures_run_out() {
        let mut remote = MemoryRemote::new("lt");
        remote.fail_lists(Some(2), RemoteError::Transient("timeout".into()));
        assert!(remote.list(Utc::now()).is_err());
        assert!(remote.list(Utc::now()).is_err());
        assert!(remote.list(Utc::now()).is_ok());
        assert_eq!(remote.calls().list, 3);
    }

    #[test]
    fn local_upsert_reports_created_updated_unchanged() {
        let t0 = Utc::now();
        let mut local = MemoryLocal::new();
        assert_eq!(
            local.upsert_by_remote_id(&record("r1", "a", t0)).unwrap(),
            UpsertOutcome::Created
        );
        assert_eq!(
            local
                .upsert_by_remote_id(&record("r1", "a", t0 + Duration::seconds(5)))
                .unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(
            local.upsert_by_remote_id(&record("r1", "b", t0)).unwrap(),
            UpsertOutcome::Updated
        );
    }

    #[test]
    fn local_erase_is_terminal() {
        let mut local = MemoryLocal::new();
        local.insert(record("r1", "a", Utc::now()));

        assert!(local.erase_by_remote_id(&RemoteId::from("r1")).unwrap());
        assert!(!local.erase_by_remote_id(&RemoteId::from("r1")).unwrap());
        assert!(local.is_erased(&RemoteId::from("r1")).unwrap());

        let erased = local.get(&RemoteId::from("r1")).unwrap().unwrap();
        assert!(erased.erased && erased.fields.is_empty());

        let err = local
            .upsert_by_remote_id(&record("r1", "a", Utc::now()))
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(local
            .find_modified_since(DateTime::<Utc>::UNIX_EPOCH)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn erase_of_unknown_id_still_tombstones() {
        let mut local = MemoryLocal::new();
        assert!(!local.erase_by_remote_id(&RemoteId::from("ghost")).unwrap());
        assert!(local.is_erased(&RemoteId::from("ghost")).unwrap());
    }

    #[test]
    fn checkpoints_never_regress() {
        let lt = PartitionId::from("lt");
        let t1 = Utc::now();
        let mut checkpoints = MemoryCheckpoints::new();
        checkpoints.set(&lt, t1).unwrap();
        checkpoints.set(&lt, t1 - Duration::hours(1)).unwrap();
        assert_eq!(checkpoints.get(&lt).unwrap(), Some(t1));
    }
}
