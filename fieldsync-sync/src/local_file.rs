//! File-backed local record store.
//!
//! State is a [`MemoryLocal`] persisted as one JSON document per partition at
//! `<home>/.fieldsync/records/<partition>.json`. Every mutation that changes
//! state is written back atomically before the call returns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use fieldsync_core::{PartitionId, Record, RemoteId};

use crate::error::{io_err, SyncError};
use crate::memory::MemoryLocal;
use crate::paths::{records_path_at, write_json_atomic};
use crate::store::{LocalStore, UpsertOutcome};

#[derive(Debug)]
pub struct FileLocal {
    path: PathBuf,
    state: MemoryLocal,
}

impl FileLocal {
    /// Open the store for `partition`; a missing file is an empty store.
    pub fn open_at(home: &Path, partition: &PartitionId) -> Result<Self, SyncError> {
        let path = records_path_at(home, partition);
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            serde_json::from_str(&contents)?
        } else {
            MemoryLocal::new()
        };
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &MemoryLocal {
        &self.state
    }

    /// Apply a local edit and persist it.
    pub fn insert(&mut self, record: Record) -> Result<(), SyncError> {
        self.state.insert(record);
        self.save()
    }

    fn save(&self) -> Result<(), SyncError> {
        write_json_atomic(&self.path, &self.state)
    }
}

impl LocalStore for FileLocal {
    fn find_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<Record>, SyncError> {
        self.state.find_modified_since(since)
    }

    fn upsert_by_remote_id(&mut self, record: &Record) -> Result<UpsertOutcome, SyncError> {
        let outcome = self.state.upsert_by_remote_id(record)?;
        if outcome != UpsertOutcome::Unchanged {
            self.save()?;
        }
        Ok(outcome)
    }

    fn erase_by_remote_id(&mut self, id: &RemoteId) -> Result<bool, SyncError> {
        let already = self.state.is_erased(id)?;
        let erased = self.state.erase_by_remote_id(id)?;
        if !already {
            self.save()?;
        }
        Ok(erased)
    }

    fn is_erased(&self, id: &RemoteId) -> Result<bool, SyncError> {
        self.state.is_erased(id)
    }

    fn get(&self, id: &RemoteId) -> Result<Option<Record>, SyncError> {
        self.state.get(id)
    }
}
