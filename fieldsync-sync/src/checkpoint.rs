//! File-backed sync checkpoints.
//!
//! One JSON document per partition at
//! `<home>/.fieldsync/checkpoints/<partition>.json`, written with the same
//! atomic `.tmp` + rename pattern as the registry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldsync_core::PartitionId;

use crate::error::{io_err, SyncError};
use crate::paths::{checkpoint_path_at, write_json_atomic};
use crate::store::CheckpointStore;

/// On-disk checkpoint payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointFile {
    pub partition: PartitionId,
    pub synced_at: DateTime<Utc>,
}

/// Load the checkpoint for `partition`, or `None` if it was never set.
pub fn load_at(home: &Path, partition: &PartitionId) -> Result<Option<CheckpointFile>, SyncError> {
    let path = checkpoint_path_at(home, partition);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save `file` atomically, unconditionally.
pub fn save_at(home: &Path, file: &CheckpointFile) -> Result<(), SyncError> {
    write_json_atomic(&checkpoint_path_at(home, &file.partition), file)
}

/// [`CheckpointStore`] over the checkpoint files under one home.
#[derive(Debug, Clone)]
pub struct FileCheckpoints {
    home: PathBuf,
}

impl FileCheckpoints {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl CheckpointStore for FileCheckpoints {
    fn get(&self, partition: &PartitionId) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(load_at(&self.home, partition)?.map(|f| f.synced_at))
    }

    fn set(&mut self, partition: &PartitionId, at: DateTime<Utc>) -> Result<(), SyncError> {
        if let Some(current) = self.get(partition)? {
            if current >= at {
                return Ok(());
            }
        }
        save_at(
            &self.home,
            &CheckpointFile {
                partition: partition.clone(),
                synced_at: at,
            },
        )
    }
}
