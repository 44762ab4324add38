//! Pass-level mutual exclusion per partition.
//!
//! [`PartitionLocks`] serialises passes inside one process: a second pass for
//! the same partition blocks until the first guard drops. Different
//! partitions never wait on each other.
//!
//! [`ProcessLock`] does the same across processes with an exclusive OS file
//! lock on `<home>/.fieldsync/run/<partition>.lock`; a second process fails
//! fast with [`SyncError::Locked`] instead of waiting.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};

use fs2::FileExt;

use fieldsync_core::{registry, PartitionId};

use crate::error::{io_err, SyncError};

/// In-process pass locks, keyed by partition.
#[derive(Debug, Default)]
pub struct PartitionLocks {
    held: Mutex<HashSet<PartitionId>>,
    released: Condvar,
}

/// Held for the duration of one pass; releases on drop.
#[derive(Debug)]
pub struct PassGuard<'a> {
    locks: &'a PartitionLocks,
    partition: PartitionId,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock table.
    pub fn shared() -> Arc<PartitionLocks> {
        static SHARED: OnceLock<Arc<PartitionLocks>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(PartitionLocks::new())))
    }

    /// Block until no other pass holds `partition`, then take it.
    pub fn acquire(&self, partition: &PartitionId) -> PassGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(partition) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(partition.clone());
        PassGuard {
            locks: self,
            partition: partition.clone(),
        }
    }

    /// Take `partition` only if it is free.
    pub fn try_acquire(&self, partition: &PartitionId) -> Option<PassGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(partition.clone()) {
            return None;
        }
        Some(PassGuard {
            locks: self,
            partition: partition.clone(),
        })
    }

    pub fn is_held(&self, partition: &PartitionId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(partition)
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.partition);
        self.locks.released.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Cross-process lock
// ---------------------------------------------------------------------------

/// `<home>/.fieldsync/run/<partition>.lock`
pub fn lock_path_at(home: &Path, partition: &PartitionId) -> PathBuf {
    registry::root_at(home)
        .join("run")
        .join(format!("{}.lock", partition.0))
}

/// Exclusive file lock for one partition; unlocks on drop.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    pub fn acquire_at(home: &Path, partition: &PartitionId) -> Result<Self, SyncError> {
        let path = lock_path_at(home, partition);
        if let Some(dir) = path.parent() {
            registry::ensure_dir(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked {
                partition: partition.clone(),
            });
        }
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
