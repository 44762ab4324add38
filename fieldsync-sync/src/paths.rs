//! On-disk locations of per-partition sync state, plus the atomic JSON
//! writer every file store shares.

use std::path::{Path, PathBuf};

use serde::Serialize;

use fieldsync_core::{registry, PartitionId};

use crate::error::{io_err, SyncError};

/// `<home>/.fieldsync/checkpoints/<partition>.json`
pub fn checkpoint_path_at(home: &Path, partition: &PartitionId) -> PathBuf {
    registry::root_at(home)
        .join("checkpoints")
        .join(format!("{}.json", partition.0))
}

/// `<home>/.fieldsync/records/<partition>.json`
pub fn records_path_at(home: &Path, partition: &PartitionId) -> PathBuf {
    registry::root_at(home)
        .join("records")
        .join(format!("{}.json", partition.0))
}

/// `<home>/.fieldsync/logs/<partition>.jsonl`
pub fn log_path_at(home: &Path, partition: &PartitionId) -> PathBuf {
    registry::root_at(home)
        .join("logs")
        .join(format!("{}.jsonl", partition.0))
}

/// Create the parent directory of `path` (mode `0700`).
pub(crate) fn ensure_parent(path: &Path) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("path has no parent")));
    };
    registry::ensure_dir(dir)?;
    Ok(())
}

/// Serialize → `.json.tmp` sibling → `chmod 0600` → `rename`.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}
