//! Append-only JSON-lines processing log with size-based rotation.
//!
//! Each partition logs to `<home>/.fieldsync/logs/<partition>.jsonl`. Before
//! every append the file is rotated once it reaches 10 MiB, keeping at most 5
//! copies:
//!   `lt.jsonl` → `lt.jsonl.1` → `lt.jsonl.2` → … → `lt.jsonl.5`

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fieldsync_core::PartitionId;

use crate::error::{io_err, SyncError};
use crate::paths::{ensure_parent, log_path_at};
use crate::store::{LogEntry, ProcessingLog};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated copies to keep.
pub const MAX_ROTATED_FILES: usize = 5;

#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
}

impl JsonlLog {
    pub fn open_at(home: &Path, partition: &PartitionId) -> Self {
        Self::with_limits(log_path_at(home, partition), MAX_LOG_BYTES, MAX_ROTATED_FILES)
    }

    pub fn with_limits(path: PathBuf, max_bytes: u64, max_files: usize) -> Self {
        Self {
            path,
            max_bytes,
            max_files,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in the live file.
    pub fn read_entries(&self) -> Result<Vec<LogEntry>, SyncError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(SyncError::from))
            .collect()
    }
}

impl ProcessingLog for JsonlLog {
    fn append(&mut self, entry: LogEntry) -> Result<(), SyncError> {
        ensure_parent(&self.path)?;
        match rotate_if_needed(&self.path, self.max_bytes, self.max_files) {
            Ok(true) => tracing::info!(path = %self.path.display(), "processing log rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "log rotation failed")
            }
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(&self.path, e))
    }
}

/// Rotate `log_path` if its size has reached `max_bytes`.
///
/// Returns `true` if rotation occurred. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;
    Ok(true)
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("sync.jsonl");
    base.with_file_name(format!("{name}.{n}"))
}
