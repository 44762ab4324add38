//! Error types for fieldsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use fieldsync_core::{ConfigError, PartitionId};

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network, timeout or server-side failure; worth retrying.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote refused the request; retrying will not help.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    /// The endpoint answered on behalf of a different partition.
    #[error("endpoint serves partition {0}")]
    PartitionMismatch(PartitionId),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// Pass-level errors. Anything returned here aborts the pass and leaves the
/// checkpoint where it was.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Pulling from the remote failed after the retry budget was spent.
    #[error("remote for partition {partition} unavailable: {source}")]
    RemoteUnavailable {
        partition: PartitionId,
        #[source]
        source: RemoteError,
    },

    /// A pass for one partition reached an endpoint serving another.
    #[error("sovereignty violation: pass for partition {expected} reached endpoint serving {endpoint}")]
    SovereigntyViolation {
        expected: PartitionId,
        endpoint: PartitionId,
    },

    /// A local store refused an operation.
    #[error("store error: {0}")]
    Store(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (file stores).
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error from the config registry.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Another process holds the pass lock for this partition.
    #[error("partition {partition} is being synced by another process")]
    Locked { partition: PartitionId },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
