//! Error types for fieldsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from config registry operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.fieldsync/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No partition file at the expected path.
    #[error("partition not found at {path}")]
    PartitionNotFound { path: PathBuf },

    /// Partition id is empty or contains characters unsafe for a file name.
    #[error("invalid partition id '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidPartition(String),
}
