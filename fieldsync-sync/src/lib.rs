//! # fieldsync-sync
//!
//! Bidirectional, field-masked record synchronization per partition.
//!
//! [`Synchronizer::run_sync`] runs one pass against any combination of
//! [`RemoteStore`], [`LocalStore`], [`CheckpointStore`] and
//! [`ProcessingLog`]. [`pipeline::run`] wires the file-backed stores and the
//! HTTP remote from the registry under `~/.fieldsync/`.

pub mod checkpoint;
pub mod error;
pub mod http;
pub mod local_file;
pub mod lock;
pub mod memory;
pub mod paths;
pub mod pipeline;
pub mod processing_log;
pub mod report;
pub mod retry;
pub mod store;
pub mod synchronizer;

pub use checkpoint::FileCheckpoints;
pub use error::{RemoteError, SyncError};
pub use http::HttpRemote;
pub use local_file::FileLocal;
pub use lock::{PartitionLocks, PassGuard, ProcessLock};
pub use memory::{CallCounts, MemoryCheckpoints, MemoryLocal, MemoryLog, MemoryRemote};
pub use pipeline::{PartitionOutcome, SyncScope};
pub use processing_log::JsonlLog;
pub use report::{RecordError, SyncReport};
pub use retry::RetryPolicy;
pub use store::{
    CheckpointStore, Direction, LocalStore, LogEntry, Outcome, ProcessingLog, RemoteStore,
    UpsertOutcome,
};
pub use synchronizer::Synchronizer;
