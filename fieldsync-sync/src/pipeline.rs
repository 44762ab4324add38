//! Sync pipeline entrypoint used by the CLI.
//!
//! Builds the file-backed stores and the HTTP remote for each registered
//! partition and runs one pass per partition.

use std::path::Path;

use fieldsync_core::{registry, PartitionConfig, PartitionId, Settings};
use fieldsync_mask::RuleSet;

use crate::checkpoint::FileCheckpoints;
use crate::error::SyncError;
use crate::http::HttpRemote;
use crate::local_file::FileLocal;
use crate::lock::ProcessLock;
use crate::processing_log::JsonlLog;
use crate::report::SyncReport;
use crate::retry::RetryPolicy;
use crate::store::RemoteStore;
use crate::synchronizer::Synchronizer;

/// Scope for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every registered partition, one after the other.
    All,
    /// A single partition.
    Partition(PartitionId),
}

/// Result of one partition's pass within a pipeline run.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub partition: PartitionId,
    pub result: Result<SyncReport, SyncError>,
}

impl PartitionOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run the pipeline for `scope`.
///
/// Config errors fail the whole run. A pass-level error for one partition is
/// reported in its [`PartitionOutcome`] and does not stop the others.
pub fn run(home: &Path, scope: SyncScope) -> Result<Vec<PartitionOutcome>, SyncError> {
    let settings = registry::load_settings_at(home)?;
    let configs = match scope {
        SyncScope::All => registry::list_partitions_at(home)?,
        SyncScope::Partition(id) => vec![registry::load_partition_at(home, &id)?],
    };

    Ok(configs
        .iter()
        .map(|config| {
            let result = sync_partition(home, &settings, config);
            if let Err(err) = &result {
                tracing::error!(partition = %config.id, error = %err, "sync pass failed");
            }
            PartitionOutcome {
                partition: config.id.clone(),
                result,
            }
        })
        .collect())
}

/// One pass for `config` against its HTTP endpoint.
pub fn sync_partition(
    home: &Path,
    settings: &Settings,
    config: &PartitionConfig,
) -> Result<SyncReport, SyncError> {
    let remote = HttpRemote::new(config.id.clone(), &config.endpoint);
    sync_partition_with_remote(home, settings, config, remote)
}

/// One pass for `config` against any remote, using the file-backed stores
/// under `home`. Holds the cross-process lock for the whole pass.
pub fn sync_partition_with_remote<R: RemoteStore>(
    home: &Path,
    settings: &Settings,
    config: &PartitionConfig,
    remote: R,
) -> Result<SyncReport, SyncError> {
    let _process_lock = ProcessLock::acquire_at(home, &config.id)?;
    let local = FileLocal::open_at(home, &config.id)?;
    let mut synchronizer = Synchronizer::new(
        remote,
        local,
        FileCheckpoints::new(home),
        JsonlLog::open_at(home, &config.id),
        RuleSet::for_partition(settings, config),
    )
    .with_retry(RetryPolicy::from(&settings.retry));
    synchronizer.run_sync(&config.id)
}
