//! One bidirectional sync pass for one partition.
//!
//! A pass pulls remote changes since the partition's checkpoint, applies them
//! locally (masked), pushes local changes since the same checkpoint (masked),
//! and advances the checkpoint to the pass start time only when no record
//! failed. Re-running a window is a no-op in effect: local upserts of
//! identical content are `Unchanged` and masking is idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use fieldsync_core::{PartitionId, Record, RemoteId};
use fieldsync_mask::RuleSet;

use crate::error::{RemoteError, SyncError};
use crate::lock::PartitionLocks;
use crate::report::SyncReport;
use crate::retry::RetryPolicy;
use crate::store::{
    CheckpointStore, Direction, LocalStore, LogEntry, Outcome, ProcessingLog, RemoteStore,
    UpsertOutcome,
};

pub struct Synchronizer<R, L, C, P> {
    pub remote: R,
    pub local: L,
    pub checkpoints: C,
    pub log: P,
    rules: RuleSet,
    retry: RetryPolicy,
    locks: Arc<PartitionLocks>,
}

impl<R, L, C, P> Synchronizer<R, L, C, P>
where
    R: RemoteStore,
    L: LocalStore,
    C: CheckpointStore,
    P: ProcessingLog,
{
    /// Default retry policy, process-wide pass locks.
    pub fn new(remote: R, local: L, checkpoints: C, log: P, rules: RuleSet) -> Self {
        Self {
            remote,
            local,
            checkpoints,
            log,
            rules,
            retry: RetryPolicy::default(),
            locks: PartitionLocks::shared(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_locks(mut self, locks: Arc<PartitionLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run one pass for `partition`.
    ///
    /// Pass-level failures (unreachable remote, sovereignty violation, local
    /// store errors) abort the pass and leave the checkpoint untouched.
    /// Per-record failures are tallied in the report and keep the checkpoint
    /// where it was so the window is retried.
    pub fn run_sync(&mut self, partition: &PartitionId) -> Result<SyncReport, SyncError> {
        let locks = Arc::clone(&self.locks);
        let _guard = locks.acquire(partition);

        if self.remote.partition() != partition {
            return Err(SyncError::SovereigntyViolation {
                expected: partition.clone(),
                endpoint: self.remote.partition().clone(),
            });
        }

        let started_at = Utc::now();
        let checkpoint_before = self.checkpoints.get(partition)?;
        let since = checkpoint_before.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let mut report = SyncReport::begin(partition.clone(), started_at, checkpoint_before);
        tracing::info!(partition = %partition, since = %since, "sync pass started");

        let pulled = self.pull(partition, since)?;
        let mut reconciled = HashSet::new();
        for record in pulled {
            self.apply_pulled(partition, record, &mut report, &mut reconciled)?;
        }

        for record in self.local.find_modified_since(since)? {
            self.push_local(partition, record, &mut report, &reconciled)?;
        }

        if report.is_clean() {
            self.checkpoints.set(partition, started_at)?;
        } else {
            tracing::warn!(
                partition = %partition,
                errored = report.errored,
                "records failed; checkpoint not advanced"
            );
        }
        report.checkpoint_after = self.checkpoints.get(partition)?;
        report.checkpoint_advanced = report.checkpoint_after != checkpoint_before;
        report.finished_at = Utc::now();

        tracing::info!(
            partition = %partition,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            pushed = report.pushed,
            errored = report.errored,
            masked_fields_dropped = report.masked_fields_dropped,
            erasure_conflicts = report.erasure_conflicts,
            checkpoint_advanced = report.checkpoint_advanced,
            "sync pass finished"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    fn pull(
        &mut self,
        partition: &PartitionId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Record>, SyncError> {
        let retry = self.retry;
        let remote = &mut self.remote;
        match retry.run("list", || remote.list(since)) {
            Ok(records) => {
                tracing::debug!(partition = %partition, count = records.len(), "pulled remote changes");
                Ok(records)
            }
            Err(RemoteError::PartitionMismatch(served)) => Err(sovereignty(partition, served)),
            Err(source) => Err(SyncError::RemoteUnavailable {
                partition: partition.clone(),
                source,
            }),
        }
    }

    fn apply_pulled(
        &mut self,
        partition: &PartitionId,
        record: Record,
        report: &mut SyncReport,
        reconciled: &mut HashSet<RemoteId>,
    ) -> Result<(), SyncError> {
        let Some(id) = record.remote_id.clone() else {
            tracing::warn!(partition = %partition, "pulled record has no remote id; skipped");
            return self.log_entry(partition, None, Direction::Pull, Outcome::Skipped, Some("missing remote id"));
        };

        if record.erased {
            if self.local.erase_by_remote_id(&id)? {
                report.deleted += 1;
                tracing::debug!(partition = %partition, remote_id = %id, "erased on remote");
                return self.log_entry(partition, Some(&id), Direction::Pull, Outcome::Erased, None);
            }
            return self.log_entry(partition, Some(&id), Direction::Pull, Outcome::Unchanged, None);
        }

        if self.local.is_erased(&id)? {
            return self.resolve_erasure_conflict(partition, &id, report);
        }

        let masked = self.rules.mask_record(&record);

        if let Some(existing) = self.local.get(&id)? {
            if existing.erased {
                tracing::debug!(partition = %partition, remote_id = %id, "local erasure pending; pull skipped");
                return self.log_entry(
                    partition,
                    Some(&id),
                    Direction::Pull,
                    Outcome::Skipped,
                    Some("local erasure pending"),
                );
            }
            // The remote only ever holds the masked form of what we pushed.
            if self.is_echo(&existing, &masked.record) {
                reconciled.insert(id.clone());
                tracing::debug!(partition = %partition, remote_id = %id, "remote matches masked local record");
                return self.log_entry(partition, Some(&id), Direction::Pull, Outcome::Unchanged, None);
            }
        }

        report.masked_fields_dropped += masked.dropped.len();
        let outcome = self.local.upsert_by_remote_id(&masked.record)?;
        reconciled.insert(id.clone());
        let logged = match outcome {
            UpsertOutcome::Created => {
                report.created += 1;
                Outcome::Created
            }
            UpsertOutcome::Updated => {
                report.updated += 1;
                Outcome::Updated
            }
            UpsertOutcome::Unchanged => Outcome::Unchanged,
        };
        tracing::debug!(partition = %partition, remote_id = %id, outcome = ?outcome, "applied pulled record");
        let detail = dropped_detail(&masked.dropped);
        self.log_entry(partition, Some(&id), Direction::Pull, logged, detail.as_deref())
    }

    /// The remote still serves a record that was erased here. Erasure wins:
    /// the delete is re-issued and nothing is re-created.
    fn resolve_erasure_conflict(
        &mut self,
        partition: &PartitionId,
        id: &RemoteId,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        report.erasure_conflicts += 1;
        tracing::warn!(partition = %partition, remote_id = %id, "remote still serves an erased record; re-issuing delete");

        let detail = match self.remote_delete(partition, id)? {
            Ok(()) => "delete re-issued".to_string(),
            Err(err) => {
                report.record_error(Some(id.clone()), "erasure_conflict_delete", err.to_string());
                format!("delete failed: {err}")
            }
        };
        self.log_entry(
            partition,
            Some(id),
            Direction::Pull,
            Outcome::ErasureConflict,
            Some(&detail),
        )
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    fn push_local(
        &mut self,
        partition: &PartitionId,
        record: Record,
        report: &mut SyncReport,
        reconciled: &HashSet<RemoteId>,
    ) -> Result<(), SyncError> {
        let Some(id) = record.remote_id.clone() else {
            return Ok(());
        };
        if reconciled.contains(&id) || self.local.is_erased(&id)? {
            return Ok(());
        }

        if record.erased {
            return match self.remote_delete(partition, &id)? {
                Ok(()) => {
                    self.local.erase_by_remote_id(&id)?;
                    report.deleted += 1;
                    tracing::debug!(partition = %partition, remote_id = %id, "erasure pushed");
                    self.log_entry(partition, Some(&id), Direction::Push, Outcome::Erased, None)
                }
                Err(err) => {
                    let message = err.to_string();
                    report.record_error(Some(id.clone()), "delete", message.clone());
                    self.log_entry(partition, Some(&id), Direction::Push, Outcome::Failed, Some(&message))
                }
            };
        }

        let masked = self.rules.mask_record(&record);
        report.masked_fields_dropped += masked.dropped.len();

        let retry = self.retry;
        let remote = &mut self.remote;
        match retry.run("upsert", || remote.upsert(&masked.record)) {
            Ok(assigned) => {
                if assigned != id {
                    tracing::warn!(partition = %partition, remote_id = %id, assigned = %assigned, "remote assigned a different id");
                }
                report.pushed += 1;
                tracing::debug!(partition = %partition, remote_id = %id, "pushed local change");
                let detail = dropped_detail(&masked.dropped);
                self.log_entry(partition, Some(&id), Direction::Push, Outcome::Pushed, detail.as_deref())
            }
            Err(RemoteError::PartitionMismatch(served)) => Err(sovereignty(partition, served)),
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(partition = %partition, remote_id = %id, error = %err, "push failed");
                report.record_error(Some(id.clone()), "push", message.clone());
                self.log_entry(partition, Some(&id), Direction::Push, Outcome::Failed, Some(&message))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// True when `pulled` is what pushing `local` would send.
    fn is_echo(&self, local: &Record, pulled: &Record) -> bool {
        local.erased == pulled.erased && self.rules.mask_fields(&local.fields).fields == pulled.fields
    }

    /// Delete with retry. The outer error aborts the pass; the inner one is a
    /// per-record failure.
    fn remote_delete(
        &mut self,
        partition: &PartitionId,
        id: &RemoteId,
    ) -> Result<Result<(), RemoteError>, SyncError> {
        let retry = self.retry;
        let remote = &mut self.remote;
        match retry.run("delete", || remote.delete(id)) {
            Err(RemoteError::PartitionMismatch(served)) => Err(sovereignty(partition, served)),
            other => Ok(other),
        }
    }

    fn log_entry(
        &mut self,
        partition: &PartitionId,
        remote_id: Option<&RemoteId>,
        direction: Direction,
        outcome: Outcome,
        detail: Option<&str>,
    ) -> Result<(), SyncError> {
        self.log.append(LogEntry {
            at: Utc::now(),
            partition: partition.clone(),
            remote_id: remote_id.cloned(),
            direction,
            outcome,
            detail: detail.map(str::to_string),
        })
    }
}

fn sovereignty(expected: &PartitionId, served: PartitionId) -> SyncError {
    SyncError::SovereigntyViolation {
        expected: expected.clone(),
        endpoint: served,
    }
}

/// Names only, never values.
fn dropped_detail(dropped: &[String]) -> Option<String> {
    if dropped.is_empty() {
        None
    } else {
        Some(format!("dropped fields: {}", dropped.join(", ")))
    }
}
