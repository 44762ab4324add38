//! End-to-end passes against the in-memory stores.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fieldsync_core::{default_rules, FieldMap, PartitionId, Record, RemoteId};
use fieldsync_mask::RuleSet;
use fieldsync_sync::{
    CheckpointStore, Direction, LocalStore, MemoryCheckpoints, MemoryLocal, MemoryLog,
    MemoryRemote, Outcome, PartitionLocks, RemoteError, RemoteStore, RetryPolicy, SyncError,
    Synchronizer,
};
use rstest::rstest;
use serde_json::{json, Value};

type MemorySync = Synchronizer<MemoryRemote, MemoryLocal, MemoryCheckpoints, MemoryLog>;

fn lt() -> PartitionId {
    PartitionId::from("lt")
}

fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn synchronizer(remote: MemoryRemote) -> MemorySync {
    Synchronizer::new(
        remote,
        MemoryLocal::new(),
        MemoryCheckpoints::new(),
        MemoryLog::new(),
        RuleSet::new(default_rules()),
    )
    .with_retry(RetryPolicy::immediate(3))
    .with_locks(Arc::new(PartitionLocks::new()))
}

fn jonas(at: DateTime<Utc>) -> Record {
    Record::new(
        "r1",
        fields(&[
            ("name", json!("Jonas Jonaitis")),
            ("religion", json!("Catholic/RomanRite")),
        ]),
        at,
    )
}

#[test]
fn first_pass_pulls_masks_and_advances_checkpoint() {
    let mut remote = MemoryRemote::new("lt");
    remote.put(jonas(Utc::now() - Duration::hours(1)));
    let mut sync = synchronizer(remote);

    let report = sync.run_sync(&lt()).expect("pass");

    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.pushed, 0);
    assert_eq!(report.errored, 0);
    assert_eq!(report.checkpoint_before, None);
    assert_eq!(report.checkpoint_after, Some(report.started_at));
    assert!(report.checkpoint_advanced);
    assert_eq!(sync.checkpoints.get(&lt()).unwrap(), Some(report.started_at));

    let local = sync.local.get(&RemoteId::from("r1")).unwrap().expect("created");
    assert_eq!(local.fields["name"], json!("Jonas Jonaitis"));
    assert_eq!(local.fields["religion"], json!("Catholic"));

    // Pulled data is never echoed back to the remote.
    assert_eq!(sync.remote.calls().upsert, 0);
    assert_eq!(
        sync.remote.get(&RemoteId::from("r1")).unwrap().fields["religion"],
        json!("Catholic/RomanRite")
    );

    let entries = sync.log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Pull);
    assert_eq!(entries[0].outcome, Outcome::Created);
}

#[test]
fn second_pass_without_changes_is_a_no_op() {
    let mut remote = MemoryRemote::new("lt");
    remote.put(jonas(Utc::now() - Duration::hours(1)));
    let mut sync = synchronizer(remote);

    sync.run_sync(&lt()).expect("first pass");
    let local_after_first = sync.local.clone();
    let second = sync.run_sync(&lt()).expect("second pass");

    assert!(!second.has_changes());
    assert_eq!(second.errored, 0);
    assert_eq!(sync.local, local_after_first);
}

#[test]
fn pushed_record_coming_back_masked_leaves_local_untouched() {
    let mut sync = synchronizer(MemoryRemote::new("lt"));
    sync.local.insert(Record::new(
        "r3",
        fields(&[
            ("name", json!("Ona Onaitė")),
            ("religion", json!("Orthodox/Old Believers")),
        ]),
        Utc::now() - Duration::minutes(1),
    ));

    let first = sync.run_sync(&lt()).expect("push pass");
    assert_eq!(first.pushed, 1);
    assert_eq!(
        sync.remote.get(&RemoteId::from("r3")).unwrap().fields["religion"],
        json!("Orthodox")
    );

    // The remote re-stamped r3, so the next pull sees it again.
    let local_after_first = sync.local.clone();
    let second = sync.run_sync(&lt()).expect("idle pass");

    assert!(!second.has_changes(), "{second:?}");
    assert_eq!(second.errored, 0);
    assert!(second.checkpoint_advanced);
    assert_eq!(sync.local, local_after_first);
    assert_eq!(
        sync.local.get(&RemoteId::from("r3")).unwrap().expect("kept").fields["religion"],
        json!("Orthodox/Old Believers")
    );
    assert_eq!(sync.remote.calls().upsert, 1);

    let last = sync.log.entries().last().cloned().expect("logged");
    assert_eq!(last.direction, Direction::Pull);
    assert_eq!(last.outcome, Outcome::Unchanged);
}

#[test]
fn replaying_a_window_is_a_no_op() {
    let mut remote = MemoryRemote::new("lt");
    remote.put(jonas(Utc::now() - Duration::hours(1)));
    let mut sync = synchronizer(remote);
    sync.run_sync(&lt()).expect("first pass");

    // As if the process died before the checkpoint was written.
    sync.checkpoints = MemoryCheckpoints::new();
    let replay = sync.run_sync(&lt()).expect("replay");

    assert_eq!(replay.created, 0);
    assert_eq!(replay.updated, 0);
    assert_eq!(replay.pushed, 0);
    assert_eq!(sync.remote.calls().upsert, 0);
}

#[test]
fn remote_update_is_applied_masked() {
    let t0 = Utc::now() - Duration::hours(1);
    let mut remote = MemoryRemote::new("lt");
    remote.put(jonas(t0));
    let mut sync = synchronizer(remote);
    sync.run_sync(&lt()).expect("first pass");

    let mut changed = jonas(Utc::now());
    changed
        .fields
        .insert("religion".to_string(), json!("Orthodox/Old Believers"));
    sync.remote.put(changed);

    let report = sync.run_sync(&lt()).expect("second pass");
    assert_eq!(report.updated, 1);
    let local = sync.local.get(&RemoteId::from("r1")).unwrap().unwrap();
    assert_eq!(local.fields["religion"], json!("Orthodox"));
}

#[test]
fn local_change_is_pushed_masked() {
    let mut sync = synchronizer(MemoryRemote::new("lt"));
    sync.local.insert(Record::new(
        "r3",
        fields(&[
            ("name", json!("Ona Onaitė")),
            ("religion", json!("Orthodox/Old Believers")),
            ("birth_date", json!("1985-04-12")),
            (
                "address",
                json!({"street": "Gedimino pr. 1", "city": "Vilnius", "country": "LT"}),
            ),
        ]),
        Utc::now(),
    ));

    let report = sync.run_sync(&lt()).expect("pass");
    assert_eq!(report.pushed, 1);
    assert_eq!(report.errored, 0);

    let sent = sync.remote.get(&RemoteId::from("r3")).expect("pushed");
    assert_eq!(sent.fields["name"], json!("Ona Onaitė"));
    assert_eq!(sent.fields["religion"], json!("Orthodox"));
    assert_eq!(sent.fields["birth_date"], json!("1985"));
    assert_eq!(
        sent.fields["address"],
        json!({"city": "Vilnius", "country": "LT"})
    );
}

#[test]
fn local_records_without_remote_id_are_not_pushed() {
    let mut sync = synchronizer(MemoryRemote::new("lt"));
    let mut draft = Record::new("unused", fields(&[("name", json!("Petras"))]), Utc::now());
    draft.remote_id = None;
    sync.local.insert(draft);

    let report = sync.run_sync(&lt()).expect("pass");
    assert_eq!(report.pushed, 0);
    assert!(sync.remote.is_empty());
}

#[test]
fn failing_push_is_counted_and_retried_next_pass() {
    let checkpoint = Utc::now() - Duration::hours(1);
    let mut remote = MemoryRemote::new("lt");
    remote.put(Record::new(
        "r2",
        fields(&[("name", json!("Old"))]),
        checkpoint - Duration::hours(1),
    ));
    remote.fail_upserts_of("r2", None, RemoteError::Transient("timeout".to_string()));

    let mut sync = synchronizer(remote);
    sync.checkpoints.set(&lt(), checkpoint).unwrap();
    sync.local.insert(Record::new(
        "r2",
        fields(&[("name", json!("New"))]),
        Utc::now(),
    ));

    let failed = sync.run_sync(&lt()).expect("pass completes");
    assert_eq!(failed.errored, 1);
    assert_eq!(failed.pushed, 0);
    assert_eq!(failed.errors[0].remote_id, Some(RemoteId::from("r2")));
    assert_eq!(failed.errors[0].operation, "push");
    assert_eq!(failed.checkpoint_after, Some(checkpoint));
    assert!(!failed.checkpoint_advanced);
    assert_eq!(sync.remote.calls().upsert, 3);
    assert!(sync
        .log
        .entries()
        .iter()
        .any(|e| e.outcome == Outcome::Failed && e.direction == Direction::Push));

    sync.remote.clear_failures();
    let retried = sync.run_sync(&lt()).expect("retry pass");
    assert_eq!(retried.pushed, 1);
    assert_eq!(retried.errored, 0);
    assert!(retried.checkpoint_advanced);
    assert_eq!(
        sync.remote.get(&RemoteId::from("r2")).unwrap().fields["name"],
        json!("New")
    );
}

#[test]
fn push_succeeds_within_retry_budget() {
    let mut remote = MemoryRemote::new("lt");
    remote.fail_upserts_of("r2", Some(2), RemoteError::Transient("503".to_string()));
    let mut sync = synchronizer(remote);
    sync.local
        .insert(Record::new("r2", fields(&[("name", json!("Ona"))]), Utc::now()));

    let report = sync.run_sync(&lt()).expect("pass");
    assert_eq!(report.pushed, 1);
    assert_eq!(report.errored, 0);
    assert_eq!(sync.remote.calls().upsert, 3);
}

#[rstest]
#[case::transient(RemoteError::Transient("connection refused".to_string()), 3)]
#[case::rejected(RemoteError::Rejected("HTTP 401".to_string()), 1)]
fn unreachable_remote_aborts_the_pass(#[case] error: RemoteError, #[case] attempts: usize) {
    let checkpoint = Utc::now() - Duration::hours(1);
    let mut remote = MemoryRemote::new("lt");
    remote.fail_lists(None, error);
    let mut sync = synchronizer(remote);
    sync.checkpoints.set(&lt(), checkpoint).unwrap();
    sync.local
        .insert(Record::new("r2", fields(&[("name", json!("Ona"))]), Utc::now()));

    let err = sync.run_sync(&lt()).unwrap_err();
    assert!(matches!(err, SyncError::RemoteUnavailable { .. }), "{err}");
    assert_eq!(sync.remote.calls().list, attempts);
    assert_eq!(sync.remote.calls().upsert, 0);
    assert_eq!(sync.checkpoints.get(&lt()).unwrap(), Some(checkpoint));
}

#[test]
fn endpoint_for_another_partition_is_refused() {
    let mut remote = MemoryRemote::new("pl");
    remote.put(jonas(Utc::now()));
    let mut sync = synchronizer(remote);

    let err = sync.run_sync(&lt()).unwrap_err();
    match err {
        SyncError::SovereigntyViolation { expected, endpoint } => {
            assert_eq!(expected, lt());
            assert_eq!(endpoint, PartitionId::from("pl"));
        }
        other => panic!("expected sovereignty violation, got {other}"),
    }
    assert_eq!(sync.remote.calls().list, 0);
    assert_eq!(sync.local.live_count(), 0);
    assert_eq!(sync.checkpoints.get(&lt()).unwrap(), None);
}

#[test]
fn mismatch_reported_mid_pass_aborts_without_advancing() {
    let mut remote = MemoryRemote::new("lt");
    remote.fail_upserts_of(
        "r2",
        None,
        RemoteError::PartitionMismatch(PartitionId::from("pl")),
    );
    let mut sync = synchronizer(remote);
    sync.local
        .insert(Record::new("r2", fields(&[("name", json!("Ona"))]), Utc::now()));

    let err = sync.run_sync(&lt()).unwrap_err();
    assert!(matches!(err, SyncError::SovereigntyViolation { .. }));
    assert_eq!(sync.remote.calls().upsert, 1, "mismatch is never retried");
    assert_eq!(sync.checkpoints.get(&lt()).unwrap(), None);
}

#[test]
fn checkpoint_never_moves_backwards() {
    let mut sync = synchronizer(MemoryRemote::new("lt"));
    let first = sync.run_sync(&lt()).expect("first");
    let second = sync.run_sync(&lt()).expect("second");

    let first_at = first.checkpoint_after.expect("set");
    let second_at = second.checkpoint_after.expect("set");
    assert!(second_at >= first_at);
    assert_eq!(second.checkpoint_before, Some(first_at));

    sync.remote.fail_upserts_of("r9", None, RemoteError::Transient("down".into()));
    sync.local
        .insert(Record::new("r9", fields(&[("name", json!("x"))]), Utc::now()));
    let failed = sync.run_sync(&lt()).expect("third");
    assert_eq!(failed.checkpoint_after, Some(second_at));
}

#[test]
fn failed_masking_drops_field_and_reports_name_only() {
    let mut remote = MemoryRemote::new("lt");
    remote.put(Record::new(
        "r4",
        fields(&[
            ("name", json!("Petras")),
            ("birth_date", json!("sometime in spring")),
        ]),
        Utc::now() - Duration::minutes(5),
    ));
    let mut sync = synchronizer(remote);

    let report = sync.run_sync(&lt()).expect("pass");
    assert_eq!(report.created, 1);
    assert_eq!(report.masked_fields_dropped, 1);
    assert_eq!(report.errored, 0);

    let local = sync.local.get(&RemoteId::from("r4")).unwrap().unwrap();
    assert!(!local.fields.contains_key("birth_date"));

    let detail = sync.log.entries()[0].detail.clone().expect("detail");
    assert!(detail.contains("birth_date"));
    assert!(!detail.contains("spring"));
}

/// Serves a fixed batch on every list call.
struct FixedRemote {
    partition: PartitionId,
    records: Vec<Record>,
}

impl RemoteStore for FixedRemote {
    fn partition(&self) -> &PartitionId {
        &self.partition
    }

    fn list(&mut self, _since: DateTime<Utc>) -> Result<Vec<Record>, RemoteError> {
        Ok(self.records.clone())
    }

    fn upsert(&mut self, record: &Record) -> Result<RemoteId, RemoteError> {
        Ok(record.remote_id.clone().unwrap_or_else(|| RemoteId::from("new")))
    }

    fn delete(&mut self, _id: &RemoteId) -> Result<(), RemoteError> {
        Ok(())
    }
}

#[test]
fn pulled_record_without_id_is_skipped() {
    let mut anonymous = jonas(Utc::now() - Duration::minutes(1));
    anonymous.remote_id = None;
    let remote = FixedRemote {
        partition: lt(),
        records: vec![anonymous, jonas(Utc::now() - Duration::minutes(1))],
    };
    let mut sync = Synchronizer::new(
        remote,
        MemoryLocal::new(),
        MemoryCheckpoints::new(),
        MemoryLog::new(),
        RuleSet::new(default_rules()),
    )
    .with_locks(Arc::new(PartitionLocks::new()));

    let report = sync.run_sync(&lt()).expect("pass");
    assert_eq!(report.created, 1);
    assert_eq!(report.errored, 0);
    assert_eq!(sync.local.live_count(), 1);

    let skipped = &sync.log.entries()[0];
    assert_eq!(skipped.outcome, Outcome::Skipped);
    assert_eq!(skipped.remote_id, None);
}

#[test]
fn partition_overrides_apply_on_top_of_defaults() {
    let mut overrides = fieldsync_core::RuleMap::new();
    overrides.insert("name".to_string(), fieldsync_core::MaskRule::Redact);
    let rules = RuleSet::compose(&default_rules(), &overrides);

    let mut remote = MemoryRemote::new("lt");
    remote.put(jonas(Utc::now() - Duration::hours(1)));
    let mut sync = Synchronizer::new(
        remote,
        MemoryLocal::new(),
        MemoryCheckpoints::new(),
        MemoryLog::new(),
        rules,
    )
    .with_retry(RetryPolicy::immediate(1))
    .with_locks(Arc::new(PartitionLocks::new()));

    sync.run_sync(&lt()).expect("pass");
    let local = sync.local.get(&RemoteId::from("r1")).unwrap().unwrap();
    assert_eq!(local.fields["name"], json!(fieldsync_mask::REDACTED));
    assert_eq!(local.fields["religion"], json!("Catholic"));
}
