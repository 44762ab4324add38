//! `fieldsync sync`: one pass per partition.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use fieldsync_core::{registry, PartitionId};
use fieldsync_sync::{
    pipeline::{self, PartitionOutcome, SyncScope},
    SyncReport,
};

/// Arguments for `fieldsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Partition to sync (omit when using `--all`).
    pub partition: Option<String>,

    /// Sync every registered partition, one after the other.
    #[arg(long, conflicts_with = "partition")]
    pub all: bool,

    /// Emit the pass reports as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct OutcomeJson<'a> {
    partition: &'a PartitionId,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = registry::home().context("could not determine home directory")?;

        let scope = if self.all {
            SyncScope::All
        } else {
            let id = self
                .partition
                .as_deref()
                .context("provide a partition id or use --all")?;
            SyncScope::Partition(PartitionId::parse(id)?)
        };

        let outcomes = pipeline::run(&home, scope).context("sync failed")?;

        if self.json {
            print_json(&outcomes)?;
        } else if outcomes.is_empty() {
            println!("No partitions registered. Run `fieldsync partition add` first.");
        } else {
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            bail!("{failed} of {} partition(s) failed to sync", outcomes.len());
        }
        Ok(())
    }
}

fn print_json(outcomes: &[PartitionOutcome]) -> Result<()> {
    let payload: Vec<OutcomeJson<'_>> = outcomes
        .iter()
        .map(|o| OutcomeJson {
            partition: &o.partition,
            ok: o.is_ok(),
            report: o.result.as_ref().ok(),
            error: o.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize sync reports")?
    );
    Ok(())
}

fn print_outcome(outcome: &PartitionOutcome) {
    let report = match &outcome.result {
        Ok(report) => report,
        Err(err) => {
            println!("{} '{}' failed: {err}", "✗".red().bold(), outcome.partition);
            return;
        }
    };

    let mark = if report.is_clean() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    if !report.has_changes() && report.is_clean() {
        println!("{mark} '{}' nothing to do", report.partition);
    } else {
        println!(
            "{mark} '{}' synced ({} created, {} updated, {} deleted, {} pushed, {} errored)",
            report.partition,
            report.created,
            report.updated,
            report.deleted,
            report.pushed,
            report.errored
        );
    }
    if report.masked_fields_dropped > 0 {
        println!(
            "  {} field(s) dropped after masking failures",
            report.masked_fields_dropped
        );
    }
    if report.erasure_conflicts > 0 {
        println!(
            "  {} erasure conflict(s); remote deletes re-issued",
            report.erasure_conflicts
        );
    }
    for error in &report.errors {
        let id = error
            .remote_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  ✗ {id} {}: {}", error.operation, error.message);
    }
    if !report.checkpoint_advanced && !report.is_clean() {
        println!("  checkpoint held; failed records will be retried next pass");
    }
}
