//! `fieldsync status`: checkpoint and local store visibility per partition.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use fieldsync_core::{registry, PartitionConfig};
use fieldsync_sync::{checkpoint, FileLocal};

/// Arguments for `fieldsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = registry::home().context("could not determine home directory")?;
        let partitions = registry::list_partitions_at(&home)
            .context("failed to load partitions; run `fieldsync init` first")?;

        let rows = partitions
            .iter()
            .map(|p| partition_status(&home, p))
            .collect::<Result<Vec<_>>>()?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(rows);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PartitionStatus {
    partition: String,
    endpoint: String,
    checkpoint: Option<DateTime<Utc>>,
    checkpoint_age: String,
    records: usize,
    tombstones: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "partition")]
    partition: String,
    #[tabled(rename = "endpoint")]
    endpoint: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "records")]
    records: usize,
    #[tabled(rename = "erased")]
    tombstones: usize,
}

fn partition_status(home: &Path, config: &PartitionConfig) -> Result<PartitionStatus> {
    let synced_at = checkpoint::load_at(home, &config.id)
        .with_context(|| format!("failed to read checkpoint for '{}'", config.id))?
        .map(|c| c.synced_at);
    let local = FileLocal::open_at(home, &config.id)
        .with_context(|| format!("failed to read local records for '{}'", config.id))?;

    Ok(PartitionStatus {
        partition: config.id.to_string(),
        endpoint: config.endpoint.clone(),
        checkpoint_age: synced_at
            .map(format_datetime_age)
            .unwrap_or_else(|| "never".to_string()),
        checkpoint: synced_at,
        records: local.state().live_count(),
        tombstones: local.state().tombstone_count(),
    })
}

fn print_table(rows: Vec<PartitionStatus>) {
    println!(
        "fieldsync v{} | {} partitions",
        env!("CARGO_PKG_VERSION"),
        rows.len()
    );
    if rows.is_empty() {
        println!("No partitions registered.");
        return;
    }

    let never_synced = rows.iter().filter(|r| r.checkpoint.is_none()).count();
    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            last_sync: if row.checkpoint.is_some() {
                format!("{} ago", row.checkpoint_age).green().to_string()
            } else {
                row.checkpoint_age.bright_black().to_string()
            },
            partition: row.partition,
            endpoint: row.endpoint,
            records: row.records,
            tombstones: row.tombstones,
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if never_synced > 0 {
        println!("Run 'fieldsync sync --all' to sync partitions that were never synced.");
    }
}

fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
