//! `fieldsync partition list` and `fieldsync partition add <id> --endpoint <url>`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use fieldsync_core::{registry, MaskRule, PartitionId, RuleMap};

/// Manage registered partitions.
#[derive(Subcommand, Debug)]
pub enum PartitionCommand {
    /// List registered partitions.
    List,

    /// Register a partition and the endpoint that serves it.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Partition id (e.g. "lt", "pl"). ASCII letters, digits, `-` and `_`.
    pub id: String,

    /// Base URL of the remote record store serving this partition.
    #[arg(long, short = 'e')]
    pub endpoint: String,

    /// Replace this field with "[redacted]" when it crosses the boundary.
    /// Repeatable.
    #[arg(long, value_name = "FIELD")]
    pub redact: Vec<String>,
}

pub fn run(cmd: PartitionCommand) -> Result<()> {
    match cmd {
        PartitionCommand::List => list(),
        PartitionCommand::Add(args) => add(args),
    }
}

fn list() -> Result<()> {
    let partitions = registry::list_partitions()
        .context("failed to load partitions; run `fieldsync init` first")?;

    if partitions.is_empty() {
        println!("No partitions registered.");
        println!("Run: fieldsync partition add <id> --endpoint <url>");
        return Ok(());
    }

    for partition in &partitions {
        println!("{}  {}", partition.id, partition.endpoint);
        for (field, rule) in &partition.rules {
            println!("    {field}: {rule}");
        }
    }
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let id = PartitionId::parse(&args.id)?;
    if !(args.endpoint.starts_with("http://") || args.endpoint.starts_with("https://")) {
        bail!("endpoint must be an http:// or https:// URL, got '{}'", args.endpoint);
    }

    let rules: RuleMap = args
        .redact
        .into_iter()
        .map(|field| (field, MaskRule::Redact))
        .collect();

    let config = registry::add_partition(id.clone(), args.endpoint, rules)
        .with_context(|| format!("failed to add partition '{id}'"))?;

    println!("✓ Registered partition '{}' -> {}", config.id, config.endpoint);
    println!("  Saved to: ~/.fieldsync/partitions/{}.yaml", config.id);
    Ok(())
}
