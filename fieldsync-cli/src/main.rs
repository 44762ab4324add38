//! fieldsync: field-masked record synchronizer CLI.
//!
//! # Usage
//!
//! ```text
//! fieldsync init
//! fieldsync partition add <id> --endpoint <url> [--redact <field>...]
//! fieldsync partition list
//! fieldsync sync <partition> [--json]
//! fieldsync sync --all [--json]
//! fieldsync status [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, partition::PartitionCommand, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "fieldsync",
    version,
    about = "Synchronize records between partitioned remote and local stores, masking sensitive fields",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default settings to ~/.fieldsync/config.yaml.
    Init(InitArgs),

    /// Manage registered partitions.
    Partition {
        #[command(subcommand)]
        command: PartitionCommand,
    },

    /// Run one sync pass for a partition, or for every partition.
    Sync(SyncArgs),

    /// Show checkpoints and local record counts per partition.
    Status(StatusArgs),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Init(_) => "init",
            Commands::Partition { .. } => "partition",
            Commands::Sync(_) => "sync",
            Commands::Status(_) => "status",
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(command = cli.command.name(), "running command");
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Partition { command } => commands::partition::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
