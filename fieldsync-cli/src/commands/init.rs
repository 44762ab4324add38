//! `fieldsync init`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use fieldsync_core::registry;

/// Initialize the fieldsync home.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = registry::home().context("could not determine home directory")?;
        let settings = registry::init_at(&home).context("failed to initialize ~/.fieldsync")?;

        println!(
            "✓ Initialized {}",
            registry::settings_path_at(&home).display()
        );
        println!(
            "  retry: {} attempts, {} ms base delay",
            settings.retry.max_attempts, settings.retry.base_delay_ms
        );
        println!("  default rules:");
        for (field, rule) in &settings.default_rules {
            println!("    {field}: {rule}");
        }
        Ok(())
    }
}
