//! Configuration commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use strand_runtime::RuntimeConfig;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[clap(long)]
    pub config: Option<PathBuf>,
}

/// Print the effective configuration as JSON
pub fn execute_config(args: &ConfigArgs) -> Result<()> {
    let config = RuntimeConfig::load(args.config.as_deref())?;
    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
