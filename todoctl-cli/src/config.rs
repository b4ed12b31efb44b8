use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use todoctl_core::TodoConfig;

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML (password masked)
    Show,
    /// Show config file path
    Path,
}

pub fn run_config(args: ConfigArgs, config: &TodoConfig, explicit: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show => run_show(config),
        ConfigCommands::Path => run_path(explicit),
    }
}

fn run_show(config: &TodoConfig) -> Result<()> {
    let mut shown = config.clone();
    shown.database.url = config.database.redacted_url();
    let rendered = toml::to_string_pretty(&shown).context("Failed to render config")?;
    print!("{}", rendered);
    Ok(())
}

fn run_path(explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(TodoConfig::config_path);
    println!("{}", path.display());
    Ok(())
}
