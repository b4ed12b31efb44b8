//! todoctl CLI - users and tasks behind a pooled, cached record store
//!
//! This is the entry point for the todoctl command-line tool, which provides:
//! - The HTTP server (`serve`), on PostgreSQL or fully in memory
//! - Schema bootstrap (`init-db`)
//! - One-shot user and task operations (`user`, `task`)
//! - Effective configuration display (`config`)

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use todoctl_core::TodoConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(
    name = "todoctl",
    author,
    version,
    about = "User and task service with a resizable write pool and cache-aside reads",
    long_about = "Run the todoctl HTTP server or operate on users and tasks directly. \
                  Writes go through a bounded worker pool; reads are served from a TTL cache \
                  that is invalidated after every committed write."
)]
struct Cli {
    /// Config file (default: ~/.todoctl/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve(commands::serve::ServeArgs),
    /// Create the users and tasks tables if they do not exist
    InitDb,
    /// Create, inspect, rename and delete users
    User(commands::user::UserArgs),
    /// Create, inspect, update and delete tasks
    Task(commands::task::TaskArgs),
    /// Show the effective configuration
    Config(config::ConfigArgs),
}

fn init_tracing(debug: bool) -> Result<()> {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(debug)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}

fn load_config(path: Option<&PathBuf>) -> Result<TodoConfig> {
    match path {
        Some(path) => TodoConfig::load_from(path),
        None => TodoConfig::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug).ok();
    todoctl_core::config::load_dotenv();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args, config).await?,
        Commands::InitDb => commands::run_init_db(&config).await?,
        Commands::User(args) => commands::run_user(args, &config).await?,
        Commands::Task(args) => commands::run_task(args, &config).await?,
        Commands::Config(args) => config::run_config(args, &config, cli.config.as_deref())?,
    }
    Ok(())
}
