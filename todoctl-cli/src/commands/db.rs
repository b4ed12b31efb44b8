//! Schema bootstrap

use anyhow::{Context, Result};
use todoctl_core::TodoConfig;

/// Create the `users` and `tasks` tables if missing.
pub async fn run_init_db(config: &TodoConfig) -> Result<()> {
    let store = super::connect(config).await?;
    store
        .ensure_schema()
        .await
        .context("Failed to create schema")?;
    println!("Schema ready");
    Ok(())
}
