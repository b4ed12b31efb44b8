//! One-shot user commands

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use todoctl_core::model::{UserPatch, Username};
use todoctl_core::{Services, TodoConfig};

#[derive(Parser, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommands,
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create a user and print its id
    Add {
        /// Unique, non-empty username (max 64 characters)
        username: String,
    },
    /// Show one user
    Get { id: i64 },
    /// List all users
    List,
    /// Change a user's name
    Rename { id: i64, username: String },
    /// Delete a user (fails while the user owns tasks)
    Rm { id: i64 },
}

pub async fn run_user(args: UserArgs, config: &TodoConfig) -> Result<()> {
    // validate before touching the database
    let command = args.command;
    if let UserCommands::Add { username } | UserCommands::Rename { username, .. } = &command {
        Username::new(username)?;
    }

    let store = super::connect(config).await?;
    let services = super::build_services(Arc::new(store), config);
    let result = execute(&services, command).await;
    services.pool().close().await;
    result
}

async fn execute(services: &Services, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add { username } => {
            let id = services.users.create_user(Username::new(&username)?).await?;
            super::print_json(&json!({ "id": id }))
        }
        UserCommands::Get { id } => super::print_json(&services.users.get_user(id).await?),
        UserCommands::List => super::print_json(&services.users.list_users().await?),
        UserCommands::Rename { id, username } => {
            let patch = UserPatch {
                username: Some(Username::new(&username)?),
            };
            super::print_json(&services.users.update_user(id, patch).await?)
        }
        UserCommands::Rm { id } => {
            services.users.delete_user(id).await?;
            super::print_json(&json!({ "deleted": id }))
        }
    }
}
