//! One-shot task commands

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;

use todoctl_core::model::{TaskNote, TaskPatch, TaskTitle};
use todoctl_core::{Services, TodoConfig};

#[derive(Parser, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task for an existing user and print its id
    Add {
        /// Owning user id
        #[arg(long, short = 'u')]
        user: i64,
        /// Task title (max 256 characters)
        title: String,
        /// Free-text note
        #[arg(long, short = 'n', default_value = "")]
        note: String,
    },
    /// Show one task
    Get { id: i64 },
    /// List all tasks
    List,
    /// Change title, note or completion
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Mark done (true) or not done (false)
        #[arg(long)]
        done: Option<bool>,
    },
    /// Delete a task
    Rm { id: i64 },
}

pub async fn run_task(args: TaskArgs, config: &TodoConfig) -> Result<()> {
    let store = super::connect(config).await?;
    let services = super::build_services(Arc::new(store), config);
    let result = execute(&services, args.command).await;
    services.pool().close().await;
    result
}

async fn execute(services: &Services, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::Add { user, title, note } => {
            let title = TaskTitle::new(&title)?;
            let note = TaskNote::new(&note)?;
            let id = services.tasks.create_task(user, title, note).await?;
            super::print_json(&json!({ "id": id }))
        }
        TaskCommands::Get { id } => super::print_json(&services.tasks.get_task(id).await?),
        TaskCommands::List => super::print_json(&services.tasks.list_tasks().await?),
        TaskCommands::Update {
            id,
            title,
            note,
            done,
        } => {
            let patch = TaskPatch {
                title: title.as_deref().map(TaskTitle::new).transpose()?,
                note: note.as_deref().map(TaskNote::new).transpose()?,
                done,
            };
            super::print_json(&services.tasks.update_task(id, patch).await?)
        }
        TaskCommands::Rm { id } => {
            services.tasks.delete_task(id).await?;
            super::print_json(&json!({ "deleted": id }))
        }
    }
}
