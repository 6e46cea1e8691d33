//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod execution;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit an execution definition (JSON with `sources` and `stages`)
    Submit {
        /// Path to the definition file
        file: PathBuf,

        /// Wait until the execution finishes
        #[arg(short, long)]
        wait: bool,
    },
    /// Show the status of an execution
    Status {
        /// Execution ID
        id: String,
    },
}

/// Routes the command to its handler
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit { file, wait } => execution::submit(config, &file, wait).await,
        Commands::Status { id } => execution::status(config, &id).await,
    }
}
