// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "ws-runtime")]
#[command(about = "Start workspace environments on an OpenShift cluster")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start an environment and keep it running until Ctrl-C
    Start {
        /// Environment description (YAML)
        #[arg(short, long)]
        environment: PathBuf,

        /// Workspace id; also the project name unless WS_RUNTIME_PROJECT is set
        #[arg(short, long)]
        workspace: String,

        /// Workspace owner
        #[arg(long, default_value = "developer")]
        owner: String,

        /// Environment name within the workspace
        #[arg(long, default_value = "default")]
        env_name: String,
    },
    /// Remove leftovers of a workspace from its project
    Clean {
        /// Workspace id
        #[arg(short, long)]
        workspace: String,

        /// Delete the project namespace as well
        #[arg(long)]
        remove_project: bool,
    },
}
