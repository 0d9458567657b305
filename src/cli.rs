//! CLI argument definitions using clap with subcommand architecture

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Supervisor daemon for copilot-api
#[derive(Parser, Debug)]
#[command(name = "copilot-daemon")]
#[command(about = "Keeps copilot-api running on a fixed port and restarts it when it exits")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "FILE", env = "COPILOT_DAEMON_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands for copilot-daemon
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor in the foreground
    Start,

    /// Show daemon and copilot-api status
    Status,

    /// Ask the running daemon to shut down
    Stop,

    /// Stream daemon and copilot-api output
    Logs,

    /// Print the daemon version
    Version,

    /// Manage copilot-daemon configuration
    Config(ConfigArgs),
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config operation: show, init
    #[command(subcommand)]
    pub operation: ConfigOperation,
}

/// Config subcommand operations
#[derive(Subcommand, Debug)]
pub enum ConfigOperation {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
