use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rotor")]
#[command(about = "Credential Rotor: keeps a transfer running by rotating credentials")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Rotation state file (overrides `state_path`)
    #[arg(long, global = true)]
    pub state_path: Option<PathBuf>,

    /// Supervisor lock file (overrides `lock_path`)
    #[arg(long, global = true)]
    pub lock_path: Option<PathBuf>,

    /// Output format for read-only commands (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Supervise the transfer, rotating credentials until a fatal error
    Run {
        /// Directory containing credential JSON files
        #[arg(long)]
        credentials_dir: Option<PathBuf>,

        /// Transfer source path or remote
        #[arg(long)]
        source: Option<String>,

        /// Transfer destination path or remote
        #[arg(long)]
        destination: Option<String>,
    },

    /// Show the credential pool and persisted rotation state
    Status,

    /// Show configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
}
