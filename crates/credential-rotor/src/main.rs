use anyhow::Result;
use clap::Parser;

mod cli;
mod config_cmds;
mod logging;
mod orchestrator;
mod run_cmd;
mod status_cmd;

use cli::{Cli, Commands, ConfigCommands};
use rotor_config::{ConfigOverrides, RotorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = RotorConfig::load(cli.config.as_deref())?;
    let run_overrides = match &cli.command {
        Commands::Run {
            credentials_dir,
            source,
            destination,
        } => ConfigOverrides {
            credentials_dir: credentials_dir.clone(),
            source: source.clone(),
            destination: destination.clone(),
            ..Default::default()
        },
        _ => ConfigOverrides::default(),
    };
    config.apply_overrides(ConfigOverrides {
        log_file: cli.log_file.clone(),
        state_path: cli.state_path.clone(),
        lock_path: cli.lock_path.clone(),
        ..run_overrides
    });

    // Held for the life of the process so the file writer keeps flushing.
    let _log_guard = logging::init_tracing(config.log_file.as_deref())?;

    let result = match cli.command {
        Commands::Run { .. } => run_cmd::handle_run(config).await,
        Commands::Status => status_cmd::handle_status(&config, cli.format),
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => config_cmds::handle_config_show(&config, cli.format),
        },
    };

    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}
