use anyhow::Result;
use rotor_config::RotorConfig;

use crate::cli::OutputFormat;

pub(crate) fn handle_config_show(config: &RotorConfig, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => print!("{}", config.to_toml()?),
    }
    Ok(())
}
