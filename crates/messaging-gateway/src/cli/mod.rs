pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// A multi-channel messaging runtime — inbound routing, outbound
/// dispatch, dead-letter replay, all behind one HTTP surface.
#[derive(Debug, Parser)]
#[command(name = "messaging-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP surface (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load configuration from the path named by `MESSAGING_CONFIG` (or
/// `config.toml` by default). Missing file falls back to all-defaults,
/// matching the teacher's `load_config` helper.
pub fn load_config() -> anyhow::Result<(messaging_domain::config::RuntimeConfig, String)> {
    let config_path = std::env::var("MESSAGING_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        messaging_domain::config::RuntimeConfig::default()
    };

    Ok((config, config_path))
}
