pub mod config;
pub mod doctor;

use clap::{Parser, Subcommand};

/// CaseWire — a conversational assistant and tabular-backend automation
/// gateway.
#[derive(Debug, Parser)]
#[command(name = "casewire", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
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
    /// Validate the environment-derived configuration and report issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Build the configuration from the process environment. CaseWire has no
/// config file — every setting is an env var, defaulted in
/// [`cw_domain::config::Config::default`] and overridden by
/// [`cw_domain::config::Config::from_env`].
pub fn load_config() -> cw_domain::config::Config {
    cw_domain::config::Config::from_env()
}
