//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// ript-relay - RIPT call-signaling relay
#[derive(Debug, Parser)]
#[command(name = "ript-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "RIPT_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, env = "RIPT_RELAY_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    // --- Listener flags ---
    /// Address to bind listeners on
    #[arg(long, env = "RIPT_RELAY_HOST")]
    pub host: Option<String>,

    /// TCP port for length-prefixed frames
    #[arg(long, env = "RIPT_RELAY_TCP_PORT")]
    pub tcp_port: Option<u16>,

    /// WebSocket port
    #[arg(long, env = "RIPT_RELAY_WS_PORT")]
    pub ws_port: Option<u16>,

    /// Do not start the TCP listener
    #[arg(long)]
    pub no_tcp: bool,

    /// Do not start the WebSocket listener
    #[arg(long)]
    pub no_websocket: bool,

    /// Maximum concurrent connections per listener
    #[arg(long)]
    pub max_connections: Option<usize>,

    // --- Router flags ---
    /// Router name used in logs
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum cached content entries per destination
    #[arg(long)]
    pub cache_limit: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay in the foreground (default)
    Serve,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration as TOML
    Dump,

    /// Validate the effective configuration
    Validate,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for ript_core::TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listener_overrides() {
        let cli = Cli::try_parse_from([
            "ript-relay",
            "--tcp-port",
            "7000",
            "--no-websocket",
            "--log-format",
            "json",
            "serve",
        ])
        .unwrap();

        assert_eq!(cli.tcp_port, Some(7000));
        assert!(cli.no_websocket);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::try_parse_from(["ript-relay", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Validate
            })
        ));
    }
}
