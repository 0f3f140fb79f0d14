//! Relay configuration file.
//!
//! A single TOML file with three tables:
//!
//! ```toml
//! [relay]
//! name = "ript-relay"
//! cache_limit = 64
//!
//! [[relay.trunk_groups]]
//! id = "trunkAbc"
//! direction = "outbound"
//! media_cap = "1 out: opus;\n2 out: opus;\n"
//!
//! [listen]
//! host = "0.0.0.0"
//! tcp_port = 2399
//! ws_port = 8080
//!
//! [log]
//! level = "info"
//! format = "compact"
//! ```
//!
//! Every table and key is optional. Command-line flags override the file.

use std::path::Path;

use ript_core::TracingConfig;
use ript_server::{ListenerConfig, RelayConfig};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::cli::{Cli, LogFormat};
use crate::error::{RelayError, RelayResult};

/// Everything the relay binary reads from its configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Router, cache and trunk-group settings.
    pub relay: RelayConfig,

    /// Listener settings.
    pub listen: ListenSettings,

    /// Logging settings.
    pub log: LogSettings,
}

/// Where the relay accepts connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    pub host: String,
    pub tcp: bool,
    pub tcp_port: u16,
    pub websocket: bool,
    pub ws_port: u16,
    pub max_connections: usize,
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            tcp: true,
            tcp_port: 2399,
            websocket: true,
            ws_port: 8080,
            max_connections: 100,
        }
    }
}

impl ListenSettings {
    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Level for the relay's own crates when RUST_LOG is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl FileConfig {
    /// Loads the file at `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> RelayResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> RelayResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("failed to parse config: {}", e)))
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.listen.host = host.clone();
        }
        if let Some(port) = cli.tcp_port {
            self.listen.tcp_port = port;
        }
        if let Some(port) = cli.ws_port {
            self.listen.ws_port = port;
        }
        if cli.no_tcp {
            self.listen.tcp = false;
        }
        if cli.no_websocket {
            self.listen.websocket = false;
        }
        if let Some(max) = cli.max_connections {
            self.listen.max_connections = max;
        }
        if let Some(name) = &cli.name {
            self.relay.name = name.clone();
        }
        if let Some(limit) = cli.cache_limit {
            self.relay.cache_limit = Some(limit);
        }
        if cli.debug {
            self.log.level = "debug".to_string();
        }
        if let Some(format) = cli.log_format {
            self.log.format = format;
        }
    }

    /// Checks the relay settings and that at least one listener is enabled.
    pub fn validate(&self) -> RelayResult<()> {
        self.relay.validate()?;
        if !self.listen.tcp && !self.listen.websocket {
            return Err(RelayError::Config("no listener enabled".to_string()));
        }
        if self.listen.max_connections == 0 {
            return Err(RelayError::Config(
                "max_connections must be > 0".to_string(),
            ));
        }
        self.level()?;
        Ok(())
    }

    pub fn listener_config(&self) -> ListenerConfig {
        self.relay
            .listener_config()
            .with_max_connections(self.listen.max_connections)
    }

    fn level(&self) -> RelayResult<Level> {
        self.log
            .level
            .parse()
            .map_err(|_| RelayError::Config(format!("invalid log level: {}", self.log.level)))
    }

    pub fn tracing_config(&self) -> RelayResult<TracingConfig> {
        let level = self.level()?;
        let base = if level >= Level::DEBUG {
            TracingConfig::debug()
        } else {
            TracingConfig::relay()
        };
        Ok(base.with_level(level).with_format(self.log.format.into()))
    }
}
