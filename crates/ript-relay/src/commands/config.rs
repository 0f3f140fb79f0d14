//! Configuration commands.

use crate::config::FileConfig;
use crate::error::{RelayError, RelayResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &FileConfig) -> RelayResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| RelayError::Config(format!("failed to serialize config: {}", e)))?;
    println!("{}", toml_str);
    Ok(())
}

/// Validate the effective configuration.
pub fn validate(config: &FileConfig) -> RelayResult<()> {
    config.validate()?;
    println!(
        "Configuration is valid ({} trunk group(s)).",
        config.relay.trunk_groups.len()
    );
    Ok(())
}
