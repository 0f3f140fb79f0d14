//! RIPT relay daemon: CLI, configuration file, listener wiring.
//!
//! This crate provides the `ript-relay` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::FileConfig;
pub use error::{RelayError, RelayResult};
