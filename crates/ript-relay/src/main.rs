//! ript-relay entry point.

use std::process::ExitCode;

use clap::Parser;

use ript_core::init_tracing;
use ript_relay::cli::{Cli, Command, ConfigAction};
use ript_relay::commands;
use ript_relay::config::FileConfig;
use ript_relay::error::RelayResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> RelayResult<()> {
    let mut config = FileConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
        },
        Some(Command::Serve) | None => {
            init_tracing(config.tracing_config()?)?;
            commands::serve::run(&config).await
        }
    }
}
