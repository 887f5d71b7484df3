//! fountainctl entry point.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use fountain_core::{TracingConfig, init_tracing};

use fountain_cli::cli::{Cli, Command, ConfigAction};
use fountain_cli::commands;
use fountain_cli::config::ClientConfig;
use fountain_cli::error::ClientResult;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Some(format) = cli.log_format {
        tracing_config.output_format = format;
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Decode { hex, json } => commands::frame::decode(&hex, json),
        Command::Encode { seq, message } => commands::frame::encode(&message, seq),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&load_config(config_path)?),
            ConfigAction::Validate => commands::config::validate(&load_config(config_path)?),
            ConfigAction::Path => commands::config::path(config_path),
        },
    }
}

fn load_config(path: Option<&Path>) -> ClientResult<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    }
}
