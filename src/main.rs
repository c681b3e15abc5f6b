//! Application entry point.
//!
//! Parses command-line arguments, merges layered configuration and delegates
//! execution to [`runner::run`].

use simbuild::{cli, runner};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::fmt;

fn main() -> ExitCode {
    let (parsed, matches) = match cli::parse_from(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    };
    let merged = cli::merge_with_config(&parsed, &matches);
    let max_level = match &merged {
        Ok(config) if config.verbose => Level::DEBUG,
        Ok(_) => Level::ERROR,
        Err(_) if parsed.verbose => Level::DEBUG,
        Err(_) => Level::ERROR,
    };
    // Command output owns stdout.
    fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();

    let config = match merged {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring configuration layers");
            parsed
        }
    }
    .with_default_command();

    match runner::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "runner failed");
            ExitCode::FAILURE
        }
    }
}
