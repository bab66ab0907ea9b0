//! Command-line runtime for the Tether plugin manager.
//!
//! [`run`] splits leading configuration flags from the command, loads
//! layered configuration, initialises telemetry, builds a
//! [`tether_plugins::PluginManager`] over the configured plugins directory,
//! registers what is already installed there, and executes one command.
//! IO streams are parameters so tests can capture output.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tether_plugins::{ManagerOptions, PluginManager};

mod cli;
mod commands;
mod config;
mod errors;
pub mod telemetry;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_arguments};
use errors::AppError;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_arguments(&args);
    let cli = match Cli::try_parse_from(split.command) {
        Ok(cli) => cli,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            let _ = write!(stderr, "{}", AppError::CliUsage(error));
            return ExitCode::FAILURE;
        }
    };

    match execute(cli, &split.config, loader, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute<W, L>(
    cli: Cli,
    config_arguments: &[OsString],
    loader: &L,
    stdout: &mut W,
) -> Result<(), AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let config = loader.load(config_arguments)?;
    telemetry::initialise(&config)?;
    let options = ManagerOptions::from_config(&config)?;
    let manager = PluginManager::new(options)?;
    manager.discover_installed()?;
    commands::dispatch(&manager, cli.command, stdout)
}

#[cfg(test)]
mod tests;
