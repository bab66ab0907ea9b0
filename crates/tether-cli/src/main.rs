//! CLI entrypoint for the Tether plugin manager.
//!
//! The binary delegates to [`tether_cli::run`], which loads configuration,
//! initialises telemetry, and runs one plugin management command.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    tether_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
