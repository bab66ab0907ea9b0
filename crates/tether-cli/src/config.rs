//! Configuration loading helpers for the CLI.
//!
//! Leading configuration flags are split off and handed to `ortho_config`;
//! everything from the first other token on is parsed as the command.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use tether_config::Config;

use crate::errors::AppError;

/// Flags accepted before the subcommand and forwarded to the loader.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--cwd",
    "--plugins-path",
    "--registry-url",
    "--registry-token",
    "--git-api-url",
    "--git-token",
    "--install-mode",
    "--lock-wait-ms",
    "--lock-stale-ms",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the split-off configuration arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments split between the configuration loader and the command
/// parser. Both keep the program name as their first element.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    pub(crate) config: Vec<OsString>,
    pub(crate) command: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };
    let mut config = vec![program.clone()];
    let mut remaining = rest.iter();
    let mut command = vec![program.clone()];
    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config.push(argument.clone());
                if needs_value && let Some(value) = remaining.next() {
                    config.push(value.clone());
                }
            }
            FlagAction::Stop => {
                command.push(argument.clone());
                command.extend(remaining.cloned());
                break;
            }
        }
    }
    ArgumentSplit { config, command }
}
