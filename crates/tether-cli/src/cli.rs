//! CLI argument definitions for the `tether` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command-line interface for the Tether plugin manager.
///
/// Configuration flags such as `--config-path` or `--registry-url` must
/// come before the subcommand.
#[derive(Parser, Debug)]
#[command(name = "tether", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// The plugin management command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Plugin management commands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Installs a plugin from a registry, git repository, path, or code.
    Install {
        /// Plugin name.
        name: String,
        /// Version, range, `owner/repo#ref`, `file:path`, or `code:source`.
        version: Option<String>,
    },
    /// Installs the package directory at a path.
    InstallPath {
        /// Package directory.
        path: PathBuf,
        /// Reinstall even when a satisfying version is installed.
        #[arg(long)]
        force: bool,
    },
    /// Removes a plugin, or every plugin with `--all`.
    Uninstall(UninstallArgs),
    /// Lists installed plugins.
    List {
        /// Emit JSON instead of one line per plugin.
        #[arg(long)]
        json: bool,
    },
    /// Shows one installed plugin.
    Info {
        /// Plugin name.
        name: String,
        /// Only report the plugin when it satisfies this range.
        range: Option<String>,
    },
    /// Resolves what an install would fetch, without installing.
    Query {
        /// Plugin name.
        name: String,
        /// Version reference to resolve.
        version: Option<String>,
    },
    /// Runs a script that may `require` installed plugins.
    Run(RunArgs),
}

/// Arguments for `tether uninstall`.
#[derive(Args, Debug, Clone)]
pub(crate) struct UninstallArgs {
    /// Plugin name.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub(crate) name: Option<String>,
    /// Remove every installed plugin.
    #[arg(long)]
    pub(crate) all: bool,
}

/// Arguments for `tether run`.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Inline script source.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub(crate) code: Option<String>,
    /// Read the script from a file instead.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: Option<PathBuf>,
}
