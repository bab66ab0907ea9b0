//! Domain errors raised by plugin management operations.
//!
//! Every public operation fails with exactly one [`PluginError`] variant.
//! Messages name the plugin, version, or location involved. I/O errors are
//! wrapped in `Arc` to satisfy the `result_large_err` Clippy lint and to keep
//! the error cloneable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors arising from plugin management operations.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// A version reference string matched none of the accepted grammars.
    #[error("invalid version specification '{input}': {reason}")]
    InvalidVersionSpec {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A plugin name failed validation.
    #[error("invalid plugin name '{name}': {reason}")]
    InvalidPluginName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The backend does not know the requested package.
    #[error("package '{name}' not found in {registry}")]
    PackageNotFound {
        /// Requested package name.
        name: String,
        /// Human-readable registry description.
        registry: String,
    },

    /// The package exists but no published version satisfies the request.
    #[error("no version of '{name}' matches '{requested}'")]
    NoMatchingVersion {
        /// Requested package name.
        name: String,
        /// The version reference that could not be satisfied.
        requested: String,
    },

    /// The named plugin is not installed.
    #[error("plugin '{name}' is not installed")]
    PluginNotFound {
        /// Plugin name that was looked up.
        name: String,
    },

    /// A plugin asked for a module nobody can provide.
    #[error("cannot find module '{request}' required by '{requester}'")]
    ModuleNotFound {
        /// The argument passed to `require`.
        request: String,
        /// The plugin (or script) that issued the request.
        requester: String,
    },

    /// The plugins directory lock could not be acquired in time.
    #[error("timed out after {}ms waiting for lock {}", .waited.as_millis(), .path.display())]
    LockTimeout {
        /// Lock marker file.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },

    /// Plugin code failed to compile or raised an error while running.
    #[error("plugin '{name}' failed to execute: {message}")]
    SandboxExecution {
        /// Plugin whose code failed.
        name: String,
        /// Diagnostic from the script engine.
        message: String,
    },

    /// Reading or writing the plugins directory failed.
    #[error("filesystem error at {}: {source}", .path.display())]
    Filesystem {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A `package.json` descriptor was missing required fields or malformed.
    #[error("invalid package descriptor at {}: {message}", .path.display())]
    Descriptor {
        /// Location of the descriptor.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Talking to a registry failed below the package level.
    #[error("registry request to {url} failed: {message}")]
    Registry {
        /// URL that was requested.
        url: String,
        /// Transport or status failure description.
        message: String,
    },

    /// A downloaded archive could not be unpacked safely.
    #[error("failed to unpack archive for '{name}': {message}")]
    Archive {
        /// Package whose archive was being unpacked.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// Manager options were inconsistent or could not be parsed.
    #[error("invalid plugin manager configuration: {message}")]
    Configuration {
        /// What was wrong.
        message: String,
    },

    /// One or more plugins could not be removed by `uninstall_all`.
    #[error("failed to uninstall {} plugin(s): {}", .failures.len(), summarise(.failures))]
    UninstallAll {
        /// Per-plugin failures, in table order.
        failures: Vec<(String, PluginError)>,
    },
}

impl PluginError {
    /// Wraps an I/O error with the path being accessed.
    pub(crate) fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source: Arc::new(source),
        }
    }

    /// Returns a closure suitable for `map_err` on I/O results.
    pub(crate) fn at(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::filesystem(path, source)
    }

    /// Builds a [`Self::ModuleNotFound`].
    pub(crate) fn module_not_found(request: &str, requester: &str) -> Self {
        Self::ModuleNotFound {
            request: request.to_owned(),
            requester: requester.to_owned(),
        }
    }

    /// Builds a [`Self::PluginNotFound`].
    pub(crate) fn plugin_not_found(name: &str) -> Self {
        Self::PluginNotFound {
            name: name.to_owned(),
        }
    }
}

fn summarise(failures: &[(String, PluginError)]) -> String {
    failures
        .iter()
        .map(|(name, error)| format!("{name}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}
