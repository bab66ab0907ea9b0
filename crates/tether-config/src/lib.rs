//! Shared configuration for the Tether plugin manager and its CLI.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a TOML
//! file (discovered or passed via `--config-path` / `TETHER_CONFIG_PATH`),
//! then `TETHER_*` environment variables, then command-line flags. Most
//! fields are optional so that defaults stay in one place: the accessor
//! methods on [`Config`] resolve them against the constants in
//! [`defaults`].

pub mod defaults;
mod install_mode;
mod logging;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_GIT_API_URL, DEFAULT_LOCK_STALE_MS, DEFAULT_LOCK_WAIT_MS, DEFAULT_LOG_FILTER,
    DEFAULT_PLUGINS_DIRECTORY, DEFAULT_REGISTRY_URL, default_log_filter, default_log_format,
};
pub use install_mode::{InstallModeParseError, InstallModeSetting};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration for a plugin manager instance.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "TETHER")]
pub struct Config {
    /// Working directory used to resolve relative plugin paths.
    pub cwd: Option<Utf8PathBuf>,
    /// Directory holding installed plugin packages.
    pub plugins_path: Option<Utf8PathBuf>,
    /// Base URL of the content registry.
    pub registry_url: Option<String>,
    /// Bearer token sent to the content registry.
    pub registry_token: Option<String>,
    /// Base URL of the git hosting API.
    pub git_api_url: Option<String>,
    /// Token sent to the git hosting API.
    pub git_token: Option<String>,
    /// Whether previously downloaded exact versions may be reused.
    pub install_mode: Option<InstallModeSetting>,
    /// Whether host-provided modules may satisfy plugin dependencies.
    pub require_core_modules: Option<bool>,
    /// Dependency names (or `/regex/` patterns) the host provides itself.
    #[serde(default)]
    pub ignored_dependencies: Vec<String>,
    /// How long to wait for the plugins directory lock, in milliseconds.
    pub lock_wait_ms: Option<u64>,
    /// Age after which an unreleased lock is considered abandoned.
    pub lock_stale_ms: Option<u64>,
    /// Tracing filter expression.
    pub log_filter: Option<String>,
    /// Tracing output format.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Returns the configured working directory, if any.
    #[must_use]
    pub fn cwd(&self) -> Option<&Utf8Path> {
        self.cwd.as_deref()
    }

    /// Returns the configured plugins directory, if any.
    ///
    /// When absent, callers place plugins under
    /// [`DEFAULT_PLUGINS_DIRECTORY`] inside the working directory.
    #[must_use]
    pub fn plugins_path(&self) -> Option<&Utf8Path> {
        self.plugins_path.as_deref()
    }

    /// Returns the content registry base URL.
    #[must_use]
    pub fn registry_url(&self) -> &str {
        self.registry_url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }

    /// Returns the content registry token, if any.
    #[must_use]
    pub fn registry_token(&self) -> Option<&str> {
        self.registry_token.as_deref()
    }

    /// Returns the git hosting API base URL.
    #[must_use]
    pub fn git_api_url(&self) -> &str {
        self.git_api_url.as_deref().unwrap_or(DEFAULT_GIT_API_URL)
    }

    /// Returns the git hosting token, if any.
    #[must_use]
    pub fn git_token(&self) -> Option<&str> {
        self.git_token.as_deref()
    }

    /// Returns the install cache mode.
    #[must_use]
    pub fn install_mode(&self) -> InstallModeSetting {
        self.install_mode.unwrap_or_default()
    }

    /// Returns whether host modules may satisfy dependencies.
    #[must_use]
    pub fn require_core_modules(&self) -> bool {
        self.require_core_modules.unwrap_or(true)
    }

    /// Returns the raw ignored-dependency entries.
    #[must_use]
    pub fn ignored_dependencies(&self) -> &[String] {
        &self.ignored_dependencies
    }

    /// Returns the lock wait budget in milliseconds.
    #[must_use]
    pub fn lock_wait_ms(&self) -> u64 {
        self.lock_wait_ms.unwrap_or(DEFAULT_LOCK_WAIT_MS)
    }

    /// Returns the stale-lock threshold in milliseconds.
    #[must_use]
    pub fn lock_stale_ms(&self) -> u64 {
        self.lock_stale_ms.unwrap_or(DEFAULT_LOCK_STALE_MS)
    }

    /// Returns the tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the tracing output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Rejects settings that cannot produce a working lock manager.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroLockStale`] when the stale threshold is
    /// zero, since every held lock would then be broken immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_stale_ms() == 0 {
            return Err(ConfigError::ZeroLockStale);
        }
        Ok(())
    }
}

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `lock_stale_ms` was set to zero.
    #[error("lock_stale_ms must be greater than zero")]
    ZeroLockStale,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn default_config_resolves_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.registry_url(), DEFAULT_REGISTRY_URL);
        assert_eq!(config.git_api_url(), DEFAULT_GIT_API_URL);
        assert_eq!(config.lock_wait_ms(), DEFAULT_LOCK_WAIT_MS);
        assert_eq!(config.lock_stale_ms(), DEFAULT_LOCK_STALE_MS);
        assert_eq!(config.install_mode(), InstallModeSetting::UseCache);
        assert!(config.require_core_modules());
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
        assert!(config.plugins_path().is_none());
    }

    #[rstest]
    #[case(Some(0), Err(ConfigError::ZeroLockStale))]
    #[case(Some(1), Ok(()))]
    #[case(None, Ok(()))]
    fn validate_checks_stale_threshold(
        #[case] stale: Option<u64>,
        #[case] expected: Result<(), ConfigError>,
    ) {
        let config = Config {
            lock_stale_ms: stale,
            ..Config::default()
        };
        assert_eq!(config.validate(), expected);
    }
}
