//! Construction-time options for a [`crate::PluginManager`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tether_config::{
    Config, DEFAULT_GIT_API_URL, DEFAULT_PLUGINS_DIRECTORY, DEFAULT_REGISTRY_URL,
    InstallModeSetting,
};
use tether_sandbox::rhai::Dynamic;
use tether_sandbox::{ExecutionLimits, SandboxTemplate};

use crate::error::PluginError;
use crate::lock::LockSettings;
use crate::registry::{RegistryAuth, RegistryConfig};

/// Whether a previously downloaded package may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Reuse an on-disk package whose version satisfies an exact request
    /// without contacting the registry.
    #[default]
    UseCache,
    /// Always query and download.
    NoCache,
}

impl From<InstallModeSetting> for InstallMode {
    fn from(setting: InstallModeSetting) -> Self {
        match setting {
            InstallModeSetting::UseCache => Self::UseCache,
            InstallModeSetting::NoCache => Self::NoCache,
        }
    }
}

/// A dependency name the host provides itself.
#[derive(Debug, Clone)]
pub enum DependencyPattern {
    /// Matches one name exactly.
    Exact(String),
    /// Matches names the expression finds a match in.
    Pattern(Regex),
}

impl DependencyPattern {
    /// Parses `/expr/` as a regular expression and anything else as an
    /// exact name.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Configuration`] for an invalid expression.
    ///
    /// ```
    /// use tether_plugins::DependencyPattern;
    ///
    /// let pattern = DependencyPattern::parse("/^@types\\//").expect("valid pattern");
    /// assert!(pattern.matches("@types/node"));
    /// assert!(!pattern.matches("node"));
    /// ```
    pub fn parse(input: &str) -> Result<Self, PluginError> {
        match input
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Some(expression) if !expression.is_empty() => Regex::new(expression)
                .map(Self::Pattern)
                .map_err(|error| PluginError::Configuration {
                    message: format!("ignored dependency pattern '{input}': {error}"),
                }),
            _ => Ok(Self::Exact(input.to_owned())),
        }
    }

    /// Returns true when `name` is covered by this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Pattern(regex) => regex.is_match(name),
        }
    }
}

/// Options a [`crate::PluginManager`] is constructed with.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Directory relative paths are resolved against.
    pub cwd: PathBuf,
    /// Directory holding installed packages.
    pub plugins_path: PathBuf,
    /// Template used for plugins without a dedicated one.
    pub sandbox: SandboxTemplate,
    /// Engine limits applied to every plugin script.
    pub execution_limits: ExecutionLimits,
    /// Content registry base URL.
    pub registry_url: String,
    /// Content registry transport settings.
    pub registry_config: RegistryConfig,
    /// Whether exact versions already on disk may be reused.
    pub install_mode: InstallMode,
    /// Whether [`Self::host_modules`] may satisfy `require` calls and
    /// dependencies.
    pub require_core_modules: bool,
    /// Modules the host process offers to plugins.
    pub host_modules: BTreeMap<String, Dynamic>,
    /// Dependencies never installed because the host provides them.
    pub ignored_dependencies: Vec<DependencyPattern>,
    /// Pre-bound modules injected without installation.
    pub static_dependencies: BTreeMap<String, Dynamic>,
    /// Git hosting API base URL.
    pub git_api_url: String,
    /// Git hosting transport settings.
    pub git_config: RegistryConfig,
    /// Lock wait, stale, and poll timings.
    pub lock: LockSettings,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(cwd)
    }
}

impl ManagerOptions {
    /// Creates options rooted at `cwd`, installing into
    /// `{cwd}/plugin_packages`.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            plugins_path: cwd.join(DEFAULT_PLUGINS_DIRECTORY),
            cwd,
            sandbox: SandboxTemplate::default(),
            execution_limits: ExecutionLimits::default(),
            registry_url: DEFAULT_REGISTRY_URL.to_owned(),
            registry_config: RegistryConfig::default(),
            install_mode: InstallMode::default(),
            require_core_modules: true,
            host_modules: BTreeMap::new(),
            ignored_dependencies: default_ignored_dependencies(),
            static_dependencies: BTreeMap::new(),
            git_api_url: DEFAULT_GIT_API_URL.to_owned(),
            git_config: RegistryConfig::default(),
            lock: LockSettings::default(),
        }
    }

    /// Builds options from layered configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Configuration`] when the configuration fails
    /// validation or an ignored-dependency pattern is invalid.
    pub fn from_config(config: &Config) -> Result<Self, PluginError> {
        config
            .validate()
            .map_err(|error| PluginError::Configuration {
                message: error.to_string(),
            })?;
        let mut options = match config.cwd() {
            Some(cwd) => Self::new(cwd.as_std_path()),
            None => Self::default(),
        };
        if let Some(path) = config.plugins_path() {
            options.plugins_path = options.resolve(path.as_std_path());
        }
        options.registry_url = config.registry_url().to_owned();
        if let Some(token) = config.registry_token() {
            options.registry_config.auth = Some(RegistryAuth::Token(token.to_owned()));
        }
        options.git_api_url = config.git_api_url().to_owned();
        if let Some(token) = config.git_token() {
            options.git_config.auth = Some(RegistryAuth::Token(token.to_owned()));
        }
        options.install_mode = config.install_mode().into();
        options.require_core_modules = config.require_core_modules();
        for entry in config.ignored_dependencies() {
            options
                .ignored_dependencies
                .push(DependencyPattern::parse(entry)?);
        }
        options.lock.wait = Duration::from_millis(config.lock_wait_ms());
        options.lock.stale = Duration::from_millis(config.lock_stale_ms());
        Ok(options)
    }

    /// Sets the plugins directory, resolved against `cwd` when relative.
    #[must_use]
    pub fn with_plugins_path(mut self, path: impl AsRef<Path>) -> Self {
        self.plugins_path = self.resolve(path.as_ref());
        self
    }

    /// Sets the content registry base URL.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Sets the git hosting API base URL.
    #[must_use]
    pub fn with_git_api_url(mut self, url: impl Into<String>) -> Self {
        self.git_api_url = url.into();
        self
    }

    /// Sets the install cache mode.
    #[must_use]
    pub fn with_install_mode(mut self, mode: InstallMode) -> Self {
        self.install_mode = mode;
        self
    }

    /// Sets the default sandbox template.
    #[must_use]
    pub fn with_sandbox(mut self, template: SandboxTemplate) -> Self {
        self.sandbox = template;
        self
    }

    /// Sets the lock timings.
    #[must_use]
    pub fn with_lock_settings(mut self, lock: LockSettings) -> Self {
        self.lock = lock;
        self
    }

    /// Offers a host module to plugins.
    #[must_use]
    pub fn with_host_module(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.host_modules.insert(name.into(), value);
        self
    }

    /// Injects a pre-bound dependency.
    #[must_use]
    pub fn with_static_dependency(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.static_dependencies.insert(name.into(), value);
        self
    }

    /// Adds a dependency the host provides itself.
    #[must_use]
    pub fn ignore_dependency(mut self, pattern: DependencyPattern) -> Self {
        self.ignored_dependencies.push(pattern);
        self
    }

    /// Enables or disables host modules.
    #[must_use]
    pub fn with_core_modules(mut self, enabled: bool) -> Self {
        self.require_core_modules = enabled;
        self
    }

    /// Returns true when `name` matches an ignored-dependency pattern.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_dependencies
            .iter()
            .any(|pattern| pattern.matches(name))
    }

    /// Returns true when the host offers `name` and host modules are on.
    #[must_use]
    pub fn is_host_module(&self, name: &str) -> bool {
        self.require_core_modules && self.host_modules.contains_key(name)
    }

    /// Resolves `path` against `cwd`, expanding a leading `~/`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~")
            && let Some(home) = std::env::var_os("HOME")
        {
            return PathBuf::from(home).join(rest);
        }
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

fn default_ignored_dependencies() -> Vec<DependencyPattern> {
    Regex::new("^@types/")
        .into_iter()
        .map(DependencyPattern::Pattern)
        .collect()
}

#[cfg(test)]
mod tests;
