//! Sandbox templates: the environment and global bindings a script sees.

use std::collections::{BTreeMap, BTreeSet};

use rhai::{Dynamic, Map};

/// Which host environment variables are visible to scripts as `env`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentPolicy {
    /// Scripts see only the template's overlay variables.
    Isolated,
    /// Only the named host variables are visible.
    AllowList(BTreeSet<String>),
    /// The full host environment is visible.
    #[default]
    InheritAll,
}

impl EnvironmentPolicy {
    fn with_allowed(self, key: String) -> Self {
        match self {
            Self::Isolated => Self::AllowList(BTreeSet::from([key])),
            Self::AllowList(mut keys) => {
                let _ = keys.insert(key);
                Self::AllowList(keys)
            }
            Self::InheritAll => Self::InheritAll,
        }
    }

    /// Returns true when the host variable `key` may be exposed.
    #[must_use]
    pub fn permits(&self, key: &str) -> bool {
        match self {
            Self::Isolated => false,
            Self::AllowList(keys) => keys.contains(key),
            Self::InheritAll => true,
        }
    }
}

/// Describes the execution context every plugin script is created from.
///
/// The default template inherits the host environment and registers no
/// globals. Overlay variables always win over host values.
#[derive(Debug, Clone, Default)]
pub struct SandboxTemplate {
    environment: EnvironmentPolicy,
    overlay: BTreeMap<String, String>,
    globals: BTreeMap<String, Dynamic>,
}

impl SandboxTemplate {
    /// Creates a template that inherits the host environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a template that hides the host environment entirely.
    ///
    /// ```
    /// use tether_sandbox::{EnvironmentPolicy, SandboxTemplate};
    ///
    /// let template = SandboxTemplate::isolated().allow_environment_variable("HOME");
    /// assert!(template.environment_policy().permits("HOME"));
    /// assert!(!template.environment_policy().permits("PATH"));
    /// ```
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            environment: EnvironmentPolicy::Isolated,
            ..Self::default()
        }
    }

    /// Exposes one host environment variable.
    ///
    /// A no-op when the policy already inherits everything.
    #[must_use]
    pub fn allow_environment_variable(mut self, key: impl Into<String>) -> Self {
        self.environment = self.environment.clone().with_allowed(key.into());
        self
    }

    /// Exposes the full host environment.
    #[must_use]
    pub fn inherit_environment(mut self) -> Self {
        self.environment = EnvironmentPolicy::InheritAll;
        self
    }

    /// Sets a variable in the `env` overlay.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overlay.insert(key.into(), value.into());
        self
    }

    /// Registers a global binding.
    #[must_use]
    pub fn with_global<T>(self, name: impl Into<String>, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.with_global_dynamic(name, Dynamic::from(value))
    }

    /// Registers a global binding from an existing [`Dynamic`].
    #[must_use]
    pub fn with_global_dynamic(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Returns the configured environment policy.
    #[must_use]
    pub fn environment_policy(&self) -> &EnvironmentPolicy {
        &self.environment
    }

    /// Returns the overlay variables.
    #[must_use]
    pub fn overlay(&self) -> &BTreeMap<String, String> {
        &self.overlay
    }

    /// Returns the registered globals.
    #[must_use]
    pub fn globals(&self) -> &BTreeMap<String, Dynamic> {
        &self.globals
    }

    /// Computes the environment visible to scripts.
    ///
    /// Host variables whose name or value is not valid UTF-8 are skipped.
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut vars: BTreeMap<String, String> = match &self.environment {
            EnvironmentPolicy::Isolated => BTreeMap::new(),
            policy => std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .filter(|(key, _)| policy.permits(key))
                .collect(),
        };
        vars.extend(self.overlay.clone());
        vars
    }

    pub(crate) fn environment_map(&self) -> Map {
        self.environment()
            .into_iter()
            .map(|(key, value)| (key.into(), Dynamic::from(value)))
            .collect()
    }
}
