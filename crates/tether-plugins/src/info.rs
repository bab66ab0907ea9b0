//! Descriptors for installed plugins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::loader::PluginModule;

/// One entry of the installed-plugin table.
///
/// `module` is present only while the plugin is loaded. Snapshots returned
/// by [`crate::PluginManager::list`] carry whatever handle was cached at
/// the time of the call.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: String,
    /// Installed version.
    pub version: Version,
    /// Directory the package was installed into.
    pub location: PathBuf,
    /// Entry script, relative to `location`.
    pub main: String,
    /// Declared dependencies: name to version reference.
    pub dependencies: BTreeMap<String, String>,
    /// Free-form description from the package descriptor.
    pub description: Option<String>,
    pub(crate) module: Option<PluginModule>,
}

impl PluginInfo {
    /// Returns the absolute path of the entry script.
    #[must_use]
    pub fn main_file(&self) -> PathBuf {
        self.location.join(&self.main)
    }

    /// Returns the install directory.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Returns the cached module handle, if loaded.
    #[must_use]
    pub fn module(&self) -> Option<&PluginModule> {
        self.module.as_ref()
    }

    /// Returns true while the plugin is loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    pub(crate) fn without_module(mut self) -> Self {
        self.module = None;
        self
    }
}
