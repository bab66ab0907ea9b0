//! Package descriptors and registry query results.
//!
//! Every installed plugin directory carries a `package.json` holding at
//! least `name` and `version`. Registries answer queries with a
//! [`PackageInfo`], which pairs that metadata with a [`FetchDescriptor`]
//! saying where the package contents come from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::version::GitRef;

/// File name of the on-disk package descriptor.
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Entry script used when a descriptor names none.
pub const DEFAULT_MAIN: &str = "index.rhai";

/// The `package.json` document stored in every plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package name.
    pub name: String,
    /// Package version as written in the file.
    pub version: String,
    /// Entry script relative to the package root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Declared dependencies: name to version reference.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PackageDescriptor {
    /// Reads `package.json` from `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Filesystem`] when the file cannot be read and
    /// [`PluginError::Descriptor`] when it is not a valid descriptor.
    pub fn read(directory: &Path) -> Result<Self, PluginError> {
        let path = directory.join(DESCRIPTOR_FILE);
        let text = fs::read_to_string(&path).map_err(PluginError::at(&path))?;
        Self::from_json(&text, &path)
    }

    /// Parses descriptor JSON; `origin` is only used in error messages.
    pub(crate) fn from_json(text: &str, origin: &Path) -> Result<Self, PluginError> {
        serde_json::from_str(text).map_err(|error| PluginError::Descriptor {
            path: origin.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Writes the descriptor as pretty-printed JSON into `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Filesystem`] when the file cannot be written.
    pub fn write(&self, directory: &Path) -> Result<(), PluginError> {
        let path = directory.join(DESCRIPTOR_FILE);
        let text = serde_json::to_string_pretty(self).map_err(|error| PluginError::Descriptor {
            path: path.clone(),
            message: error.to_string(),
        })?;
        fs::write(&path, text).map_err(PluginError::at(&path))
    }

    /// Parses the `version` field.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Descriptor`] when it is not valid semver.
    pub fn parsed_version(&self, origin: &Path) -> Result<Version, PluginError> {
        Version::parse(&self.version).map_err(|error| PluginError::Descriptor {
            path: origin.to_path_buf(),
            message: format!("version '{}' is not valid semver: {error}", self.version),
        })
    }

    /// Returns the entry script, defaulting to [`DEFAULT_MAIN`].
    #[must_use]
    pub fn main_or_default(&self) -> &str {
        self.main.as_deref().unwrap_or(DEFAULT_MAIN)
    }
}

/// Where a package's contents are obtained from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDescriptor {
    /// A gzip tarball published on a content registry.
    Tarball {
        /// Download URL.
        url: String,
        /// Subresource integrity string published alongside the tarball.
        integrity: Option<String>,
    },
    /// A gzip tarball of a git repository snapshot.
    GitTarball {
        /// Download URL.
        url: String,
        /// The repository reference the snapshot was taken from.
        git: GitRef,
    },
    /// A package directory on the local filesystem.
    Directory(PathBuf),
    /// Inline script source for a single-file package.
    Inline(String),
}

/// Immutable result of a registry query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Package name.
    pub name: String,
    /// Resolved version.
    pub version: Version,
    /// Declared dependencies: name to version reference.
    pub dependencies: BTreeMap<String, String>,
    /// Entry script relative to the package root.
    pub main: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Where the contents come from.
    pub source: FetchDescriptor,
}

impl PackageInfo {
    /// Builds package info from a descriptor read at `origin`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Descriptor`] when the version is not semver.
    pub fn from_descriptor(
        descriptor: PackageDescriptor,
        source: FetchDescriptor,
        origin: &Path,
    ) -> Result<Self, PluginError> {
        let version = descriptor.parsed_version(origin)?;
        let main = descriptor.main_or_default().to_owned();
        check_entry_script(&main, origin)?;
        Ok(Self {
            name: descriptor.name,
            version,
            dependencies: descriptor.dependencies,
            main,
            description: descriptor.description,
            source,
        })
    }

    /// Returns the descriptor to write into the installed directory.
    #[must_use]
    pub fn to_descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            name: self.name.clone(),
            version: self.version.to_string(),
            main: Some(self.main.clone()),
            dependencies: self.dependencies.clone(),
            description: self.description.clone(),
        }
    }
}

/// Rejects entry scripts that are absolute or climb out of the package.
///
/// # Errors
///
/// Returns [`PluginError::Descriptor`] naming `origin` when `main` is not a
/// plain relative path.
pub(crate) fn check_entry_script(main: &str, origin: &Path) -> Result<(), PluginError> {
    let confined = !main.is_empty()
        && Path::new(main)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if confined {
        Ok(())
    } else {
        Err(PluginError::Descriptor {
            path: origin.to_path_buf(),
            message: format!("main '{main}' must be a relative path inside the package"),
        })
    }
}
