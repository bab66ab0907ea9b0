//! Registry clients that resolve and download plugin packages.
//!
//! A [`Registry`] answers two questions: which concrete package a name and
//! [`VersionRef`] resolve to, and how to materialise that package on disk.
//! [`ContentRegistry`] speaks the npm-style JSON document API;
//! [`GitRegistry`] reads descriptors and snapshots through a GitHub-style
//! REST API. Both download gzip tarballs and unpack them with the
//! [`archive`] helpers.

pub mod archive;
mod content;
mod git;
mod http;

use std::path::Path;

use crate::error::PluginError;
use crate::package::PackageInfo;
use crate::version::VersionRef;

pub use self::content::ContentRegistry;
pub use self::git::GitRegistry;
pub use self::http::{RegistryAuth, RegistryConfig};

const REGISTRY_TARGET: &str = "tether_plugins::registry";

/// A backend that resolves package references and downloads packages.
///
/// The manager holds one content registry and one git registry behind this
/// trait so tests can substitute in-memory doubles.
pub trait Registry: Send + Sync {
    /// Resolves `name` at `version` to concrete package metadata.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PackageNotFound`] when the backend does not
    /// know the package, [`PluginError::NoMatchingVersion`] when nothing
    /// satisfies the reference, and [`PluginError::Registry`] for transport
    /// failures.
    fn query_package(&self, name: &str, version: &VersionRef) -> Result<PackageInfo, PluginError>;

    /// Writes the package contents into `destination`.
    ///
    /// The destination directory may not exist yet. The archive's top-level
    /// directory is stripped so the package root lands at `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] when the download fails and
    /// [`PluginError::Archive`] when the archive cannot be unpacked safely.
    fn fetch_package(&self, package: &PackageInfo, destination: &Path) -> Result<(), PluginError>;
}
