//! The plugin manager facade.
//!
//! Every mutating operation follows the same two-layer shape: the public
//! method acquires the plugins directory lock, runs a lock-held variant
//! that takes `&LockToken` as proof of ownership, and releases the lock on
//! every exit path. Lock-held variants call one another freely (dependency
//! installs recurse through them) and never acquire the lock themselves.
//!
//! Read-only queries (`list`, `get_info`, `already_installed`, `require`)
//! do not take the lock and may observe the table mid-operation.

mod files;
mod install;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use semver::Version;
use tether_sandbox::SandboxTemplate;
use tether_sandbox::rhai::Dynamic;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::graph::{DependencyGraph, UnloadPlan};
use crate::info::PluginInfo;
use crate::loader::{PluginLoader, PluginModule};
use crate::lock::{LockManager, LockToken};
use crate::options::ManagerOptions;
use crate::package::{DEFAULT_MAIN, FetchDescriptor, PackageDescriptor, PackageInfo};
use crate::registry::{ContentRegistry, GitRegistry, Registry};
use crate::table::PluginTable;
use crate::version::{GitRef, VersionRange, VersionRef};

const MANAGER_TARGET: &str = "tether_plugins::manager";

/// How [`PluginManager::already_installed`] compares versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallMatch {
    /// The installed version must satisfy the range.
    #[default]
    Satisfies,
    /// As [`InstallMatch::Satisfies`], and additionally any version at or
    /// above an exact range's pinned version.
    SatisfiesOrGreater,
}

/// Options for [`PluginManager::install_from_path`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallFromPathOptions {
    /// Reinstall even when a satisfying version is already installed.
    pub force: bool,
}

/// Installs, loads, and removes plugins under one plugins directory.
///
/// The manager is `Send + Sync`. Mutating calls serialise on a lock file
/// inside the plugins directory, so several managers (in one process or
/// many) may share a directory.
///
/// ```no_run
/// use tether_plugins::{ManagerOptions, PluginManager};
///
/// let manager = PluginManager::new(ManagerOptions::new("/srv/host"))?;
/// manager.install_from_code("greeting", "exports = \"hello\";", None)?;
/// let module = manager.require("greeting")?;
/// assert_eq!(module.exports().clone().into_string().as_deref(), Ok("hello"));
/// # Ok::<(), tether_plugins::PluginError>(())
/// ```
pub struct PluginManager {
    options: Arc<ManagerOptions>,
    table: Arc<PluginTable>,
    loader: PluginLoader,
    lock: LockManager,
    registry: Box<dyn Registry>,
    git: Box<dyn Registry>,
}

impl PluginManager {
    /// Creates a manager talking to the configured content registry and
    /// git hosting API.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] when an HTTP client cannot be
    /// built.
    pub fn new(options: ManagerOptions) -> Result<Self, PluginError> {
        let registry = ContentRegistry::new(options.registry_url.clone(), &options.registry_config)?;
        let git = GitRegistry::new(options.git_api_url.clone(), &options.git_config)?;
        Ok(Self::with_registries(options, Box::new(registry), Box::new(git)))
    }

    /// Creates a manager over explicit registry backends.
    #[must_use]
    pub fn with_registries(
        options: ManagerOptions,
        registry: Box<dyn Registry>,
        git: Box<dyn Registry>,
    ) -> Self {
        let options = Arc::new(options);
        let table = Arc::new(PluginTable::default());
        let loader = PluginLoader::new(Arc::clone(&table), Arc::clone(&options));
        let lock = LockManager::new(&options.plugins_path, options.lock);
        Self {
            options,
            table,
            loader,
            lock,
            registry,
            git,
        }
    }

    /// Returns the options the manager was built with.
    #[must_use]
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Returns the lock manager guarding the plugins directory.
    #[must_use]
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    fn with_lock<T>(
        &self,
        operation: impl FnOnce(&LockToken) -> Result<T, PluginError>,
    ) -> Result<T, PluginError> {
        let token = self.lock.acquire()?;
        let result = operation(&token);
        match (result, token.release()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), released) => {
                if let Err(release_error) = released {
                    warn!(
                        target: MANAGER_TARGET,
                        error = %release_error,
                        "failed to release plugins lock after error"
                    );
                }
                Err(error)
            }
        }
    }

    /// Installs `name` from the source `version` describes.
    ///
    /// `None` means the latest registry release. Strings are classified by
    /// [`VersionRef::parse`], so `"^1.0.0"`, `"file:./local"` and
    /// `"github:acme/tools#main"` all work.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidVersionSpec`] for unparseable
    /// references, plus any error of the install path selected.
    pub fn install(&self, name: &str, version: Option<&str>) -> Result<PluginInfo, PluginError> {
        let version = version.map(VersionRef::parse).transpose()?.unwrap_or_default();
        self.install_ref(name, version)
    }

    /// Installs `name` from an already classified reference.
    ///
    /// Git references install under the name their descriptor declares.
    ///
    /// # Errors
    ///
    /// See [`Self::install_from_registry`], [`Self::install_from_git`],
    /// [`Self::install_from_path`] and [`Self::install_from_code`].
    pub fn install_ref(&self, name: &str, version: VersionRef) -> Result<PluginInfo, PluginError> {
        self.with_lock(|lock| self.install_ref_held(lock, name, &version))
    }

    /// Installs `name` from the content registry.
    ///
    /// An installed version satisfying `version`, or newer than an exact
    /// `version`, is returned without contacting the registry.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PackageNotFound`] or
    /// [`PluginError::NoMatchingVersion`] when the registry cannot satisfy
    /// the request, and filesystem, archive, or sandbox errors from the
    /// install itself or a dependency install.
    pub fn install_from_registry(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PluginInfo, PluginError> {
        let version = match version {
            Some(version) => registry_ref(VersionRef::parse(version)?)?,
            None => VersionRef::latest(),
        };
        self.with_lock(|lock| self.install_from_registry_held(lock, name, &version))
    }

    /// Installs the package a git repository describes.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PackageNotFound`] when the repository or its
    /// descriptor is missing, plus filesystem and archive errors.
    pub fn install_from_git(&self, git: &GitRef) -> Result<PluginInfo, PluginError> {
        self.with_lock(|lock| self.install_from_git_held(lock, git))
    }

    /// Installs the package directory at `location`.
    ///
    /// Relative locations resolve against the working directory. Unless
    /// `options.force` is set, a satisfying installed version is returned
    /// without copying.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Filesystem`] or [`PluginError::Descriptor`]
    /// when the directory is not a package.
    pub fn install_from_path(
        &self,
        location: impl AsRef<Path>,
        options: InstallFromPathOptions,
    ) -> Result<PluginInfo, PluginError> {
        let location = self.options.resolve(location.as_ref());
        self.with_lock(|lock| self.install_from_path_held(lock, &location, options))
    }

    /// Installs a single-file package holding `code`.
    ///
    /// Without a `version`, the package is always rewritten and recorded
    /// as `0.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidPluginName`] or
    /// [`PluginError::InvalidVersionSpec`] for bad arguments and
    /// [`PluginError::Filesystem`] when the package cannot be written.
    pub fn install_from_code(
        &self,
        name: &str,
        code: &str,
        version: Option<&str>,
    ) -> Result<PluginInfo, PluginError> {
        let version = version.map(parse_exact).transpose()?;
        self.with_lock(|lock| self.install_from_code_held(lock, name, code, version.as_ref()))
    }

    /// Registers packages already present in the plugins directory.
    ///
    /// A new manager starts with an empty table; this picks up whatever an
    /// earlier manager (or another process) installed. Entries already in
    /// the table are kept. Directories whose descriptor is unreadable or
    /// names a different package are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Filesystem`] when the plugins directory
    /// cannot be walked.
    pub fn discover_installed(&self) -> Result<Vec<PluginInfo>, PluginError> {
        self.with_lock(|lock| self.discover_installed_held(lock))
    }

    /// Removes `name`, unloading it and everything depending on it first.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PluginNotFound`] when `name` is not installed
    /// and [`PluginError::Filesystem`] when its directory cannot be removed.
    pub fn uninstall(&self, name: &str) -> Result<(), PluginError> {
        self.with_lock(|lock| self.uninstall_held(lock, name))
    }

    /// Removes every installed plugin, newest first.
    ///
    /// Failures do not stop the sweep; they are collected and reported
    /// together.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UninstallAll`] listing each plugin that could
    /// not be removed.
    pub fn uninstall_all(&self) -> Result<(), PluginError> {
        self.with_lock(|lock| {
            let failures: Vec<(String, PluginError)> = self
                .table
                .names()
                .into_iter()
                .rev()
                .filter_map(|name| match self.uninstall_held(lock, &name) {
                    Ok(()) | Err(PluginError::PluginNotFound { .. }) => None,
                    Err(error) => Some((name, error)),
                })
                .collect();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(PluginError::UninstallAll { failures })
            }
        })
    }

    /// Returns the module for an installed plugin, loading it on demand.
    ///
    /// `name/sub/path.rhai` runs only that file from the plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PluginNotFound`] when the plugin is not
    /// installed and [`PluginError::SandboxExecution`] when its code fails.
    pub fn require(&self, full_name: &str) -> Result<PluginModule, PluginError> {
        self.loader.require(full_name)
    }

    /// Unloads `name` and every plugin depending on it, dependents first.
    ///
    /// Installed files are untouched; the next `require` loads afresh.
    pub fn unload_with_dependents(&self, name: &str) -> UnloadPlan {
        let graph = DependencyGraph::from_plugins(&self.table.snapshot());
        let plan = graph.unload_order(name);
        for plugin in &plan.order {
            self.loader.unload(plugin);
        }
        plan
    }

    /// Returns a snapshot of installed plugins in install order.
    #[must_use]
    pub fn list(&self) -> Vec<PluginInfo> {
        self.table.snapshot()
    }

    /// Returns the installed entry for `name`, if it satisfies `range`.
    #[must_use]
    pub fn get_info(&self, name: &str, range: Option<&VersionRange>) -> Option<PluginInfo> {
        self.table
            .get(name)
            .filter(|info| range.is_none_or(|range| range.satisfies(&info.version)))
    }

    /// Returns the installed entry for `name` when it matches `range`
    /// under `mode`.
    #[must_use]
    pub fn already_installed(
        &self,
        name: &str,
        range: Option<&VersionRange>,
        mode: InstallMatch,
    ) -> Option<PluginInfo> {
        let info = self.table.get(name)?;
        let Some(range) = range else {
            return Some(info);
        };
        if range.satisfies(&info.version) {
            return Some(info);
        }
        match (mode, range.lower_bound()) {
            (InstallMatch::SatisfiesOrGreater, Some(pinned)) if info.version >= pinned => {
                Some(info)
            }
            _ => None,
        }
    }

    /// Resolves what installing `name` at `version` would install, without
    /// installing anything.
    ///
    /// # Errors
    ///
    /// Returns the resolving backend's errors, or
    /// [`PluginError::Descriptor`] for local paths that are not packages.
    pub fn query_package(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageInfo, PluginError> {
        let version = version.map(VersionRef::parse).transpose()?.unwrap_or_default();
        match version {
            VersionRef::Exact(_) | VersionRef::Range(_) => {
                self.registry.query_package(name, &version)
            }
            VersionRef::Git(git) => self.query_package_from_git(&git),
            VersionRef::Path(path) => {
                let location = self.options.resolve(&path);
                let descriptor = PackageDescriptor::read(&location)?;
                PackageInfo::from_descriptor(
                    descriptor,
                    FetchDescriptor::Directory(location.clone()),
                    &location,
                )
            }
            VersionRef::Code { source, version } => Ok(code_package(name, source, version)),
        }
    }

    /// Queries the content registry for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PackageNotFound`] or
    /// [`PluginError::NoMatchingVersion`] when nothing matches.
    pub fn query_package_from_registry(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PackageInfo, PluginError> {
        let version = match version {
            Some(version) => registry_ref(VersionRef::parse(version)?)?,
            None => VersionRef::latest(),
        };
        self.registry.query_package(name, &version)
    }

    /// Reads the package descriptor of a git repository.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PackageNotFound`] when it does not exist.
    pub fn query_package_from_git(&self, git: &GitRef) -> Result<PackageInfo, PluginError> {
        self.git.query_package("", &VersionRef::Git(git.clone()))
    }

    /// Runs ad-hoc code that may `require` installed plugins and returns
    /// its result.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SandboxExecution`] when the code fails and
    /// [`PluginError::ModuleNotFound`] for unresolvable requires.
    pub fn run_script(&self, code: &str) -> Result<Dynamic, PluginError> {
        self.loader.run_script(code)
    }

    /// Returns the dedicated template for `name`, if one was set.
    #[must_use]
    pub fn get_sandbox_template(&self, name: &str) -> Option<SandboxTemplate> {
        self.loader.sandbox_template(name)
    }

    /// Sets or clears the dedicated template for `name`.
    ///
    /// Takes effect the next time the plugin loads.
    pub fn set_sandbox_template(&self, name: &str, template: Option<SandboxTemplate>) {
        self.loader.set_sandbox_template(name, template);
        info!(target: MANAGER_TARGET, name, "sandbox template updated");
    }
}

fn registry_ref(version: VersionRef) -> Result<VersionRef, PluginError> {
    if matches!(version, VersionRef::Exact(_) | VersionRef::Range(_)) {
        Ok(version)
    } else {
        Err(PluginError::InvalidVersionSpec {
            input: version.to_string(),
            reason: String::from("registries accept versions and ranges only"),
        })
    }
}

fn parse_exact(input: &str) -> Result<Version, PluginError> {
    let trimmed = input.trim();
    Version::parse(trimmed.strip_prefix(['v', '=']).unwrap_or(trimmed)).map_err(|error| {
        PluginError::InvalidVersionSpec {
            input: input.to_owned(),
            reason: error.to_string(),
        }
    })
}

fn code_package(name: &str, source: String, version: Option<Version>) -> PackageInfo {
    PackageInfo {
        name: name.to_owned(),
        version: version.unwrap_or_else(|| Version::new(0, 0, 0)),
        dependencies: BTreeMap::new(),
        main: DEFAULT_MAIN.to_owned(),
        description: None,
        source: FetchDescriptor::Inline(source),
    }
}
