//! Lock-held install and uninstall steps.
//!
//! Everything here takes `&LockToken` and assumes the plugins directory
//! lock is held for the whole call. Dependency installs recurse through
//! these methods under the caller's token.

use std::path::Path;

use semver::Version;
use tracing::{debug, info, warn};

use super::{
    InstallFromPathOptions, InstallMatch, MANAGER_TARGET, PluginManager, code_package, files,
};
use crate::error::PluginError;
use crate::info::PluginInfo;
use crate::lock::LockToken;
use crate::name::PluginName;
use crate::options::InstallMode;
use crate::package::{
    DESCRIPTOR_FILE, FetchDescriptor, PackageDescriptor, PackageInfo, check_entry_script,
};
use crate::registry::Registry;
use crate::version::{GitRef, VersionRange, VersionRef};

/// Where an install takes the package contents from.
enum Contents<'a> {
    /// The target directory already holds the package.
    Reuse,
    /// Download through a registry backend.
    Fetch(&'a dyn Registry),
    /// Copy a local package directory.
    Copy(&'a Path),
    /// Write inline source as the entry script.
    Code(&'a str),
}

impl PluginManager {
    pub(super) fn install_ref_held(
        &self,
        lock: &LockToken,
        name: &str,
        version: &VersionRef,
    ) -> Result<PluginInfo, PluginError> {
        match version {
            VersionRef::Exact(_) | VersionRef::Range(_) => {
                self.install_from_registry_held(lock, name, version)
            }
            VersionRef::Git(git) => {
                let info = self.install_from_git_held(lock, git)?;
                if info.name != name {
                    warn!(
                        target: MANAGER_TARGET,
                        requested = name,
                        installed = %info.name,
                        repository = %git,
                        "repository declares a different package name"
                    );
                }
                Ok(info)
            }
            VersionRef::Path(path) => {
                let location = self.options.resolve(path);
                self.install_from_path_held(lock, &location, InstallFromPathOptions::default())
            }
            VersionRef::Code { source, version } => {
                self.install_from_code_held(lock, name, source, version.as_ref())
            }
        }
    }

    pub(super) fn install_from_registry_held(
        &self,
        lock: &LockToken,
        name: &str,
        version: &VersionRef,
    ) -> Result<PluginInfo, PluginError> {
        let plugin_name = PluginName::parse(name)?;
        let Some(range) = version.as_range() else {
            return Err(PluginError::InvalidVersionSpec {
                input: version.to_string(),
                reason: String::from("registries accept versions and ranges only"),
            });
        };
        if let Some(info) =
            self.already_installed(name, Some(&range), InstallMatch::SatisfiesOrGreater)
        {
            debug!(
                target: MANAGER_TARGET,
                name,
                version = %info.version,
                requested = %range,
                "already installed"
            );
            return Ok(info);
        }

        let location = self.options.plugins_path.join(plugin_name.relative_path());
        if let Some(package) = self.cached_package(name, &range, &location) {
            info!(
                target: MANAGER_TARGET,
                name,
                version = %package.version,
                "reusing downloaded package"
            );
            return self.install_package_held(lock, &package, &location, Contents::Reuse);
        }

        let package = self.registry.query_package(name, version)?;
        self.install_package_held(
            lock,
            &package,
            &location,
            Contents::Fetch(self.registry.as_ref()),
        )
    }

    pub(super) fn install_from_git_held(
        &self,
        lock: &LockToken,
        git: &GitRef,
    ) -> Result<PluginInfo, PluginError> {
        let package = self.git.query_package("", &VersionRef::Git(git.clone()))?;
        let plugin_name = PluginName::parse(&package.name)?;
        let pinned = VersionRange::exact(&package.version);
        if let Some(info) =
            self.already_installed(&package.name, Some(&pinned), InstallMatch::Satisfies)
        {
            debug!(
                target: MANAGER_TARGET,
                name = %info.name,
                version = %info.version,
                repository = %git,
                "already installed"
            );
            return Ok(info);
        }
        let location = self.options.plugins_path.join(plugin_name.relative_path());
        self.install_package_held(lock, &package, &location, Contents::Fetch(self.git.as_ref()))
    }

    pub(super) fn install_from_path_held(
        &self,
        lock: &LockToken,
        source: &Path,
        options: InstallFromPathOptions,
    ) -> Result<PluginInfo, PluginError> {
        let descriptor = PackageDescriptor::read(source)?;
        let package = PackageInfo::from_descriptor(
            descriptor,
            FetchDescriptor::Directory(source.to_path_buf()),
            &source.join(DESCRIPTOR_FILE),
        )?;
        let plugin_name = PluginName::parse(&package.name)?;
        if !options.force
            && let Some(info) = self.already_installed(
                &package.name,
                Some(&VersionRange::exact(&package.version)),
                InstallMatch::SatisfiesOrGreater,
            )
        {
            debug!(
                target: MANAGER_TARGET,
                name = %info.name,
                version = %info.version,
                source = %source.display(),
                "already installed"
            );
            return Ok(info);
        }
        let location = self.options.plugins_path.join(plugin_name.relative_path());
        let contents = if files::same_directory(source, &location) {
            Contents::Reuse
        } else {
            Contents::Copy(source)
        };
        self.install_package_held(lock, &package, &location, contents)
    }

    pub(super) fn install_from_code_held(
        &self,
        lock: &LockToken,
        name: &str,
        code: &str,
        version: Option<&Version>,
    ) -> Result<PluginInfo, PluginError> {
        let plugin_name = PluginName::parse(name)?;
        if let Some(version) = version
            && let Some(info) = self.already_installed(
                name,
                Some(&VersionRange::exact(version)),
                InstallMatch::SatisfiesOrGreater,
            )
        {
            return Ok(info);
        }
        let package = code_package(name, code.to_owned(), version.cloned());
        let location = self.options.plugins_path.join(plugin_name.relative_path());
        self.install_package_held(lock, &package, &location, Contents::Code(code))
    }

    /// Returns the on-disk package at `location` when the install mode
    /// allows reuse and it is exactly the pinned version requested.
    fn cached_package(&self, name: &str, range: &VersionRange, location: &Path) -> Option<PackageInfo> {
        if self.options.install_mode != InstallMode::UseCache {
            return None;
        }
        let pinned = range.lower_bound()?;
        let descriptor = PackageDescriptor::read(location).ok()?;
        if descriptor.name != name {
            return None;
        }
        let package = PackageInfo::from_descriptor(
            descriptor,
            FetchDescriptor::Directory(location.to_path_buf()),
            location,
        )
        .ok()?;
        (package.version == pinned).then_some(package)
    }

    /// Replaces any installed entry for the package with the new contents.
    ///
    /// The previous entry and its dependents are unloaded before any file
    /// is touched. New contents are written to a staging directory and only
    /// replace the installed tree once complete, so a failed download leaves
    /// the previous install intact. The new entry is recorded before
    /// dependencies install so dependency cycles terminate; if a dependency
    /// fails, the table entry is rolled back while the written files stay
    /// for the next attempt.
    fn install_package_held(
        &self,
        lock: &LockToken,
        package: &PackageInfo,
        location: &Path,
        contents: Contents<'_>,
    ) -> Result<PluginInfo, PluginError> {
        let previous = self.table.get(&package.name);
        if previous.is_some() {
            let plan = self.unload_with_dependents(&package.name);
            debug!(
                target: MANAGER_TARGET,
                name = %package.name,
                unloaded = ?plan.order,
                "unloaded previous install"
            );
        }

        self.materialise(package, location, contents)?;

        let info = PluginInfo {
            name: package.name.clone(),
            version: package.version.clone(),
            location: location.to_path_buf(),
            main: package.main.clone(),
            dependencies: package.dependencies.clone(),
            description: package.description.clone(),
            module: None,
        };
        self.table.upsert(info.clone());

        let base = match &package.source {
            FetchDescriptor::Directory(directory) => directory.as_path(),
            _ => location,
        };
        if let Err(error) = self.install_dependencies_held(lock, package, base) {
            match previous {
                Some(previous) => self.table.upsert(previous.without_module()),
                None => {
                    self.table.remove(&package.name);
                }
            }
            return Err(error);
        }

        info!(
            target: MANAGER_TARGET,
            name = %info.name,
            version = %info.version,
            location = %info.location.display(),
            "plugin installed"
        );
        Ok(info)
    }

    fn materialise(
        &self,
        package: &PackageInfo,
        location: &Path,
        contents: Contents<'_>,
    ) -> Result<(), PluginError> {
        check_entry_script(&package.main, &location.join(DESCRIPTOR_FILE))?;
        let staging = files::staging_path(&self.options.plugins_path, &package.name);
        let written = match contents {
            Contents::Reuse => return Ok(()),
            Contents::Fetch(registry) => files::remove_tree(&staging)
                .and_then(|()| registry.fetch_package(package, &staging))
                .and_then(|()| files::ensure_descriptor(package, &staging)),
            Contents::Copy(source) => files::remove_tree(&staging)
                .and_then(|()| files::copy_tree(source, &staging)),
            Contents::Code(code) => files::remove_tree(&staging)
                .and_then(|()| files::write_code_package(package, code, &staging)),
        };
        let result = written.and_then(|()| files::replace_tree(&staging, location));
        if result.is_err()
            && let Err(error) = files::remove_tree(&staging)
        {
            warn!(
                target: MANAGER_TARGET,
                staging = %staging.display(),
                error = %error,
                "failed to clean up staging directory"
            );
        }
        result
    }

    /// Installs each declared dependency the host does not already
    /// provide. Relative path dependencies resolve against `base`.
    pub(super) fn install_dependencies_held(
        &self,
        lock: &LockToken,
        package: &PackageInfo,
        base: &Path,
    ) -> Result<(), PluginError> {
        for (dependency, requested) in &package.dependencies {
            if self.options.is_ignored(dependency) {
                debug!(
                    target: MANAGER_TARGET,
                    plugin = %package.name,
                    dependency,
                    "skipping ignored dependency"
                );
                continue;
            }
            if self.options.static_dependencies.contains_key(dependency)
                || self.options.is_host_module(dependency)
            {
                debug!(
                    target: MANAGER_TARGET,
                    plugin = %package.name,
                    dependency,
                    "dependency provided by host"
                );
                continue;
            }
            let version = VersionRef::parse(requested)?;
            match &version {
                VersionRef::Path(path) => {
                    let location = if path.starts_with("~") {
                        self.options.resolve(path)
                    } else {
                        base.join(path)
                    };
                    self.install_from_path_held(
                        lock,
                        &location,
                        InstallFromPathOptions::default(),
                    )?;
                }
                _ => {
                    self.install_ref_held(lock, dependency, &version)?;
                }
            }
        }
        Ok(())
    }

    pub(super) fn uninstall_held(&self, _lock: &LockToken, name: &str) -> Result<(), PluginError> {
        let info = self
            .table
            .get(name)
            .ok_or_else(|| PluginError::plugin_not_found(name))?;
        let plan = self.unload_with_dependents(name);
        files::remove_tree(&info.location)?;
        files::remove_empty_scope(&self.options.plugins_path, &info.location)?;
        self.table.remove(name);
        info!(
            target: MANAGER_TARGET,
            name,
            version = %info.version,
            unloaded = ?plan.order,
            "plugin uninstalled"
        );
        Ok(())
    }

    pub(super) fn discover_installed_held(
        &self,
        _lock: &LockToken,
    ) -> Result<Vec<PluginInfo>, PluginError> {
        let mut discovered = Vec::new();
        for directory in files::package_directories(&self.options.plugins_path)? {
            let package = match PackageDescriptor::read(&directory).and_then(|descriptor| {
                PackageInfo::from_descriptor(
                    descriptor,
                    FetchDescriptor::Directory(directory.clone()),
                    &directory.join(DESCRIPTOR_FILE),
                )
            }) {
                Ok(package) => package,
                Err(error) => {
                    warn!(
                        target: MANAGER_TARGET,
                        directory = %directory.display(),
                        error = %error,
                        "skipping unreadable package"
                    );
                    continue;
                }
            };
            let expected = PluginName::parse(&package.name)
                .map(|name| self.options.plugins_path.join(name.relative_path()));
            if expected.as_ref().ok() != Some(&directory) {
                warn!(
                    target: MANAGER_TARGET,
                    directory = %directory.display(),
                    name = %package.name,
                    "package name does not match its directory"
                );
                continue;
            }
            if self.table.contains(&package.name) {
                continue;
            }
            let info = PluginInfo {
                name: package.name,
                version: package.version,
                location: directory,
                main: package.main,
                dependencies: package.dependencies,
                description: package.description,
                module: None,
            };
            self.table.upsert(info.clone());
            discovered.push(info);
        }
        info!(
            target: MANAGER_TARGET,
            count = discovered.len(),
            "registered installed packages"
        );
        Ok(discovered)
    }
}
