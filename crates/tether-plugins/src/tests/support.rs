//! An in-memory registry shared by manager tests and behaviour scenarios.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use semver::Version;

use crate::error::PluginError;
use crate::package::{DEFAULT_MAIN, FetchDescriptor, PackageInfo};
use crate::registry::Registry;
use crate::version::VersionRef;

#[derive(Debug, Clone)]
struct Published {
    version: Version,
    dependencies: BTreeMap<String, String>,
    code: String,
}

#[derive(Debug, Default)]
struct State {
    packages: BTreeMap<String, Vec<Published>>,
    queries: Vec<String>,
    fetches: Vec<(String, Version)>,
    fetch_delay: Duration,
}

/// Serves published packages as inline single-file plugins.
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// manager.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRegistry {
    state: Arc<Mutex<State>>,
}

impl FakeRegistry {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, name: &str, version: &str, code: &str) -> &Self {
        self.publish_with_dependencies(name, version, code, &[])
    }

    pub(crate) fn publish_with_dependencies(
        &self,
        name: &str,
        version: &str,
        code: &str,
        dependencies: &[(&str, &str)],
    ) -> &Self {
        let published = Published {
            version: Version::parse(version).expect("valid test version"),
            dependencies: dependencies
                .iter()
                .map(|(name, range)| ((*name).to_owned(), (*range).to_owned()))
                .collect(),
            code: code.to_owned(),
        };
        self.state()
            .packages
            .entry(name.to_owned())
            .or_default()
            .push(published);
        self
    }

    pub(crate) fn with_fetch_delay(self, delay: Duration) -> Self {
        self.state().fetch_delay = delay;
        self
    }

    pub(crate) fn fetch_count(&self, name: &str) -> usize {
        self.state()
            .fetches
            .iter()
            .filter(|(fetched, _)| fetched == name)
            .count()
    }

    pub(crate) fn query_count(&self, name: &str) -> usize {
        self.state()
            .queries
            .iter()
            .filter(|queried| *queried == name)
            .count()
    }

    pub(crate) fn boxed(&self) -> Box<dyn Registry> {
        Box::new(self.clone())
    }
}

impl Registry for FakeRegistry {
    fn query_package(&self, name: &str, version: &VersionRef) -> Result<PackageInfo, PluginError> {
        let mut state = self.state();
        state.queries.push(name.to_owned());
        let versions = state
            .packages
            .get(name)
            .ok_or_else(|| PluginError::PackageNotFound {
                name: name.to_owned(),
                registry: String::from("fake registry"),
            })?;
        let range = version.as_range().ok_or_else(|| PluginError::InvalidVersionSpec {
            input: version.to_string(),
            reason: String::from("fake registry serves versions only"),
        })?;
        let best = range
            .pick_best(versions.iter().map(|published| &published.version))
            .ok_or_else(|| PluginError::NoMatchingVersion {
                name: name.to_owned(),
                requested: version.to_string(),
            })?;
        let published = versions
            .iter()
            .find(|published| &published.version == best)
            .cloned()
            .ok_or_else(|| PluginError::NoMatchingVersion {
                name: name.to_owned(),
                requested: version.to_string(),
            })?;
        Ok(PackageInfo {
            name: name.to_owned(),
            version: published.version,
            dependencies: published.dependencies,
            main: DEFAULT_MAIN.to_owned(),
            description: None,
            source: FetchDescriptor::Inline(published.code),
        })
    }

    fn fetch_package(&self, package: &PackageInfo, destination: &Path) -> Result<(), PluginError> {
        let FetchDescriptor::Inline(code) = &package.source else {
            return Err(PluginError::Registry {
                url: String::from("fake://registry"),
                message: format!("'{}' is not an inline package", package.name),
            });
        };
        let delay = {
            let mut state = self.state();
            state
                .fetches
                .push((package.name.clone(), package.version.clone()));
            state.fetch_delay
        };
        thread::sleep(delay);
        write_package(package, code, destination);
        Ok(())
    }
}

/// Writes a single-file package the way a downloaded tarball would unpack.
pub(crate) fn write_package(package: &PackageInfo, code: &str, destination: &Path) {
    fs::create_dir_all(destination).expect("create package dir");
    fs::write(destination.join(&package.main), code).expect("write entry script");
    package
        .to_descriptor()
        .write(destination)
        .expect("write descriptor");
}

/// Writes a package directory with a descriptor and the given files.
pub(crate) fn write_source_package(
    directory: &Path,
    descriptor: &serde_json::Value,
    files: &[(&str, &str)],
) {
    fs::create_dir_all(directory).expect("create source dir");
    fs::write(directory.join("package.json"), descriptor.to_string()).expect("write descriptor");
    for (relative, contents) in files {
        let path = directory.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create source subdir");
        }
        fs::write(path, contents).expect("write source file");
    }
}
