//! Runtime plugin management for Tether hosts.
//!
//! A [`PluginManager`] resolves plugins by name and [`VersionRef`],
//! downloads them from a content registry, a git hosting API, a local
//! directory, or inline source, and installs them under one plugins
//! directory. Installed plugins are `rhai` scripts executed through
//! [`tether_sandbox`], so a host can load them, call into their exports,
//! and unload them again at run time.
//!
//! Mutating operations serialise on a lock file inside the plugins
//! directory, so several processes may share one. Replacing or removing a
//! plugin first unloads every plugin that depends on it, dependents first.
//!
//! ```no_run
//! use tether_plugins::{ManagerOptions, PluginManager};
//!
//! let manager = PluginManager::new(ManagerOptions::new("/srv/host"))?;
//! manager.install("left-pad", Some("^1.0.0"))?;
//! let module = manager.require("left-pad")?;
//! println!("left-pad exports {:?}", module.exports());
//! manager.uninstall("left-pad")?;
//! # Ok::<(), tether_plugins::PluginError>(())
//! ```

mod error;
mod graph;
mod info;
mod loader;
mod lock;
mod manager;
mod name;
mod options;
mod package;
pub mod registry;
mod table;
mod version;

pub use error::PluginError;
pub use graph::{DependencyGraph, UnloadPlan};
pub use info::PluginInfo;
pub use loader::PluginModule;
pub use lock::{LOCK_FILE_NAME, LockManager, LockSettings, LockToken};
pub use manager::{InstallFromPathOptions, InstallMatch, PluginManager};
pub use name::PluginName;
pub use options::{DependencyPattern, InstallMode, ManagerOptions};
pub use package::{DEFAULT_MAIN, DESCRIPTOR_FILE, FetchDescriptor, PackageDescriptor, PackageInfo};
pub use registry::{ContentRegistry, GitRegistry, Registry, RegistryAuth, RegistryConfig};
pub use tether_sandbox::{EnvironmentPolicy, ExecutionLimits, SandboxTemplate};
pub use version::{GitRef, VersionRange, VersionRef};

#[cfg(test)]
mod tests;
