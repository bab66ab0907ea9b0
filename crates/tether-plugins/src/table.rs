//! The installed-plugin table shared by the manager and the loader.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::info::PluginInfo;
use crate::loader::PluginModule;

/// Installed plugins in install order, at most one entry per name.
///
/// Mutations happen under the plugins directory lock; reads do not take it
/// and may observe a table mid-operation. The inner lock is never held
/// while plugin code runs.
#[derive(Debug, Default)]
pub(crate) struct PluginTable {
    plugins: RwLock<Vec<PluginInfo>>,
}

impl PluginTable {
    fn read(&self) -> RwLockReadGuard<'_, Vec<PluginInfo>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<PluginInfo>> {
        self.plugins.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> Vec<PluginInfo> {
        self.read().clone()
    }

    pub(crate) fn get(&self, name: &str) -> Option<PluginInfo> {
        self.read().iter().find(|plugin| plugin.name == name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|plugin| plugin.name == name)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.read().iter().map(|plugin| plugin.name.clone()).collect()
    }

    /// Replaces the entry with the same name in place, or appends.
    pub(crate) fn upsert(&self, info: PluginInfo) {
        let mut plugins = self.write();
        match plugins.iter_mut().find(|plugin| plugin.name == info.name) {
            Some(existing) => *existing = info,
            None => plugins.push(info),
        }
    }

    pub(crate) fn remove(&self, name: &str) -> Option<PluginInfo> {
        let mut plugins = self.write();
        let index = plugins.iter().position(|plugin| plugin.name == name)?;
        Some(plugins.remove(index))
    }

    /// Caches `module` unless another caller got there first; returns the
    /// handle that ends up cached, or `None` if the plugin vanished.
    pub(crate) fn attach_module(&self, name: &str, module: PluginModule) -> Option<PluginModule> {
        let mut plugins = self.write();
        let plugin = plugins.iter_mut().find(|plugin| plugin.name == name)?;
        Some(plugin.module.get_or_insert(module).clone())
    }

    /// Drops the cached handle; returns true when one was present.
    pub(crate) fn detach_module(&self, name: &str) -> bool {
        self.write()
            .iter_mut()
            .find(|plugin| plugin.name == name)
            .and_then(|plugin| plugin.module.take())
            .is_some()
    }
}
