//! Executes installed plugins inside sandboxed script contexts.
//!
//! The loader owns the module cache: a plugin's entry script runs at most
//! once per load, and its [`PluginModule`] handle is stored on the plugin's
//! table entry until it is unloaded. Files required relatively from inside a
//! plugin are cached per plugin and evicted with it.
//!
//! Loading does not hold the table lock while a script runs. Two threads
//! requiring the same unloaded plugin at once may therefore both execute its
//! entry script; the first handle attached to the table wins and both
//! callers receive it.
//!
//! `require(x)` inside a plugin resolves, in order:
//! 1. `./` and `../` paths inside the plugin's own directory;
//! 2. static dependencies injected by the host;
//! 3. installed plugins by name, loaded on demand (`name/sub/path.rhai`
//!    selects a file inside the plugin);
//! 4. host modules, when `require_core_modules` is enabled.
//!
//! Anything else fails with [`PluginError::ModuleNotFound`].

mod resolver;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tether_sandbox::rhai::Dynamic;
use tether_sandbox::{Sandbox, SandboxError, SandboxTemplate, ScriptModule, ScriptUnit};
use tracing::{debug, info};

use self::resolver::{PluginResolver, RequireChain};
use crate::error::PluginError;
use crate::info::PluginInfo;
use crate::name::split_request;
use crate::options::ManagerOptions;
use crate::package::DESCRIPTOR_FILE;
use crate::table::PluginTable;

const LOADER_TARGET: &str = "tether_plugins::loader";

/// Name used for ad-hoc scripts in logs and errors.
const SCRIPT_REQUESTER: &str = "<script>";

/// A loaded plugin (or plugin file) and its exports.
///
/// Handles are cheap to clone and compare by identity: two handles are
/// [`PluginModule::ptr_eq`] exactly when they come from the same execution.
#[derive(Clone)]
pub struct PluginModule(Arc<ScriptModule>);

impl PluginModule {
    /// Returns the exported value.
    #[must_use]
    pub fn exports(&self) -> &Dynamic {
        self.0.exports()
    }

    /// Returns the name of the plugin that produced this module.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Calls an exported or script-defined function.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SandboxExecution`] when the function is
    /// missing or fails, and the underlying error when it failed in a
    /// `require`.
    pub fn call(&self, function: &str, args: Vec<Dynamic>) -> Result<Dynamic, PluginError> {
        self.0.call(function, args).map_err(sandbox_error)
    }

    /// Calls the exports when they are a function pointer.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SandboxExecution`] when the exports are not
    /// callable or the call fails.
    pub fn invoke(&self, args: Vec<Dynamic>) -> Result<Dynamic, PluginError> {
        self.0.invoke(args).map_err(sandbox_error)
    }

    /// Returns true when both handles refer to the same execution.
    #[must_use]
    pub fn ptr_eq(left: &Self, right: &Self) -> bool {
        Arc::ptr_eq(&left.0, &right.0)
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginModule").field(&self.0).finish()
    }
}

/// Maps engine errors onto the plugin taxonomy.
///
/// Resolver failures carry a [`PluginError`] that is surfaced unchanged.
pub(crate) fn sandbox_error(error: SandboxError) -> PluginError {
    match error {
        SandboxError::Resolve { name, source, .. } => match source.downcast::<PluginError>() {
            Ok(inner) => *inner,
            Err(other) => PluginError::SandboxExecution {
                name,
                message: other.to_string(),
            },
        },
        other => PluginError::SandboxExecution {
            name: other.plugin_name().to_owned(),
            message: other.to_string(),
        },
    }
}

/// Loads, caches, and unloads plugin modules.
#[derive(Clone)]
pub(crate) struct PluginLoader {
    inner: Arc<LoaderInner>,
}

pub(crate) struct LoaderInner {
    table: Arc<PluginTable>,
    options: Arc<ManagerOptions>,
    sandbox: Sandbox,
    templates: RwLock<BTreeMap<String, SandboxTemplate>>,
    files: Mutex<BTreeMap<(String, PathBuf), PluginModule>>,
}

impl PluginLoader {
    pub(crate) fn new(table: Arc<PluginTable>, options: Arc<ManagerOptions>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                sandbox: Sandbox::new(options.execution_limits),
                table,
                options,
                templates: RwLock::default(),
                files: Mutex::default(),
            }),
        }
    }

    pub(crate) fn sandbox_template(&self, name: &str) -> Option<SandboxTemplate> {
        self.inner
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn set_sandbox_template(&self, name: &str, template: Option<SandboxTemplate>) {
        let mut templates = self
            .inner
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match template {
            Some(template) => {
                templates.insert(name.to_owned(), template);
            }
            None => {
                templates.remove(name);
            }
        }
    }

    /// Loads `name`, returning the cached handle when already loaded.
    pub(crate) fn load(&self, name: &str) -> Result<PluginModule, PluginError> {
        self.inner.load(name, &RequireChain::default())
    }

    /// Resolves `request` as an installed plugin, optionally with a
    /// sub-path inside it. Sub-path requests run only the named file.
    pub(crate) fn require(&self, request: &str) -> Result<PluginModule, PluginError> {
        self.inner.require_installed(request, &RequireChain::default())
    }

    /// Evicts the cached handle and file cache for `name`.
    pub(crate) fn unload(&self, name: &str) -> bool {
        self.inner.unload(name)
    }

    /// Runs ad-hoc code that may require installed plugins.
    pub(crate) fn run_script(&self, code: &str) -> Result<Dynamic, PluginError> {
        let cwd = self.inner.options.cwd.clone();
        let resolver = PluginResolver::new(
            Arc::downgrade(&self.inner),
            SCRIPT_REQUESTER,
            None,
            cwd.clone(),
            cwd,
            RequireChain::default(),
        );
        let unit = ScriptUnit::new(SCRIPT_REQUESTER, code);
        let module = self
            .inner
            .sandbox
            .execute(&unit, &self.inner.options.sandbox, Arc::new(resolver))
            .map_err(sandbox_error)?;
        Ok(module.exports().clone())
    }
}

impl LoaderInner {
    fn template_for(&self, name: &str) -> SandboxTemplate {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.options.sandbox.clone())
    }

    fn load(self: &Arc<Self>, name: &str, chain: &RequireChain) -> Result<PluginModule, PluginError> {
        let info = self
            .table
            .get(name)
            .ok_or_else(|| PluginError::plugin_not_found(name))?;
        if let Some(module) = &info.module {
            return Ok(module.clone());
        }
        chain.check(name)?;
        let module = self.execute_plugin(&info, &chain.extended(name))?;
        let cached = self
            .table
            .attach_module(name, module)
            .ok_or_else(|| PluginError::plugin_not_found(name))?;
        info!(
            target: LOADER_TARGET,
            name,
            version = %info.version,
            "plugin loaded"
        );
        Ok(cached)
    }

    fn execute_plugin(
        self: &Arc<Self>,
        info: &PluginInfo,
        chain: &RequireChain,
    ) -> Result<PluginModule, PluginError> {
        let file = info.main_file();
        let root = fs::canonicalize(&info.location).map_err(PluginError::at(&info.location))?;
        let resolved = fs::canonicalize(&file).map_err(PluginError::at(&file))?;
        if !resolved.starts_with(&root) {
            return Err(PluginError::Descriptor {
                path: info.location.join(DESCRIPTOR_FILE),
                message: format!("main '{}' resolves outside the package", info.main),
            });
        }
        let base = file
            .parent()
            .map_or_else(|| info.location.clone(), Path::to_path_buf);
        self.execute_file(&info.name, Some(&info.name), &info.location, base, &file, chain)
    }

    fn execute_file(
        self: &Arc<Self>,
        requester: &str,
        owner: Option<&str>,
        root: &Path,
        base: PathBuf,
        file: &Path,
        chain: &RequireChain,
    ) -> Result<PluginModule, PluginError> {
        let source = fs::read_to_string(file).map_err(PluginError::at(file))?;
        let resolver = PluginResolver::new(
            Arc::downgrade(self),
            requester,
            owner.map(str::to_owned),
            root.to_path_buf(),
            base,
            chain.clone(),
        );
        let unit = ScriptUnit::new(requester, source).with_filename(file);
        let template = self.template_for(owner.unwrap_or(requester));
        debug!(target: LOADER_TARGET, requester, file = %file.display(), "executing plugin file");
        self.sandbox
            .execute(&unit, &template, Arc::new(resolver))
            .map(|module| PluginModule(Arc::new(module)))
            .map_err(sandbox_error)
    }

    fn require_installed(
        self: &Arc<Self>,
        request: &str,
        chain: &RequireChain,
    ) -> Result<PluginModule, PluginError> {
        let (name, sub_path) = split_request(request);
        let Some(sub_path) = sub_path else {
            return self.load(name, chain);
        };
        let info = self
            .table
            .get(name)
            .ok_or_else(|| PluginError::plugin_not_found(name))?;
        self.require_file(
            name,
            Some(name),
            &info.location,
            &info.location,
            &format!("./{sub_path}"),
            chain,
        )
    }

    /// Resolves a relative request against `base`, confined to `root`.
    fn require_file(
        self: &Arc<Self>,
        requester: &str,
        owner: Option<&str>,
        root: &Path,
        base: &Path,
        request: &str,
        chain: &RequireChain,
    ) -> Result<PluginModule, PluginError> {
        let not_found = || PluginError::module_not_found(request, requester);
        let mut candidate = base.join(request);
        if candidate.extension().is_none() {
            candidate.set_extension("rhai");
        }
        let file = fs::canonicalize(&candidate).map_err(|_| not_found())?;
        let root = fs::canonicalize(root).map_err(PluginError::at(root))?;
        if !file.starts_with(&root) || !file.is_file() {
            return Err(not_found());
        }

        let key = owner.map(|owner| (owner.to_owned(), file.clone()));
        if let Some(key) = &key
            && let Some(module) = self.cached_file(key)
        {
            return Ok(module);
        }
        let label = file.display().to_string();
        chain.check(&label)?;
        let base = file
            .parent()
            .map_or_else(|| root.clone(), Path::to_path_buf);
        let module = self.execute_file(
            requester,
            owner,
            &root,
            base,
            &file,
            &chain.extended(&label),
        )?;
        Ok(match key {
            Some(key) => self
                .files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert(module)
                .clone(),
            None => module,
        })
    }

    fn cached_file(&self, key: &(String, PathBuf)) -> Option<PluginModule> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn unload(&self, name: &str) -> bool {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(owner, _), _| owner != name);
        let was_loaded = self.table.detach_module(name);
        if was_loaded {
            info!(target: LOADER_TARGET, name, "plugin unloaded");
        }
        was_loaded
    }
}

#[cfg(test)]
mod tests;
