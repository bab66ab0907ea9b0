//! The `require` implementation handed to plugin scripts.

use std::path::PathBuf;
use std::sync::Weak;

use tether_sandbox::rhai::Dynamic;
use tether_sandbox::{ModuleResolver, ResolveError};

use super::LoaderInner;
use crate::error::PluginError;
use crate::name::split_request;

/// Plugins and files currently being evaluated by one require stack.
#[derive(Debug, Clone, Default)]
pub(super) struct RequireChain(Vec<String>);

impl RequireChain {
    /// Fails when `entry` is already being evaluated further up the stack.
    pub(super) fn check(&self, entry: &str) -> Result<(), PluginError> {
        if self.0.iter().any(|link| link == entry) {
            return Err(PluginError::SandboxExecution {
                name: entry.to_owned(),
                message: format!("circular require: {} -> {entry}", self.0.join(" -> ")),
            });
        }
        Ok(())
    }

    pub(super) fn extended(&self, entry: &str) -> Self {
        let mut links = self.0.clone();
        links.push(entry.to_owned());
        Self(links)
    }
}

/// Resolves `require` calls made by one executing file.
pub(super) struct PluginResolver {
    loader: Weak<LoaderInner>,
    requester: String,
    owner: Option<String>,
    root: PathBuf,
    base: PathBuf,
    chain: RequireChain,
}

impl PluginResolver {
    pub(super) fn new(
        loader: Weak<LoaderInner>,
        requester: &str,
        owner: Option<String>,
        root: PathBuf,
        base: PathBuf,
        chain: RequireChain,
    ) -> Self {
        Self {
            loader,
            requester: requester.to_owned(),
            owner,
            root,
            base,
            chain,
        }
    }

    fn resolve_module(&self, request: &str) -> Result<Dynamic, PluginError> {
        let not_found = || PluginError::module_not_found(request, &self.requester);
        let loader = self.loader.upgrade().ok_or_else(not_found)?;

        if request.starts_with("./") || request.starts_with("../") {
            return loader
                .require_file(
                    &self.requester,
                    self.owner.as_deref(),
                    &self.root,
                    &self.base,
                    request,
                    &self.chain,
                )
                .map(|module| module.exports().clone());
        }
        if let Some(value) = loader.options.static_dependencies.get(request) {
            return Ok(value.clone());
        }
        let (name, _) = split_request(request);
        if loader.table.contains(name) {
            return loader
                .require_installed(request, &self.chain)
                .map(|module| module.exports().clone());
        }
        if loader.options.is_host_module(request)
            && let Some(value) = loader.options.host_modules.get(request)
        {
            return Ok(value.clone());
        }
        Err(not_found())
    }
}

impl ModuleResolver for PluginResolver {
    fn resolve(&self, request: &str) -> Result<Dynamic, ResolveError> {
        self.resolve_module(request)
            .map_err(|error| Box::new(error) as ResolveError)
    }
}
