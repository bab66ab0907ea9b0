//! The `require` seam between a running script and its host.

use std::collections::BTreeMap;

use rhai::Dynamic;
use thiserror::Error;

/// Boxed error returned by a [`ModuleResolver`].
pub type ResolveError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Resolves the argument of a script's `require(name)` call to a value.
///
/// Implementations must be thread-safe: the resolver is captured by the
/// engine and may be invoked again whenever an exported function runs.
pub trait ModuleResolver: Send + Sync {
    /// Returns the exports for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be satisfied. The error is
    /// surfaced unchanged through [`crate::SandboxError::Resolve`].
    fn resolve(&self, request: &str) -> Result<Dynamic, ResolveError>;
}

/// Error raised by [`StaticResolver`] for names it does not know.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no module named '{0}' is available")]
pub struct UnresolvedModule(pub String);

/// Resolver backed by a fixed table of values.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    modules: BTreeMap<String, Dynamic>,
}

impl StaticResolver {
    /// Registers a value under `name`.
    #[must_use]
    pub fn with_module(mut self, name: impl Into<String>, value: Dynamic) -> Self {
        self.modules.insert(name.into(), value);
        self
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, request: &str) -> Result<Dynamic, ResolveError> {
        self.modules
            .get(request)
            .cloned()
            .ok_or_else(|| Box::new(UnresolvedModule(request.to_owned())) as ResolveError)
    }
}
