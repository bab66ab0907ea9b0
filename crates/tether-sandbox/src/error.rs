//! Domain errors raised while compiling or running plugin scripts.

use thiserror::Error;

use crate::resolver::ResolveError;

/// Errors raised while executing a script inside a [`crate::Sandbox`].
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The script failed to parse.
    #[error("failed to compile plugin '{name}': {message}")]
    Compile {
        /// Name of the plugin whose script failed to compile.
        name: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The script raised an error or exceeded an execution limit.
    #[error("plugin '{name}' failed during execution: {message}")]
    Execution {
        /// Name of the plugin that failed.
        name: String,
        /// Runtime diagnostic.
        message: String,
    },

    /// A `require` call could not be satisfied by the resolver.
    ///
    /// The resolver's own error is preserved so callers can downcast it back
    /// to their domain type.
    #[error("plugin '{name}' could not require '{request}': {source}")]
    Resolve {
        /// Name of the plugin that issued the request.
        name: String,
        /// The argument passed to `require`.
        request: String,
        /// Error returned by the resolver.
        #[source]
        source: ResolveError,
    },

    /// Calling a function on an evaluated module failed.
    #[error("call to '{function}' in plugin '{name}' failed: {message}")]
    Call {
        /// Name of the plugin that owns the function.
        name: String,
        /// Function that was invoked.
        function: String,
        /// Runtime diagnostic.
        message: String,
    },
}

impl SandboxError {
    /// Returns the name of the plugin the error relates to.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        match self {
            Self::Compile { name, .. }
            | Self::Execution { name, .. }
            | Self::Resolve { name, .. }
            | Self::Call { name, .. } => name,
        }
    }
}
