//! Scripted execution contexts for Tether plugins.
//!
//! Plugins are `rhai` scripts. A [`Sandbox`] compiles a plugin entry script
//! into a fresh engine, seeds its scope from a [`SandboxTemplate`], and wires
//! a `require(name)` function through a caller-supplied [`ModuleResolver`].
//! The result is a [`ScriptModule`] holding the script's exports together
//! with the engine and AST, so exported functions remain callable after
//! evaluation.
//!
//! Scripts see the following bindings:
//! - `exports`: mutable, initially an empty map. Whatever it holds after
//!   evaluation becomes the module's exports. When it is left empty the
//!   script's final expression value is used instead.
//! - `env`: a constant map filtered through the template's
//!   [`EnvironmentPolicy`] and extended with its overlay variables.
//! - `plugin`: a constant map with `name`, `filename` and `dirname`.
//! - every global registered on the template.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tether_sandbox::{Sandbox, SandboxTemplate, ScriptUnit, StaticResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sandbox = Sandbox::default();
//! let unit = ScriptUnit::new("answer", "exports.value = 40 + 2;");
//! let module = sandbox.execute(
//!     &unit,
//!     &SandboxTemplate::isolated(),
//!     Arc::new(StaticResolver::default()),
//! )?;
//! let exports = module.exports().clone().cast::<rhai::Map>();
//! assert_eq!(exports["value"].as_int(), Ok(42));
//! # Ok(()) }
//! ```

mod error;
mod resolver;
mod sandbox;
mod template;

pub use error::SandboxError;
pub use resolver::{ModuleResolver, ResolveError, StaticResolver, UnresolvedModule};
pub use rhai;
pub use sandbox::{ExecutionLimits, Sandbox, ScriptModule, ScriptUnit};
pub use template::{EnvironmentPolicy, SandboxTemplate};
