//! Script compilation, evaluation, and post-evaluation calls.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope};
use tracing::{debug, info};

use crate::error::SandboxError;
use crate::resolver::{ModuleResolver, ResolveError};
use crate::template::SandboxTemplate;

const SCRIPT_TARGET: &str = "tether_sandbox::script";

/// Upper bounds applied to every engine created by a [`Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Maximum number of operations per evaluation or call. Zero means
    /// unlimited.
    pub max_operations: u64,
    /// Maximum function call nesting.
    pub max_call_levels: usize,
    /// Maximum expression nesting depth.
    pub max_expr_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_expr_depth: 128,
        }
    }
}

/// A named script and where it came from.
#[derive(Debug, Clone)]
pub struct ScriptUnit {
    name: String,
    source: String,
    filename: Option<PathBuf>,
}

impl ScriptUnit {
    /// Creates a unit with no backing file.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            filename: None,
        }
    }

    /// Records the file the source was read from.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the unit's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the script source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the backing file, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    fn metadata(&self) -> Map {
        let mut meta = Map::new();
        meta.insert("name".into(), Dynamic::from(self.name.clone()));
        if let Some(file) = self.filename() {
            meta.insert("filename".into(), Dynamic::from(file.display().to_string()));
            if let Some(dir) = file.parent() {
                meta.insert("dirname".into(), Dynamic::from(dir.display().to_string()));
            }
        }
        meta
    }
}

/// Compiles and evaluates plugin scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sandbox {
    limits: ExecutionLimits,
}

type FailureSlot = Arc<Mutex<Option<(String, ResolveError)>>>;

impl Sandbox {
    /// Creates a sandbox with the given limits.
    #[must_use]
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    /// Evaluates `unit` and returns its exports.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Compile`] for syntax errors,
    /// [`SandboxError::Resolve`] when the failure originated in a `require`
    /// call, and [`SandboxError::Execution`] for any other runtime error.
    pub fn execute(
        &self,
        unit: &ScriptUnit,
        template: &SandboxTemplate,
        resolver: Arc<dyn ModuleResolver>,
    ) -> Result<ScriptModule, SandboxError> {
        let failure = FailureSlot::default();
        let mut engine = self.engine_for(unit.name());
        register_require(&mut engine, resolver, Arc::clone(&failure));

        let ast = engine
            .compile(unit.source())
            .map_err(|error| SandboxError::Compile {
                name: unit.name().to_owned(),
                message: error.to_string(),
            })?;

        let mut scope = Scope::new();
        scope.push("exports", Map::new());
        scope.push_constant("env", template.environment_map());
        scope.push_constant("plugin", unit.metadata());
        for (name, value) in template.globals() {
            scope.push_dynamic(name.clone(), value.clone());
        }

        debug!(target: SCRIPT_TARGET, plugin = unit.name(), "evaluating plugin script");
        let value = match engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast) {
            Ok(value) => value,
            Err(error) => {
                let recorded = failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                return Err(match recorded {
                    Some((request, source)) => SandboxError::Resolve {
                        name: unit.name().to_owned(),
                        request,
                        source,
                    },
                    None => SandboxError::Execution {
                        name: unit.name().to_owned(),
                        message: error.to_string(),
                    },
                });
            }
        };

        let exports = select_exports(scope.get_value::<Dynamic>("exports"), value);
        Ok(ScriptModule {
            name: unit.name().to_owned(),
            exports,
            engine,
            ast,
        })
    }

    fn engine_for(&self, name: &str) -> Engine {
        let mut engine = Engine::new();
        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth);
        engine.disable_symbol("eval");

        let plugin = name.to_owned();
        engine.on_print(move |text| {
            info!(target: SCRIPT_TARGET, plugin = %plugin, "{text}");
        });
        let plugin = name.to_owned();
        engine.on_debug(move |text, source, position| {
            debug!(
                target: SCRIPT_TARGET,
                plugin = %plugin,
                source = source.unwrap_or_default(),
                position = %position,
                "{text}"
            );
        });
        engine
    }
}

fn register_require(engine: &mut Engine, resolver: Arc<dyn ModuleResolver>, failure: FailureSlot) {
    engine.register_fn(
        "require",
        move |request: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            resolver.resolve(request).map_err(|source| {
                let message = format!("require('{request}') failed: {source}");
                let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some((request.to_owned(), source));
                }
                message.into()
            })
        },
    );
}

// An untouched `exports` map defers to the script's final value.
fn select_exports(exports: Option<Dynamic>, value: Dynamic) -> Dynamic {
    let exports = exports.unwrap_or_else(|| Dynamic::from(Map::new()));
    let untouched = exports
        .read_lock::<Map>()
        .is_some_and(|map| map.is_empty());
    if untouched && !value.is_unit() {
        value
    } else {
        exports
    }
}

/// An evaluated plugin script.
///
/// Holds the engine and AST alongside the exports so that script-defined
/// functions and function-pointer exports remain callable.
pub struct ScriptModule {
    name: String,
    exports: Dynamic,
    engine: Engine,
    ast: AST,
}

impl std::fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptModule")
            .field("name", &self.name)
            .field("exports", &self.exports)
            .finish_non_exhaustive()
    }
}

impl ScriptModule {
    /// Returns the name of the plugin that produced this module.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module's exports.
    #[must_use]
    pub fn exports(&self) -> &Dynamic {
        &self.exports
    }

    /// Calls `function` with `args`.
    ///
    /// A function pointer stored under that key in an exported map takes
    /// precedence over a script-level function of the same name. Top-level
    /// statements are not re-run.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Call`] when the function is missing or fails.
    pub fn call(&self, function: &str, args: Vec<Dynamic>) -> Result<Dynamic, SandboxError> {
        let result = match self.exported_function(function) {
            Some(pointer) => pointer.call::<Dynamic>(&self.engine, &self.ast, args),
            None => {
                let mut scope = Scope::new();
                self.engine.call_fn_with_options::<Dynamic>(
                    CallFnOptions::new().eval_ast(false),
                    &mut scope,
                    &self.ast,
                    function,
                    args,
                )
            }
        };
        result.map_err(|error| self.call_error(function, &error))
    }

    /// Invokes the exports themselves when they are a function pointer.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Call`] when the exports are not callable or
    /// the call fails.
    pub fn invoke(&self, args: Vec<Dynamic>) -> Result<Dynamic, SandboxError> {
        let Some(pointer) = self.exports.clone().try_cast::<FnPtr>() else {
            return Err(SandboxError::Call {
                name: self.name.clone(),
                function: String::from("<exports>"),
                message: String::from("exports are not a function"),
            });
        };
        pointer
            .call::<Dynamic>(&self.engine, &self.ast, args)
            .map_err(|error| self.call_error(pointer.fn_name(), &error))
    }

    fn exported_function(&self, function: &str) -> Option<FnPtr> {
        let map = self.exports.read_lock::<Map>()?;
        map.get(function)?.clone().try_cast::<FnPtr>()
    }

    fn call_error(&self, function: &str, error: &EvalAltResult) -> SandboxError {
        SandboxError::Call {
            name: self.name.clone(),
            function: function.to_owned(),
            message: error.to_string(),
        }
    }
}
