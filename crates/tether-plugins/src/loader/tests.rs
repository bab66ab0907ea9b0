//! Unit tests for plugin loading and require resolution.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rstest::{fixture, rstest};
use semver::Version;
use tempfile::TempDir;
use tether_sandbox::SandboxTemplate;
use tether_sandbox::rhai::Dynamic;

use super::*;
use crate::options::ManagerOptions;

struct Harness {
    dir: TempDir,
    table: Arc<PluginTable>,
}

impl Harness {
    fn loader(&self, options: ManagerOptions) -> PluginLoader {
        PluginLoader::new(Arc::clone(&self.table), Arc::new(options))
    }

    fn default_loader(&self) -> PluginLoader {
        self.loader(ManagerOptions::new(self.dir.path()))
    }

    fn install(&self, name: &str, dependencies: &[&str], files: &[(&str, &str)]) {
        let location = self.dir.path().join(name);
        for (relative, contents) in files {
            let path = location.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("create plugin dir");
            }
            fs::write(path, contents).expect("write plugin file");
        }
        self.table.upsert(PluginInfo {
            name: name.to_owned(),
            version: Version::new(1, 0, 0),
            location,
            main: String::from("index.rhai"),
            dependencies: dependencies
                .iter()
                .map(|dep| ((*dep).to_owned(), String::from("*")))
                .collect::<BTreeMap<_, _>>(),
            description: None,
            module: None,
        });
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        dir: TempDir::new().expect("temp dir"),
        table: Arc::new(PluginTable::default()),
    }
}

#[rstest]
fn load_is_idempotent(harness: Harness) {
    harness.install("counter", &[], &[("index.rhai", "exports = 42;")]);
    let loader = harness.default_loader();

    let first = loader.load("counter").expect("first load");
    let second = loader.load("counter").expect("second load");

    assert_eq!(first.exports().as_int(), Ok(42));
    assert!(PluginModule::ptr_eq(&first, &second));
    assert!(harness.table.get("counter").expect("installed").is_loaded());
}

#[rstest]
fn concurrent_first_loads_share_one_handle(harness: Harness) {
    harness.install("counter", &[], &[("index.rhai", "exports = 42;")]);
    let loader = harness.default_loader();

    let (left, right) = std::thread::scope(|scope| {
        let left = scope.spawn(|| loader.load("counter"));
        let right = scope.spawn(|| loader.load("counter"));
        (
            left.join().expect("left thread"),
            right.join().expect("right thread"),
        )
    });

    let left = left.expect("left load");
    let right = right.expect("right load");
    assert!(PluginModule::ptr_eq(&left, &right));
}

#[rstest]
fn unload_evicts_the_cached_handle(harness: Harness) {
    harness.install("counter", &[], &[("index.rhai", "exports = 1;")]);
    let loader = harness.default_loader();
    let first = loader.load("counter").expect("load");

    assert!(loader.unload("counter"));
    assert!(!loader.unload("counter"));
    let second = loader.load("counter").expect("reload");
    assert!(!PluginModule::ptr_eq(&first, &second));
}

#[rstest]
fn loading_unknown_plugin_fails(harness: Harness) {
    let error = harness.default_loader().load("ghost").expect_err("not installed");
    assert!(matches!(error, PluginError::PluginNotFound { .. }));
}

#[rstest]
fn plugins_require_installed_siblings(harness: Harness) {
    harness.install("b", &[], &[("index.rhai", "exports.value = 20;")]);
    harness.install(
        "a",
        &["b"],
        &[("index.rhai", "let b = require(\"b\"); exports = b.value + 22;")],
    );

    let module = harness.default_loader().load("a").expect("load a");
    assert_eq!(module.exports().as_int(), Ok(42));
    assert!(harness.table.get("b").expect("installed").is_loaded());
}

#[rstest]
fn relative_requires_stay_inside_the_plugin(harness: Harness) {
    harness.install(
        "a",
        &[],
        &[
            ("index.rhai", "exports = require(\"./lib/util\").base * 2;"),
            ("lib/util.rhai", "exports.base = 21;"),
        ],
    );
    fs::write(harness.path().join("secret.rhai"), "exports = 0;").expect("write outside file");
    harness.install("escape", &[], &[("index.rhai", "require(\"../secret.rhai\")")]);

    let loader = harness.default_loader();
    assert_eq!(loader.load("a").expect("load a").exports().as_int(), Ok(42));
    let error = loader.load("escape").expect_err("escape blocked");
    assert!(matches!(error, PluginError::ModuleNotFound { ref request, .. } if request == "../secret.rhai"));
}

#[rstest]
fn entry_scripts_stay_inside_the_plugin(harness: Harness) {
    fs::write(harness.path().join("outside.rhai"), "exports = \"outside\";")
        .expect("write outside file");
    harness.install("evil", &[], &[("index.rhai", "exports = \"inside\";")]);
    let mut info = harness.table.get("evil").expect("installed");
    info.main = String::from("../outside.rhai");
    harness.table.upsert(info);

    let error = harness
        .default_loader()
        .load("evil")
        .expect_err("entry outside the package blocked");
    assert!(matches!(error, PluginError::Descriptor { .. }));
}

#[rstest]
fn sub_path_requests_run_only_the_named_file(harness: Harness) {
    harness.install(
        "tools",
        &[],
        &[
            ("index.rhai", "throw \"main should not run\";"),
            ("lib/extra.rhai", "exports = \"extra\";"),
        ],
    );
    let module = harness
        .default_loader()
        .require("tools/lib/extra.rhai")
        .expect("sub-path require");
    assert_eq!(module.exports().clone().into_string().as_deref(), Ok("extra"));
    assert!(!harness.table.get("tools").expect("installed").is_loaded());
}

#[rstest]
fn missing_modules_are_reported(harness: Harness) {
    harness.install("a", &[], &[("index.rhai", "require(\"nowhere\")")]);
    let error = harness.default_loader().load("a").expect_err("missing module");
    let PluginError::ModuleNotFound { request, requester } = error else {
        panic!("expected module not found, got {error:?}");
    };
    assert_eq!(request, "nowhere");
    assert_eq!(requester, "a");
}

#[rstest]
fn static_and_host_modules_resolve(harness: Harness) {
    harness.install(
        "a",
        &[],
        &[("index.rhai", "exports = require(\"config\") + require(\"host\");")],
    );
    let options = ManagerOptions::new(harness.path())
        .with_static_dependency("config", Dynamic::from(40_i64))
        .with_host_module("host", Dynamic::from(2_i64));

    let module = harness.loader(options).load("a").expect("load a");
    assert_eq!(module.exports().as_int(), Ok(42));
}

#[rstest]
fn host_modules_are_hidden_when_disabled(harness: Harness) {
    harness.install("a", &[], &[("index.rhai", "require(\"host\")")]);
    let options = ManagerOptions::new(harness.path())
        .with_host_module("host", Dynamic::from(2_i64))
        .with_core_modules(false);

    let error = harness.loader(options).load("a").expect_err("host hidden");
    assert!(matches!(error, PluginError::ModuleNotFound { .. }));
}

#[rstest]
fn circular_requires_fail_instead_of_recursing(harness: Harness) {
    harness.install("a", &["b"], &[("index.rhai", "exports = require(\"b\");")]);
    harness.install("b", &["a"], &[("index.rhai", "exports = require(\"a\");")]);

    let error = harness.default_loader().load("a").expect_err("cycle detected");
    let PluginError::SandboxExecution { message, .. } = error else {
        panic!("expected sandbox execution error, got {error:?}");
    };
    assert!(message.contains("circular require: a -> b -> a"));
}

#[rstest]
fn script_errors_become_sandbox_execution_errors(harness: Harness) {
    harness.install("broken", &[], &[("index.rhai", "let = ;")]);
    let error = harness.default_loader().load("broken").expect_err("compile fails");
    assert!(matches!(error, PluginError::SandboxExecution { ref name, .. } if name == "broken"));
}

#[rstest]
fn per_plugin_templates_override_the_default(harness: Harness) {
    harness.install("env-reader", &[], &[("index.rhai", "exports = env.MODE;")]);
    let options = ManagerOptions::new(harness.path())
        .with_sandbox(SandboxTemplate::isolated().with_env("MODE", "default"));
    let loader = harness.loader(options);
    loader.set_sandbox_template(
        "env-reader",
        Some(SandboxTemplate::isolated().with_env("MODE", "custom")),
    );

    let module = loader.load("env-reader").expect("load");
    assert_eq!(module.exports().clone().into_string().as_deref(), Ok("custom"));
    assert!(loader.sandbox_template("env-reader").is_some());

    loader.set_sandbox_template("env-reader", None);
    assert!(loader.sandbox_template("env-reader").is_none());
}

#[rstest]
fn run_script_can_require_installed_plugins(harness: Harness) {
    harness.install("b", &[], &[("index.rhai", "fn twice(x) { x * 2 } exports = 21;")]);
    let value = harness
        .default_loader()
        .run_script("require(\"b\") * 2")
        .expect("script runs");
    assert_eq!(value.as_int(), Ok(42));
}

#[rstest]
fn module_functions_are_callable(harness: Harness) {
    harness.install("math", &[], &[("index.rhai", "fn double(x) { x * 2 }")]);
    let module = harness.default_loader().load("math").expect("load");
    let value = module
        .call("double", vec![Dynamic::from(21_i64)])
        .expect("call succeeds");
    assert_eq!(value.as_int(), Ok(42));
}
