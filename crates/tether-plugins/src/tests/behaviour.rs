//! Behaviour-driven tests for the plugin install lifecycle.

use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use super::support::FakeRegistry;
use crate::{LockSettings, ManagerOptions, PluginError, PluginManager, PluginModule};

struct TestWorld {
    _dir: TempDir,
    registry: FakeRegistry,
    manager: PluginManager,
    module: Option<PluginModule>,
    error: Option<PluginError>,
}

#[fixture]
fn world() -> TestWorld {
    let dir = TempDir::new().expect("temp dir");
    let registry = FakeRegistry::default();
    let options = ManagerOptions::new(dir.path()).with_lock_settings(LockSettings {
        wait: Duration::from_secs(10),
        stale: Duration::from_secs(60),
        poll: Duration::from_millis(5),
    });
    let manager = PluginManager::with_registries(
        options,
        registry.boxed(),
        Box::new(FakeRegistry::default()),
    );
    TestWorld {
        _dir: dir,
        registry,
        manager,
        module: None,
        error: None,
    }
}

impl TestWorld {
    fn record<T>(&mut self, result: Result<T, PluginError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.error = Some(error);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("the registry publishes \"{name}\" version \"{version}\" exporting {value}")]
fn given_published(world: &mut TestWorld, name: String, version: String, value: i64) {
    world
        .registry
        .publish(&name, &version, &format!("exports = {value};"));
}

#[given("the registry publishes \"{name}\" version \"{version}\" re-exporting \"{dependency}\"")]
fn given_published_wrapper(world: &mut TestWorld, name: String, version: String, dependency: String) {
    world.registry.publish_with_dependencies(
        &name,
        &version,
        &format!("exports = require(\"{dependency}\");"),
        &[(dependency.as_str(), "*")],
    );
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("\"{name}\" is installed at \"{version}\"")]
fn when_installed(world: &mut TestWorld, name: String, version: String) {
    let result = world.manager.install(&name, Some(&version));
    world.record(result);
}

#[when("\"{name}\" is installed from code \"{code}\"")]
fn when_installed_from_code(world: &mut TestWorld, name: String, code: String) {
    let result = world.manager.install_from_code(&name, &code, None);
    world.record(result);
}

#[when("\"{name}\" is required")]
fn when_required(world: &mut TestWorld, name: String) {
    let result = world.manager.require(&name);
    world.module = world.record(result);
}

#[when("\"{name}\" is uninstalled")]
fn when_uninstalled(world: &mut TestWorld, name: String) {
    let result = world.manager.uninstall(&name);
    world.record(result);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("\"{name}\" is installed at version \"{version}\"")]
fn then_installed_version(world: &mut TestWorld, name: String, version: String) {
    let info = world
        .manager
        .get_info(&name, None)
        .unwrap_or_else(|| panic!("{name} should be installed"));
    assert_eq!(info.version.to_string(), version);
}

#[then("the registry served \"{name}\" {count} times")]
fn then_fetch_count(world: &mut TestWorld, name: String, count: usize) {
    assert_eq!(world.registry.fetch_count(&name), count);
}

#[then("no plugins are installed")]
fn then_nothing_installed(world: &mut TestWorld) {
    assert!(world.error.is_none(), "unexpected error: {:?}", world.error);
    assert!(world.manager.list().is_empty());
}

#[then("requiring \"{name}\" yields {value}")]
fn then_require_yields(world: &mut TestWorld, name: String, value: i64) {
    let module = world.manager.require(&name).expect("plugin loads");
    assert_eq!(module.exports().as_int(), Ok(value));
    if let Some(previous) = &world.module {
        assert!(!PluginModule::ptr_eq(previous, &module));
    }
}

#[then("\"{name}\" is no longer loaded")]
fn then_unloaded(world: &mut TestWorld, name: String) {
    let info = world
        .manager
        .get_info(&name, None)
        .unwrap_or_else(|| panic!("{name} should be installed"));
    assert!(!info.is_loaded());
}

#[then("the operation fails because the plugin is not installed")]
fn then_plugin_not_found(world: &mut TestWorld) {
    let error = world.error.as_ref().expect("operation should have failed");
    assert!(matches!(error, PluginError::PluginNotFound { .. }), "got {error:?}");
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/plugin_lifecycle.feature")]
fn plugin_lifecycle_behaviour(world: TestWorld) {
    let _ = world;
}
