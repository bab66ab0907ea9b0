//! Unit tests for manager options.

use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;
use tether_config::Config;

use super::*;

#[rstest]
#[case("left-pad", "left-pad", true)]
#[case("left-pad", "left-pad2", false)]
#[case("/^left-/", "left-pad", true)]
#[case("/^left-/", "pad-left", false)]
#[case("/", "/", true)]
fn dependency_patterns_match(#[case] pattern: &str, #[case] name: &str, #[case] expected: bool) {
    let pattern = DependencyPattern::parse(pattern).expect("valid pattern");
    assert_eq!(pattern.matches(name), expected);
}

#[test]
fn invalid_expressions_are_configuration_errors() {
    let error = DependencyPattern::parse("/(unclosed/").expect_err("invalid");
    assert!(matches!(error, PluginError::Configuration { .. }));
}

#[test]
fn defaults_install_under_cwd_and_ignore_type_packages() {
    let options = ManagerOptions::new("/srv/app");
    assert_eq!(options.plugins_path, PathBuf::from("/srv/app/plugin_packages"));
    assert!(options.is_ignored("@types/node"));
    assert!(!options.is_ignored("node"));
    assert!(options.require_core_modules);
    assert_eq!(options.install_mode, InstallMode::UseCache);
}

#[test]
fn host_modules_respect_the_toggle() {
    let options = ManagerOptions::new("/srv/app").with_host_module("fs", Dynamic::UNIT);
    assert!(options.is_host_module("fs"));
    assert!(!options.clone().with_core_modules(false).is_host_module("fs"));
}

#[rstest]
#[case("plugins", "/srv/app/plugins")]
#[case("/var/plugins", "/var/plugins")]
fn relative_paths_resolve_against_cwd(#[case] input: &str, #[case] expected: &str) {
    let options = ManagerOptions::new("/srv/app");
    assert_eq!(options.resolve(Path::new(input)), PathBuf::from(expected));
}

#[test]
fn from_config_applies_every_setting() {
    let config = Config {
        cwd: Some(Utf8PathBuf::from("/srv/app")),
        plugins_path: Some(Utf8PathBuf::from("vendor/plugins")),
        registry_url: Some("https://registry.example.test".into()),
        registry_token: Some("secret".into()),
        install_mode: Some(tether_config::InstallModeSetting::NoCache),
        require_core_modules: Some(false),
        ignored_dependencies: vec!["left-pad".into(), "/^internal-/".into()],
        lock_wait_ms: Some(250),
        lock_stale_ms: Some(500),
        ..Config::default()
    };

    let options = ManagerOptions::from_config(&config).expect("valid config");

    assert_eq!(options.plugins_path, PathBuf::from("/srv/app/vendor/plugins"));
    assert_eq!(options.registry_url, "https://registry.example.test");
    assert_eq!(
        options.registry_config.auth,
        Some(RegistryAuth::Token("secret".into()))
    );
    assert_eq!(options.install_mode, InstallMode::NoCache);
    assert!(!options.require_core_modules);
    assert!(options.is_ignored("left-pad"));
    assert!(options.is_ignored("internal-tools"));
    assert_eq!(options.lock.wait, Duration::from_millis(250));
    assert_eq!(options.lock.stale, Duration::from_millis(500));
}

#[test]
fn from_config_rejects_zero_stale_threshold() {
    let config = Config {
        lock_stale_ms: Some(0),
        ..Config::default()
    };
    let error = ManagerOptions::from_config(&config).expect_err("invalid config");
    assert!(matches!(error, PluginError::Configuration { .. }));
}
