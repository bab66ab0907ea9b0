//! Layering tests for configuration files, environment, and CLI flags.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tether_config::{Config, InstallModeSetting, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe under edition 2024; the override is
        // restored in `Drop` while the mutex is still held.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

struct Harness {
    temp_dir: TempDir,
}

impl Harness {
    fn write_config(&self, contents: &str) -> OsString {
        let path = self.temp_dir.path().join("tether.toml");
        fs::write(&path, contents).expect("write configuration");
        path.into_os_string()
    }

    fn args_with_config(&self, contents: &str) -> Vec<OsString> {
        vec![
            OsString::from("tether"),
            OsString::from("--config-path"),
            self.write_config(contents),
        ]
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        temp_dir: TempDir::new().expect("create temp dir"),
    }
}

#[rstest]
fn file_values_override_defaults(harness: Harness) {
    let args = harness.args_with_config(
        r#"
registry_url = "https://registry.example.test"
install_mode = "no-cache"
lock_wait_ms = 500
ignored_dependencies = ["left-pad"]
"#,
    );

    let config = Config::load_from_iter(args).expect("configuration loads");

    assert_eq!(config.registry_url(), "https://registry.example.test");
    assert_eq!(config.install_mode(), InstallModeSetting::NoCache);
    assert_eq!(config.lock_wait_ms(), 500);
    assert_eq!(config.ignored_dependencies(), ["left-pad".to_owned()]);
}

#[rstest]
fn environment_overrides_file(harness: Harness) {
    let args = harness.args_with_config("log_format = \"json\"\nlock_stale_ms = 10\n");
    let _env = EnvOverride::set_var("TETHER_LOCK_STALE_MS", OsStr::new("2500"));

    let config = Config::load_from_iter(args).expect("configuration loads");

    assert_eq!(config.lock_stale_ms(), 2500);
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[rstest]
fn cli_flags_override_environment(harness: Harness) {
    let mut args = harness.args_with_config("registry_url = \"https://file.example.test\"\n");
    args.push(OsString::from("--registry-url"));
    args.push(OsString::from("https://cli.example.test"));
    let _env = EnvOverride::set_var("TETHER_REGISTRY_URL", OsStr::new("https://env.example.test"));

    let config = Config::load_from_iter(args).expect("configuration loads");

    assert_eq!(config.registry_url(), "https://cli.example.test");
}
