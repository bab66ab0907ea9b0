//! End-to-end tests for the command runner over a temporary host directory.

use std::ffi::OsString;
use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tether_config::Config;

use crate::config::ConfigLoader;
use crate::errors::AppError;
use crate::run_with_loader;

struct StaticConfigLoader {
    config: Config,
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

struct Host {
    dir: TempDir,
    loader: StaticConfigLoader,
}

struct Outcome {
    status: ExitCode,
    stdout: String,
    stderr: String,
}

impl Host {
    fn run(&self, args: &[&str]) -> Outcome {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let argv = std::iter::once("tether")
            .chain(args.iter().copied())
            .map(OsString::from);
        let status = run_with_loader(argv, &mut stdout, &mut stderr, &self.loader);
        Outcome {
            status,
            stdout: String::from_utf8(stdout).expect("stdout should be UTF-8"),
            stderr: String::from_utf8(stderr).expect("stderr should be UTF-8"),
        }
    }
}

#[fixture]
fn host() -> Host {
    let dir = TempDir::new().expect("create temp dir");
    let cwd = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 temp path");
    let config = Config {
        cwd: Some(cwd),
        lock_wait_ms: Some(5_000),
        ..Config::default()
    };
    Host {
        dir,
        loader: StaticConfigLoader { config },
    }
}

#[rstest]
fn inline_plugins_survive_between_invocations(host: Host) {
    let installed = host.run(&["install", "answer", "code:exports = 42;"]);
    assert_eq!(installed.status, ExitCode::SUCCESS, "{}", installed.stderr);
    assert!(installed.stdout.starts_with("installed answer@0.0.0 at "));

    let ran = host.run(&["run", "require(\"answer\") + 1"]);
    assert_eq!(ran.status, ExitCode::SUCCESS, "{}", ran.stderr);
    assert_eq!(ran.stdout.trim(), "43");
}

#[rstest]
fn list_reports_discovered_plugins(host: Host) {
    host.run(&["install", "first", "code:exports = 1;"]);
    host.run(&["install", "second", "code:exports = 2;"]);

    let listed = host.run(&["list"]);
    assert_eq!(listed.status, ExitCode::SUCCESS, "{}", listed.stderr);
    assert_eq!(listed.stdout, "first@0.0.0\nsecond@0.0.0\n");

    let json = host.run(&["list", "--json"]);
    let entries: serde_json::Value =
        serde_json::from_str(&json.stdout).expect("list --json should emit JSON");
    let names: Vec<&str> = entries
        .as_array()
        .expect("array of plugins")
        .iter()
        .filter_map(|entry| entry.get("name").and_then(serde_json::Value::as_str))
        .collect();
    assert_eq!(names, ["first", "second"]);
}

#[rstest]
fn info_filters_by_range(host: Host) {
    host.run(&["install", "answer", "code:exports = 42;"]);

    let found = host.run(&["info", "answer"]);
    assert_eq!(found.status, ExitCode::SUCCESS, "{}", found.stderr);
    let info: serde_json::Value = serde_json::from_str(&found.stdout).expect("info JSON");
    assert_eq!(info.get("version").and_then(|v| v.as_str()), Some("0.0.0"));
    assert_eq!(info.get("main").and_then(|v| v.as_str()), Some("index.rhai"));

    let filtered = host.run(&["info", "answer", ">=1.0.0"]);
    assert_eq!(filtered.status, ExitCode::FAILURE);
    assert!(filtered.stderr.contains("answer"));
}

#[rstest]
fn install_path_copies_a_package(host: Host) {
    let source = host.dir.path().join("source");
    fs::create_dir_all(&source).expect("create source");
    fs::write(
        source.join("package.json"),
        r#"{ "name": "local", "version": "1.2.3" }"#,
    )
    .expect("write descriptor");
    fs::write(source.join("index.rhai"), "exports = \"local\";").expect("write script");

    let installed = host.run(&["install-path", "source"]);
    assert_eq!(installed.status, ExitCode::SUCCESS, "{}", installed.stderr);
    assert!(installed.stdout.starts_with("installed local@1.2.3 at "));

    let ran = host.run(&["run", "require(\"local\")"]);
    assert_eq!(ran.stdout.trim(), "local");
}

#[rstest]
fn run_reads_scripts_from_files(host: Host) {
    host.run(&["install", "answer", "code:exports = 42;"]);
    let script = host.dir.path().join("script.rhai");
    fs::write(&script, "require(\"answer\") * 2").expect("write script");
    let path = script.to_str().expect("UTF-8 script path");

    let ran = host.run(&["run", "--file", path]);
    assert_eq!(ran.status, ExitCode::SUCCESS, "{}", ran.stderr);
    assert_eq!(ran.stdout.trim(), "84");
}

#[rstest]
fn missing_script_files_are_reported(host: Host) {
    let ran = host.run(&["run", "--file", "/nonexistent/script.rhai"]);
    assert_eq!(ran.status, ExitCode::FAILURE);
    assert!(ran.stderr.contains("/nonexistent/script.rhai"));
}

#[rstest]
fn uninstall_removes_plugins(host: Host) {
    host.run(&["install", "answer", "code:exports = 42;"]);

    let removed = host.run(&["uninstall", "answer"]);
    assert_eq!(removed.status, ExitCode::SUCCESS, "{}", removed.stderr);
    assert_eq!(removed.stdout, "uninstalled answer\n");
    assert_eq!(host.run(&["list"]).stdout, "");

    let missing = host.run(&["uninstall", "answer"]);
    assert_eq!(missing.status, ExitCode::FAILURE);
    assert!(missing.stderr.contains("answer"));
}

#[rstest]
fn uninstall_all_empties_the_plugins_directory(host: Host) {
    host.run(&["install", "first", "code:exports = 1;"]);
    host.run(&["install", "second", "code:exports = 2;"]);

    let removed = host.run(&["uninstall", "--all"]);
    assert_eq!(removed.status, ExitCode::SUCCESS, "{}", removed.stderr);
    assert_eq!(host.run(&["list"]).stdout, "");
}

#[rstest]
fn query_resolves_inline_code_without_installing(host: Host) {
    let queried = host.run(&["query", "answer", "code:exports = 42;"]);
    assert_eq!(queried.status, ExitCode::SUCCESS, "{}", queried.stderr);
    let package: serde_json::Value = serde_json::from_str(&queried.stdout).expect("query JSON");
    assert_eq!(
        package.pointer("/source/kind").and_then(|v| v.as_str()),
        Some("inline")
    );
    assert_eq!(host.run(&["list"]).stdout, "");
}

#[rstest]
fn help_is_written_to_stdout(host: Host) {
    let help = host.run(&["--help"]);
    assert_eq!(help.status, ExitCode::SUCCESS);
    assert!(help.stdout.contains("Usage"));
}

#[rstest]
#[case::unknown_command(&["frobnicate"])]
#[case::missing_name(&["install"])]
#[case::name_and_all(&["uninstall", "answer", "--all"])]
fn usage_errors_fail(host: Host, #[case] args: &[&str]) {
    let outcome = host.run(args);
    assert_eq!(outcome.status, ExitCode::FAILURE);
    assert!(outcome.stdout.is_empty());
    assert!(!outcome.stderr.is_empty());
}

#[rstest]
fn invalid_plugin_names_fail(host: Host) {
    let outcome = host.run(&["install", "Bad Name", "code:exports = 1;"]);
    assert_eq!(outcome.status, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("Bad Name"));
}
