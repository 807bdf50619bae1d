//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides

mod common;

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use accel_exec::config::{AppConfig, LogRotation};
use accel_exec::error::{Error, ErrorCode};
use accel_exec::executor::{ExecutorConfig, ThreadMode};

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn exec_cmd() -> Command {
    Command::cargo_bin("accel-exec").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[executor]

[device]

[logging]
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("max_tasks = 128"))
        .stdout(predicate::str::contains("thread_mode = multiple"));
}

#[test]
fn test_fixture_config_loads() {
    let path = common::valid_config_fixture();
    let config = AppConfig::load(path.to_str()).unwrap();

    assert_eq!(config.executor.max_tasks, 32);
    assert_eq!(config.executor.thread_mode, ThreadMode::Single);
    assert_eq!(config.device.heap_mb, 64);
    assert_eq!(config.device.consumer_thread_name, "fixture-consumer");
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.rotation, LogRotation::Never);

    let executor = ExecutorConfig::from(&config.executor);
    assert_eq!(executor.max_tasks, 32);
    assert_eq!(executor.stop_timeout, Some(std::time::Duration::from_millis(1000)));
}

#[test]
fn test_fixture_config_drives_run() {
    exec_cmd()
        .arg("--config")
        .arg(common::valid_config_fixture())
        .args(["run", "--tasks", "40", "--count", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verified:    yes"));
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_fixture_rejected() {
    let path = common::invalid_config_fixture();
    let err = AppConfig::load(path.to_str()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigValidation);
    assert!(matches!(
        err,
        Error::ConfigValidation { field: Some(ref f), .. } if f == "executor.max_tasks"
    ));

    exec_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("max_tasks"));
}

#[test]
fn test_invalid_thread_mode() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[executor]
thread_mode = "several"
"#,
    );

    let err = AppConfig::load(Some(fixture.path())).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
    assert_eq!(err.exit_code(), 10);
}

#[test]
fn test_invalid_heap_size() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[device]
heap_mb = 0
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("heap_mb"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "loud"
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid log level"));
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[executor
max_tasks = 16
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E101"));
}

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[executor]
max_tasks = 512
stop_timeout_ms = 750

[device]
consumer_thread_name = "ring-consumer"
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(fixture.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("max_tasks = 512"))
        .stdout(predicate::str::contains("stop_timeout_ms = 750"))
        .stdout(predicate::str::contains("ring-consumer"));
}

// ─────────────────────────────────────────────────────────────────
// Config Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("new_config.toml");

    exec_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(config_path.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    assert!(config_path.exists());

    // The generated file must itself be valid
    let config = AppConfig::load(config_path.to_str()).unwrap();
    assert_eq!(config.executor.max_tasks, 128);
    assert_eq!(config.executor.stop_timeout(), None);
}

#[test]
fn test_config_init_refuses_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[executor]\n");

    exec_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(fixture.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[executor]\nmax_tasks = 7\n");

    exec_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(fixture.path())
        .arg("--force")
        .assert()
        .success();

    let content = fs::read_to_string(fixture.path()).unwrap();
    assert!(!content.contains("max_tasks = 7"));
    assert!(content.contains("max_tasks = 128"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_override_executor() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[executor]
max_tasks = 16
thread_mode = "multiple"
"#,
    );

    exec_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(fixture.path())
        .env("ACCEL_EXEC_MAX_TASKS", "96")
        .env("ACCEL_EXEC_THREAD_MODE", "single")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_tasks = 96"))
        .stdout(predicate::str::contains("thread_mode = \"single\""));
}

#[test]
fn test_env_override_is_validated() {
    exec_cmd()
        .arg("config")
        .arg("validate")
        .env("ACCEL_EXEC_MAX_TASKS", "0")
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_env_config_path() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[executor]\nmax_tasks = 24\n");

    exec_cmd()
        .arg("config")
        .arg("validate")
        .env("ACCEL_EXEC_CONFIG", fixture.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("max_tasks = 24"));
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_log_file_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
file = "~/accel-exec/exec.log"
"#,
    );

    let config = AppConfig::load(Some(fixture.path())).unwrap();
    let file = config.logging.file.unwrap();
    assert!(!file.starts_with('~'));
    assert!(file.ends_with("accel-exec/exec.log"));
}
