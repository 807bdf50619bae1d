//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the accel-exec binary
fn exec_cmd() -> Command {
    Command::cargo_bin("accel-exec").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    exec_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("task executor"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("benchmark"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    exec_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("accel-exec"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_version_json() {
    let output = exec_cmd().args(["version", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "accel-exec");
    assert!(value["version"].is_string());
}

#[test]
fn test_short_version_flag() {
    exec_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("accel-exec"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    exec_cmd()
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[executor]"))
        .stdout(predicate::str::contains("[device]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("max_tasks"));
}

#[test]
fn test_config_validate_default() {
    // Default config should always be valid
    exec_cmd()
        .arg("config")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    exec_cmd()
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .arg("config")
        .arg("validate")
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_config_init_help() {
    exec_cmd()
        .arg("config")
        .arg("init")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Benchmark Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_benchmark_help() {
    exec_cmd()
        .arg("benchmark")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--iterations"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_benchmark_small_run() {
    exec_cmd()
        .args(["benchmark", "-i", "1", "-t", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("copy_multi"))
        .stdout(predicate::str::contains("reduce_strided"))
        .stdout(predicate::str::contains("Completed in"));
}

#[test]
fn test_benchmark_writes_results() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("results.json");

    exec_cmd()
        .args(["benchmark", "-i", "1", "-t", "8", "--output"])
        .arg(&output)
        .assert()
        .success();

    let content = std::fs::read_to_string(&output).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["device"], "host");
    assert_eq!(value["kinds"].as_array().unwrap().len(), 5);
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    exec_cmd()
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--kind"))
        .stdout(predicate::str::contains("--thread-mode"))
        .stdout(predicate::str::contains("--max-tasks"));
}

#[test]
fn test_run_small_workload() {
    exec_cmd()
        .args(["run", "--tasks", "64", "--count", "64", "--max-tasks", "8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted:   64"))
        .stdout(predicate::str::contains("Verified:    yes"))
        .stdout(predicate::str::contains("SHA-256:"));
}

#[test]
fn test_run_reduction_with_submitters() {
    exec_cmd()
        .args([
            "run",
            "--kind",
            "reduce",
            "--dtype",
            "float64",
            "--sources",
            "4",
            "--tasks",
            "48",
            "--count",
            "32",
            "--submitters",
            "3",
            "--max-tasks",
            "4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Verified:    yes"));
}

#[test]
fn test_run_json_report() {
    let output = exec_cmd()
        .args(["run", "--kind", "reduce-multi-dst", "--dtype", "int32"])
        .args(["--tasks", "20", "--count", "16", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["kind"], "reduce_multi_dst");
    assert_eq!(value["submitted"], 20);
    assert_eq!(value["failed"], 0);
    assert_eq!(value["mismatches"], 0);
    assert_eq!(value["digest"].as_str().unwrap().len(), 64);
}

#[test]
fn test_run_unsupported_reduction() {
    exec_cmd()
        .args(["run", "--kind", "reduce", "--op", "prod", "--tasks", "4"])
        .assert()
        .failure()
        .code(30)
        .stderr(predicate::str::contains("E300"));
}

#[test]
fn test_run_single_mode_with_many_submitters() {
    exec_cmd()
        .args(["run", "--thread-mode", "single", "--submitters", "2", "--tasks", "4"])
        .assert()
        .failure()
        .code(30);
}

#[test]
fn test_run_with_invalid_capacity() {
    exec_cmd()
        .args(["run", "--max-tasks", "0"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("max_tasks"));
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    exec_cmd()
        .args(["-v", "run", "--tasks", "8", "--count", "8"])
        .assert()
        .success();
}

#[test]
fn test_very_verbose_flag() {
    exec_cmd()
        .args(["-vv", "run", "--tasks", "8", "--count", "8"])
        .assert()
        .success();
}

#[test]
fn test_quiet_flag() {
    exec_cmd()
        .args(["--quiet", "run", "--tasks", "8", "--count", "8"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    exec_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    exec_cmd().assert().failure();
}
