//! Build script for accel-exec
//!
//! Embeds the git revision, build timestamp, target triple, profile and
//! compiler version as `ACCEL_EXEC_*` compile-time variables read by
//! `src/version.rs`.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let dirty = match command_stdout("git", &["status", "--porcelain"]) {
        Some(status) => (!status.is_empty()).to_string(),
        None => "unknown".to_string(),
    };

    let vars = [
        ("GIT_HASH", or_unknown(command_stdout("git", &["rev-parse", "--short=8", "HEAD"]))),
        ("GIT_BRANCH", or_unknown(command_stdout("git", &["rev-parse", "--abbrev-ref", "HEAD"]))),
        ("GIT_DIRTY", dirty),
        (
            "BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("TARGET", or_unknown(env::var("TARGET").ok())),
        ("PROFILE", or_unknown(env::var("PROFILE").ok())),
        ("RUSTC_VERSION", or_unknown(command_stdout("rustc", &["--version"]))),
    ];

    for (name, value) in vars {
        println!("cargo:rustc-env=ACCEL_EXEC_{}={}", name, value);
    }
}

/// Trimmed stdout of a successful command
fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| "unknown".to_string())
}
