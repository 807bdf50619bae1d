//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use accel_exec::device::{MockDevice, MockDeviceConfig};
use accel_exec::executor::{Executor, ExecutorConfig, ThreadMode};
use accel_exec::types::{DevicePtr, TaskArgs};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Executor over a manually stepped mock device
pub fn mock_executor(
    max_tasks: usize,
    thread_mode: ThreadMode,
    device: MockDeviceConfig,
) -> (Executor, Arc<MockDevice>) {
    let device = Arc::new(MockDevice::with_config(device));
    let executor = Executor::new(
        ExecutorConfig {
            max_tasks,
            thread_mode,
            ..Default::default()
        },
        device.clone(),
    )
    .unwrap();
    (executor, device)
}

/// Copy task whose source address identifies the submitter
pub fn tagged_copy(writer: u64, n: u64) -> TaskArgs {
    TaskArgs::copy(
        DevicePtr::new(0x1000),
        DevicePtr::new((writer << 32) | n),
        64,
    )
}

/// Stop an executor whose consumer is a mock device, stepping it meanwhile
pub fn stop_stepping(executor: &Executor, device: &MockDevice) {
    std::thread::scope(|s| {
        s.spawn(|| device.run_until_shutdown());
        executor.stop().unwrap();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
