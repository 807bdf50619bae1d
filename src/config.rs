//! Configuration system for accel-exec
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (ACCEL_EXEC_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::executor::{ThreadMode, MAX_CAPACITY};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Task ring and lifecycle settings
    pub executor: ExecutorSettings,

    /// Device settings
    pub device: DeviceSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Task ring and lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Number of task slots in the ring
    pub max_tasks: usize,

    /// Submitting threads: single or multiple
    pub thread_mode: ThreadMode,

    /// How long to wait for the consumer's launch acknowledgement (ms)
    pub start_timeout_ms: u64,

    /// How long stop waits for the shutdown acknowledgement (0 = forever)
    pub stop_timeout_ms: u64,
}

/// Which device runs the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    /// Consumer on a host thread, buffers in simulated device memory
    #[default]
    Host,
}

impl fmt::Display for DeviceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceBackend::Host => write!(f, "host"),
        }
    }
}

/// Device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Device backend
    pub backend: DeviceBackend,

    /// Device memory available to task buffers in MB
    pub heap_mb: u64,

    /// Name of the consumer thread
    pub consumer_thread_name: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// How often the log file rolls over
    pub rotation: LogRotation,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Log file rollover period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

// Default implementations

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_tasks: 128,
            thread_mode: ThreadMode::Multiple,
            start_timeout_ms: 5000,
            stop_timeout_ms: 0, // Wait forever
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            backend: DeviceBackend::Host,
            heap_mb: 256,
            consumer_thread_name: "accel-consumer".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: LogRotation::Daily,
            max_files: 5,
            json_format: false,
        }
    }
}

impl ExecutorSettings {
    /// Bound for the launch acknowledgement wait
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    /// Bound for stop, `None` when stop should block until acknowledged
    pub fn stop_timeout(&self) -> Option<Duration> {
        (self.stop_timeout_ms > 0).then(|| Duration::from_millis(self.stop_timeout_ms))
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Standard locations searched when no path is given
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("accel-exec.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("accel-exec").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".accel-exec").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/accel-exec/config.toml"));
        paths
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Executor settings
        if let Ok(val) = std::env::var("ACCEL_EXEC_MAX_TASKS") {
            if let Ok(n) = val.parse() {
                self.executor.max_tasks = n;
            }
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_THREAD_MODE") {
            if let Ok(mode) = val.parse() {
                self.executor.thread_mode = mode;
            }
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_START_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.executor.start_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_STOP_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.executor.stop_timeout_ms = n;
            }
        }

        // Device settings
        if let Ok(val) = std::env::var("ACCEL_EXEC_HEAP_MB") {
            if let Ok(n) = val.parse() {
                self.device.heap_mb = n;
            }
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_CONSUMER_THREAD") {
            self.device.consumer_thread_name = val;
        }

        // Logging settings
        if let Ok(val) = std::env::var("ACCEL_EXEC_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("ACCEL_EXEC_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.executor.max_tasks == 0 || self.executor.max_tasks > MAX_CAPACITY {
            return Err(Error::config_field_invalid(
                "executor.max_tasks",
                format!("max_tasks must be between 1 and {}", MAX_CAPACITY),
            ));
        }

        if self.executor.start_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "executor.start_timeout_ms",
                "start_timeout_ms must be greater than 0",
            ));
        }

        if self.device.heap_mb == 0 {
            return Err(Error::config_field_invalid(
                "device.heap_mb",
                "heap_mb must be greater than 0",
            ));
        }

        if self.device.consumer_thread_name.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "device.consumer_thread_name",
                "consumer thread name cannot be empty",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("accel-exec")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# accel-exec configuration

[executor]
# Number of task slots in the shared ring
max_tasks = 128

# Submitting threads: "single" (caller guarantees one at a time) or "multiple"
thread_mode = "multiple"

# Wait for the device consumer to acknowledge its launch (milliseconds)
start_timeout_ms = 5000

# Wait for the shutdown acknowledgement on stop (milliseconds, 0 = forever)
stop_timeout_ms = 0

[device]
# Device backend: "host" runs the consumer on a host thread
backend = "host"

# Device memory available to task buffers in MB
heap_mb = 256

# Name of the consumer thread
consumer_thread_name = "accel-consumer"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.local/state/accel-exec/accel-exec.log"

# Log file rollover: hourly, daily, never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
