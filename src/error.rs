//! Error types for the accelerator executor
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Per-task device failures are not errors of this type: they surface as
//! `TaskStatus::Failed` on the task's slot.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskKind;

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    SerializationError = 204,

    // Submission errors (3xx)
    UnsupportedOperation = 300,
    QueueFull = 301,
    InvalidArgument = 302,
    StaleHandle = 303,

    // Lifecycle errors (4xx)
    ProtocolViolation = 400,
    StopTimeout = 401,

    // Device errors (5xx)
    DeviceFault = 500,
    ResourceExhaustion = 501,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Submission errors
            400..=499 => 40, // Lifecycle errors
            500..=599 => 50, // Device errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the executor
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Submission Errors
    // ─────────────────────────────────────────────────────────────

    /// Task kind, operator or datatype the executor cannot run
    #[error("Unsupported {kind} task: {reason}")]
    UnsupportedOperation { kind: TaskKind, reason: String },

    /// Target ring slot still holds a task the device has not finished
    #[error("Task queue full: slot {slot} of {capacity} is still in flight")]
    QueueFull { capacity: usize, slot: usize },

    /// Malformed argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Handle whose slot has been reused or whose executor restarted
    #[error("Stale task handle: slot {slot} no longer holds task {seq}")]
    StaleHandle { slot: usize, seq: u64 },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────

    /// Operation called in a state that does not allow it
    #[error("Protocol violation in {operation}: {message}")]
    ProtocolViolation {
        operation: &'static str,
        message: String,
    },

    /// Device did not acknowledge shutdown in time
    #[error("Device did not acknowledge shutdown within {timeout_ms}ms")]
    StopTimeout { timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Device Errors
    // ─────────────────────────────────────────────────────────────

    /// Sticky device-level error
    #[error("Device {device} fault: {message}")]
    DeviceFault { device: String, message: String },

    /// Device memory or launch resources exhausted
    #[error("Resource exhausted: {message}")]
    ResourceExhaustion { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) | Error::Json(_) => ErrorCode::SerializationError,

            Error::UnsupportedOperation { .. } => ErrorCode::UnsupportedOperation,
            Error::QueueFull { .. } => ErrorCode::QueueFull,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::StaleHandle { .. } => ErrorCode::StaleHandle,

            Error::ProtocolViolation { .. } => ErrorCode::ProtocolViolation,
            Error::StopTimeout { .. } => ErrorCode::StopTimeout,

            Error::DeviceFault { .. } => ErrorCode::DeviceFault,
            Error::ResourceExhaustion { .. } => ErrorCode::ResourceExhaustion,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::QueueFull { .. }
                | Error::StopTimeout { .. }
                | Error::Io(_)
                | Error::IoRead { .. }
                | Error::IoWrite { .. }
        )
    }

    /// Check if the error is fatal (the executor cannot continue)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::DeviceFault { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'accel-exec config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check the configuration file syntax. Run 'accel-exec config validate' for details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::UnsupportedOperation { .. } => Some(
                "Only the sum operator on float32, float64 and int32 buffers is offloaded."
            ),
            Error::QueueFull { .. } => Some(
                "Wait for earlier tasks to complete, or raise 'executor.max_tasks'."
            ),
            Error::StaleHandle { .. } => Some(
                "Test task handles before the ring wraps around to their slot again."
            ),

            Error::ProtocolViolation { .. } => Some(
                "Check the executor lifecycle: start, submit and test, stop, then finalize."
            ),
            Error::StopTimeout { .. } => Some(
                "Tasks are still draining. Retry stop or raise 'executor.stop_timeout_ms'."
            ),

            Error::DeviceFault { .. } => Some(
                "The device consumer faulted. Stop the executor to reclaim it, then start again."
            ),
            Error::ResourceExhaustion { .. } => Some(
                "Free device buffers or raise 'device.heap_mb' in config."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(kind: TaskKind, reason: impl Into<String>) -> Self {
        Error::UnsupportedOperation {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol(operation: &'static str, message: impl Into<String>) -> Self {
        Error::ProtocolViolation {
            operation,
            message: message.into(),
        }
    }

    /// Create a device fault error
    pub fn device_fault(device: impl Into<String>, message: impl Into<String>) -> Self {
        Error::DeviceFault {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a resource exhaustion error
    pub fn exhausted(message: impl Into<String>) -> Self {
        Error::ResourceExhaustion {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
