//! Device trait definitions
//!
//! Defines the boundary between the executor and whatever runs the
//! persistent consumer: a real accelerator, a host thread, or a test double.

use std::sync::Arc;

use thiserror::Error;

use crate::error::Result;
use crate::executor::SharedQueue;
use crate::types::{DevicePtr, TaskArgs};

// ─────────────────────────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────────────────────────

/// Static description of a device
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Name of the device backend
    pub name: &'static str,

    /// Whether the consumer runs on host threads
    pub simulated: bool,

    /// Device memory available to task buffers, if bounded
    pub memory_bytes: Option<u64>,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            name: "unknown",
            simulated: false,
            memory_bytes: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// DeviceContext Trait
// ─────────────────────────────────────────────────────────────────

/// Execution context able to host one persistent consumer
///
/// The trait is object-safe; executors hold it as `Arc<dyn DeviceContext>`.
pub trait DeviceContext: Send + Sync {
    /// Get the device name (e.g., "host", "mock")
    fn name(&self) -> &'static str;

    /// Get the device capabilities
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            name: self.name(),
            ..Default::default()
        }
    }

    /// Launch a consumer that polls `queue` until it acknowledges shutdown
    ///
    /// Fails with `ResourceExhaustion` when the consumer cannot be started.
    fn launch_persistent_consumer(&self, queue: Arc<SharedQueue>) -> Result<()>;

    /// Report a sticky device-level fault as `DeviceFault`
    fn last_device_error(&self) -> Result<()>;

    /// Release the execution context of a consumer that acknowledged shutdown
    fn reclaim_consumer(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Kernels
// ─────────────────────────────────────────────────────────────────

/// Per-task execution failure; marks the task `Failed`, not the device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("invalid device pointer {0}")]
    InvalidPointer(DevicePtr),

    #[error("range of {len} bytes at {ptr} exceeds its allocation")]
    OutOfBounds { ptr: DevicePtr, len: usize },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("malformed task: {0}")]
    Malformed(String),
}

/// Executes the body of one task
pub trait TaskKernel: Send {
    fn execute(&mut self, args: &TaskArgs) -> std::result::Result<(), KernelError>;
}

impl<K: TaskKernel + ?Sized> TaskKernel for Box<K> {
    fn execute(&mut self, args: &TaskArgs) -> std::result::Result<(), KernelError> {
        (**self).execute(args)
    }
}
