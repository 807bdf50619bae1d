//! accel-exec: persistent accelerator task executor
//!
//! A host/device shared task ring for copy and reduction offload. The host
//! publishes fixed-layout task arguments into preallocated slots; a single
//! long-lived consumer on the device polls the ring, executes each task and
//! marks it complete.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use accel_exec::device::HostDevice;
//! use accel_exec::executor::{Executor, ExecutorConfig};
//! use accel_exec::types::{DevicePtr, TaskArgs};
//!
//! # fn main() -> accel_exec::Result<()> {
//! let device = Arc::new(HostDevice::new());
//! let executor = Executor::new(ExecutorConfig::default(), device)?;
//! executor.start()?;
//! // stop needs the consumer's launch acknowledgement
//! executor.wait_until_running(Duration::from_secs(5))?;
//!
//! let args = TaskArgs::copy(DevicePtr::new(0x1000), DevicePtr::new(0x2000), 64);
//! let handle = executor.submit(args)?;
//! let _status = executor.wait(&handle, Duration::from_secs(5))?;
//! executor.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod logging;
pub mod system;
pub mod types;
pub mod version;

pub use error::{Error, ErrorCode, Result};
