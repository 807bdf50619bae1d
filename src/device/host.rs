//! Host-simulated device
//!
//! Runs the persistent consumer on a dedicated OS thread and executes tasks
//! with the reference kernels against a [`DeviceHeap`]. A panicking consumer
//! is treated like a crashed device: the fault stays visible through
//! `last_device_error` and the executor is moved to `ShutdownAck` so `stop`
//! can reclaim it. Reclaiming clears the fault.
//!
//! Catching the panic needs `panic = "unwind"`. Under `panic = "abort"` a
//! consumer panic terminates the process.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::DeviceSettings;
use crate::error::{Error, Result};
use crate::executor::SharedQueue;

use super::{
    DeviceCapabilities, DeviceContext, DeviceHeap, HostKernels, PersistentConsumer, TaskKernel,
};

/// Builds the kernel a freshly launched consumer executes tasks with
pub type KernelFactory = Arc<dyn Fn(Arc<DeviceHeap>) -> Box<dyn TaskKernel> + Send + Sync>;

/// Configuration of a [`HostDevice`]
#[derive(Debug, Clone)]
pub struct HostDeviceConfig {
    /// Device memory limit in bytes
    pub heap_bytes: usize,

    /// Name given to the consumer thread
    pub thread_name: String,
}

impl Default for HostDeviceConfig {
    fn default() -> Self {
        Self {
            heap_bytes: 256 * 1024 * 1024,
            thread_name: "accel-consumer".to_string(),
        }
    }
}

impl From<&DeviceSettings> for HostDeviceConfig {
    fn from(settings: &DeviceSettings) -> Self {
        Self {
            heap_bytes: settings.heap_mb as usize * 1024 * 1024,
            thread_name: settings.consumer_thread_name.clone(),
        }
    }
}

/// Device whose consumer is a host thread
pub struct HostDevice {
    config: HostDeviceConfig,
    heap: Arc<DeviceHeap>,
    kernels: KernelFactory,
    worker: Mutex<Option<JoinHandle<u64>>>,
    fault: Arc<RwLock<Option<String>>>,
}

impl HostDevice {
    /// Create a host device with default configuration
    pub fn new() -> Self {
        Self::with_config(HostDeviceConfig::default())
    }

    pub fn with_config(config: HostDeviceConfig) -> Self {
        let kernels: KernelFactory = Arc::new(|heap: Arc<DeviceHeap>| -> Box<dyn TaskKernel> {
            Box::new(HostKernels::new(heap))
        });
        Self::with_kernels(config, kernels)
    }

    /// Run consumers with kernels built by `kernels` instead of [`HostKernels`]
    pub fn with_kernels(config: HostDeviceConfig, kernels: KernelFactory) -> Self {
        Self {
            heap: Arc::new(DeviceHeap::new(config.heap_bytes)),
            kernels,
            config,
            worker: Mutex::new(None),
            fault: Arc::new(RwLock::new(None)),
        }
    }

    /// Memory that task arguments point into
    pub fn heap(&self) -> &Arc<DeviceHeap> {
        &self.heap
    }

    /// Whether a consumer thread exists and has not been reclaimed
    pub fn consumer_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for HostDevice {
    fn name(&self) -> &'static str {
        "host"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            name: "host",
            simulated: true,
            memory_bytes: Some(self.heap.limit_bytes() as u64),
        }
    }

    fn launch_persistent_consumer(&self, queue: Arc<SharedQueue>) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(Error::exhausted("host consumer thread has not been reclaimed"));
        }
        if let Some(message) = self.fault.read().as_ref() {
            return Err(Error::exhausted(format!("device fault not cleared: {}", message)));
        }

        let kernel = (self.kernels)(self.heap.clone());
        let mut consumer = PersistentConsumer::attach(queue.clone(), kernel)?;
        let fault = self.fault.clone();

        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || match panic::catch_unwind(AssertUnwindSafe(|| consumer.run())) {
                Ok(consumed) => consumed,
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "consumer panicked".to_string());
                    error!(error = %message, "Host consumer crashed");
                    *fault.write() = Some(message);
                    drop(consumer);
                    queue.acknowledge_shutdown();
                    0
                }
            })
            .map_err(|e| Error::exhausted(format!("failed to spawn consumer thread: {}", e)))?;

        debug!(thread = %self.config.thread_name, "Host consumer launched");
        *worker = Some(handle);
        Ok(())
    }

    fn last_device_error(&self) -> Result<()> {
        match self.fault.read().as_ref() {
            Some(message) => Err(Error::device_fault(self.name(), message.clone())),
            None => Ok(()),
        }
    }

    fn reclaim_consumer(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };

        let consumed = handle
            .join()
            .map_err(|_| Error::device_fault(self.name(), "consumer thread could not be joined"))?;

        match self.fault.write().take() {
            Some(message) => warn!(error = %message, "Crashed host consumer reclaimed"),
            None => info!(consumed, "Host consumer reclaimed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorState, ThreadMode};

    #[test]
    fn test_capabilities() {
        let device = HostDevice::with_config(HostDeviceConfig {
            heap_bytes: 4096,
            ..Default::default()
        });
        let caps = device.capabilities();
        assert_eq!(caps.name, "host");
        assert!(caps.simulated);
        assert_eq!(caps.memory_bytes, Some(4096));
        assert!(device.last_device_error().is_ok());
    }

    #[test]
    fn test_reclaim_without_consumer_is_noop() {
        let device = HostDevice::new();
        assert!(!device.consumer_running());
        assert!(device.reclaim_consumer().is_ok());
    }

    #[test]
    fn test_launch_refused_while_fault_recorded() {
        let device = HostDevice::new();
        let queue = Arc::new(SharedQueue::new(2, ThreadMode::Multiple).unwrap());
        *device.fault.write() = Some("consumer panicked".to_string());

        let err = device.launch_persistent_consumer(queue.clone()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ResourceExhaustion);
        assert!(!device.consumer_running());
        assert!(!queue.consumer_attached());
        assert!(device.last_device_error().is_err());
    }

    #[test]
    fn test_second_launch_rejected_until_reclaimed() {
        let device = HostDevice::new();
        let queue = Arc::new(SharedQueue::new(2, ThreadMode::Multiple).unwrap());
        {
            let lease = queue.lease("start").unwrap();
            queue.reset(&lease);
            queue.set_state(&lease, ExecutorState::Posted);
        }

        device.launch_persistent_consumer(queue.clone()).unwrap();
        assert!(device.launch_persistent_consumer(queue.clone()).is_err());

        while queue.state() != ExecutorState::Started {
            std::thread::yield_now();
        }
        {
            let lease = queue.lease("stop").unwrap();
            queue.request_shutdown(&lease).unwrap();
        }
        while queue.state() != ExecutorState::ShutdownAck {
            std::thread::yield_now();
        }

        device.reclaim_consumer().unwrap();
        assert!(!device.consumer_running());
        assert!(!queue.consumer_attached());
    }
}
