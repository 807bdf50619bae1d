//! Mock device for testing
//!
//! The consumer is not driven by a thread: tests advance it explicitly with
//! [`MockDevice::step`], which makes queue backpressure and shutdown ordering
//! deterministic to exercise.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::executor::SharedQueue;
use crate::types::TaskArgs;

use super::{ConsumerPoll, DeviceContext, KernelError, PersistentConsumer, TaskKernel};

// ─────────────────────────────────────────────────────────────────
// Mock Device Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock device behavior
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    /// Whether consumer launches fail
    pub fail_launch: bool,

    /// Acknowledge the launch (`Posted -> Started`) as part of launching
    pub auto_ack_start: bool,

    /// Mark every executed task `Failed`
    pub fail_tasks: bool,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            fail_launch: false,
            auto_ack_start: true,
            fail_tasks: false,
        }
    }
}

/// Records every task it is handed
#[derive(Debug, Clone)]
pub struct RecordingKernel {
    fail: bool,
    executed: Arc<Mutex<Vec<TaskArgs>>>,
}

impl TaskKernel for RecordingKernel {
    fn execute(&mut self, args: &TaskArgs) -> std::result::Result<(), KernelError> {
        self.executed.lock().push(*args);
        if self.fail {
            return Err(KernelError::Malformed("mock task failure".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Device
// ─────────────────────────────────────────────────────────────────

/// Manually stepped implementation of DeviceContext
pub struct MockDevice {
    config: MockDeviceConfig,
    consumer: Mutex<Option<PersistentConsumer<RecordingKernel>>>,
    fault: RwLock<Option<String>>,
    executed: Arc<Mutex<Vec<TaskArgs>>>,
    call_counts: RwLock<CallCounts>,
}

/// Track method call counts for verification
#[derive(Debug, Default)]
struct CallCounts {
    launch: u32,
    last_device_error: u32,
    reclaim: u32,
}

impl MockDevice {
    /// Create a new mock device with default configuration
    pub fn new() -> Self {
        Self::with_config(MockDeviceConfig::default())
    }

    pub fn with_config(config: MockDeviceConfig) -> Self {
        Self {
            config,
            consumer: Mutex::new(None),
            fault: RwLock::new(None),
            executed: Arc::new(Mutex::new(Vec::new())),
            call_counts: RwLock::new(CallCounts::default()),
        }
    }

    /// Get the number of times a method was called
    pub fn call_count(&self, method: &str) -> u32 {
        let counts = self.call_counts.read();
        match method {
            "launch_persistent_consumer" => counts.launch,
            "last_device_error" => counts.last_device_error,
            "reclaim_consumer" => counts.reclaim,
            _ => 0,
        }
    }

    /// Whether a launched consumer has not been reclaimed yet
    pub fn has_consumer(&self) -> bool {
        self.consumer.lock().is_some()
    }

    /// Arguments of every task executed so far, in execution order
    pub fn executed(&self) -> Vec<TaskArgs> {
        self.executed.lock().clone()
    }

    /// Perform the consumer's launch acknowledgement
    pub fn acknowledge_start(&self) -> bool {
        self.consumer
            .lock()
            .as_ref()
            .map(|c| c.acknowledge_start())
            .unwrap_or(false)
    }

    /// Run one consumer poll; `None` when no consumer is attached
    pub fn step(&self) -> Option<ConsumerPoll> {
        self.consumer.lock().as_mut().map(|c| c.poll_once())
    }

    /// Poll until the consumer goes idle or terminates
    ///
    /// Returns the number of tasks executed.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Some(ConsumerPoll::Executed { .. }) = self.step() {
            executed += 1;
        }
        executed
    }

    /// Poll until shutdown is acknowledged
    ///
    /// Meant to run beside a blocking `stop`. Returns false if no consumer was
    /// attached or it had already terminated.
    pub fn run_until_shutdown(&self) -> bool {
        loop {
            match self.step() {
                Some(ConsumerPoll::ShutdownAcked) => return true,
                Some(ConsumerPoll::Terminated) | None => return false,
                Some(_) => std::thread::yield_now(),
            }
        }
    }

    /// Make `last_device_error` report a fault
    pub fn inject_fault(&self, message: impl Into<String>) {
        *self.fault.write() = Some(message.into());
    }

    pub fn clear_fault(&self) {
        *self.fault.write() = None;
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for MockDevice {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn launch_persistent_consumer(&self, queue: Arc<SharedQueue>) -> Result<()> {
        self.call_counts.write().launch += 1;

        if self.config.fail_launch {
            return Err(Error::exhausted("mock consumer launch failure"));
        }

        let kernel = RecordingKernel {
            fail: self.config.fail_tasks,
            executed: self.executed.clone(),
        };
        let consumer = PersistentConsumer::attach(queue, kernel)?;
        if self.config.auto_ack_start {
            consumer.acknowledge_start();
        }
        *self.consumer.lock() = Some(consumer);
        Ok(())
    }

    fn last_device_error(&self) -> Result<()> {
        self.call_counts.write().last_device_error += 1;

        match self.fault.read().as_ref() {
            Some(message) => Err(Error::device_fault(self.name(), message.clone())),
            None => Ok(()),
        }
    }

    fn reclaim_consumer(&self) -> Result<()> {
        self.call_counts.write().reclaim += 1;
        self.consumer.lock().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ExecutorState, ThreadMode};

    fn posted_queue() -> Arc<SharedQueue> {
        let queue = Arc::new(SharedQueue::new(2, ThreadMode::Multiple).unwrap());
        let lease = queue.lease("start").unwrap();
        queue.reset(&lease);
        queue.set_state(&lease, ExecutorState::Posted);
        drop(lease);
        queue
    }

    #[test]
    fn test_launch_failure() {
        let device = MockDevice::with_config(MockDeviceConfig {
            fail_launch: true,
            ..Default::default()
        });
        let err = device.launch_persistent_consumer(posted_queue()).unwrap_err();
        assert!(matches!(err, Error::ResourceExhaustion { .. }));
        assert_eq!(device.call_count("launch_persistent_consumer"), 1);
        assert!(!device.has_consumer());
    }

    #[test]
    fn test_manual_start_ack() {
        let device = MockDevice::with_config(MockDeviceConfig {
            auto_ack_start: false,
            ..Default::default()
        });
        let queue = posted_queue();
        device.launch_persistent_consumer(queue.clone()).unwrap();
        assert_eq!(queue.state(), ExecutorState::Posted);

        assert!(device.acknowledge_start());
        assert_eq!(queue.state(), ExecutorState::Started);
    }

    #[test]
    fn test_fault_injection() {
        let device = MockDevice::new();
        assert!(device.last_device_error().is_ok());
        device.inject_fault("ecc error");
        assert!(matches!(device.last_device_error(), Err(Error::DeviceFault { .. })));
        device.clear_fault();
        assert!(device.last_device_error().is_ok());
        assert_eq!(device.call_count("last_device_error"), 3);
    }

    #[test]
    fn test_step_without_consumer() {
        let device = MockDevice::new();
        assert_eq!(device.step(), None);
        assert_eq!(device.drain(), 0);
        assert!(!device.run_until_shutdown());
    }

    #[test]
    fn test_reclaim_detaches() {
        let device = MockDevice::new();
        let queue = posted_queue();
        device.launch_persistent_consumer(queue.clone()).unwrap();
        assert!(queue.consumer_attached());

        device.reclaim_consumer().unwrap();
        assert!(!queue.consumer_attached());
        assert_eq!(device.call_count("reclaim_consumer"), 1);
    }
}
