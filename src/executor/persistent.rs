//! Persistent executor
//!
//! Owns the shared task ring and drives its lifecycle:
//! - `start` resets the ring and launches one persistent consumer
//! - `submit` validates and publishes task arguments
//! - `test`/`wait` observe task status through handles
//! - `stop` hands the consumer the shutdown sentinel and reclaims it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExecutorSettings;
use crate::device::DeviceContext;
use crate::error::{Error, Result};
use crate::types::{TaskArgs, TaskStatus};

use super::queue::{SharedQueue, SlotSnapshot};
use super::state::{ExecutorMode, ExecutorState, ThreadMode};
use super::validate::validate_args;

/// Bound on the shutdown performed when an executor is dropped while running
const DROP_STOP_TIMEOUT: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────
// Executor Configuration
// ─────────────────────────────────────────────────────────────────

/// Construction-time parameters of an [`Executor`]
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Ring capacity
    pub max_tasks: usize,

    /// Submission concurrency contract
    pub thread_mode: ThreadMode,

    /// Bound applied by `stop`; `None` blocks until acknowledged
    pub stop_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_tasks: 128,
            thread_mode: ThreadMode::Multiple,
            stop_timeout: None,
        }
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            max_tasks: settings.max_tasks,
            thread_mode: settings.thread_mode,
            stop_timeout: settings.stop_timeout(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Handles and Statistics
// ─────────────────────────────────────────────────────────────────

/// Reference to a submitted task
///
/// Valid for the start epoch it was issued in, and only until its slot is
/// reused by a later submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle {
    pub executor: Uuid,
    pub epoch: u64,
    pub slot: usize,
    pub seq: u64,
}

/// Counters since the executor was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub starts: u64,
    pub stops: u64,
    pub submitted: u64,
    pub rejected_unsupported: u64,
    pub rejected_full: u64,
    pub rejected_protocol: u64,
}

#[derive(Debug, Default)]
struct Counters {
    starts: AtomicU64,
    stops: AtomicU64,
    submitted: AtomicU64,
    rejected_unsupported: AtomicU64,
    rejected_full: AtomicU64,
    rejected_protocol: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            starts: self.starts.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected_unsupported: self.rejected_unsupported.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_protocol: self.rejected_protocol.load(Ordering::Relaxed),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────

/// Host side of a persistent accelerator executor
pub struct Executor {
    id: Uuid,
    config: ExecutorConfig,
    queue: Arc<SharedQueue>,
    device: Arc<dyn DeviceContext>,
    mode: RwLock<Option<ExecutorMode>>,
    counters: Counters,
}

impl Executor {
    /// Create an executor in `Initialized` with a ring of `max_tasks` slots
    pub fn new(config: ExecutorConfig, device: Arc<dyn DeviceContext>) -> Result<Self> {
        let queue = Arc::new(SharedQueue::new(config.max_tasks, config.thread_mode)?);
        let id = Uuid::new_v4();

        debug!(
            executor = %id,
            device = device.name(),
            max_tasks = config.max_tasks,
            thread_mode = %config.thread_mode,
            "Executor created"
        );

        Ok(Self {
            id,
            config,
            queue,
            device,
            mode: RwLock::new(None),
            counters: Counters::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn DeviceContext> {
        &self.device
    }

    pub fn state(&self) -> ExecutorState {
        self.queue.state()
    }

    /// Strategy installed by the current start, if any
    pub fn mode(&self) -> Option<ExecutorMode> {
        *self.mode.read()
    }

    pub fn post_index(&self) -> i64 {
        self.queue.post_index()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot()
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Reset the ring and launch the persistent consumer
    ///
    /// Leaves the executor `Posted`; the consumer moves it to `Started` once
    /// it runs. A failed launch leaves the executor `Initialized`.
    pub fn start(&self) -> Result<()> {
        let lease = self.queue.lease("start")?;

        let state = self.queue.state();
        if state != ExecutorState::Initialized {
            return Err(Error::protocol(
                "start",
                format!("executor is {}, expected initialized", state),
            ));
        }
        if self.queue.consumer_attached() {
            return Err(Error::protocol(
                "start",
                "previous consumer has not been reclaimed",
            ));
        }

        let epoch = self.queue.reset(&lease);
        *self.mode.write() = Some(ExecutorMode::Persistent);
        self.queue.set_state(&lease, ExecutorState::Posted);

        if let Err(e) = self.device.launch_persistent_consumer(self.queue.clone()) {
            self.queue.set_state(&lease, ExecutorState::Initialized);
            self.queue.rollback(&lease);
            *self.mode.write() = None;
            error!(
                executor = %self.id,
                device = self.device.name(),
                error = %e,
                "Consumer launch failed"
            );
            return Err(e);
        }

        Counters::bump(&self.counters.starts);
        info!(
            executor = %self.id,
            device = self.device.name(),
            epoch,
            capacity = self.queue.capacity(),
            "Executor started"
        );
        Ok(())
    }

    /// Block until the consumer acknowledges its launch
    pub fn wait_until_running(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();

        loop {
            match self.queue.state() {
                ExecutorState::Started => return Ok(()),
                ExecutorState::Posted => {}
                state => {
                    self.device.last_device_error()?;
                    return Err(Error::protocol(
                        "wait_until_running",
                        format!("executor is {}, not starting", state),
                    ));
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::exhausted(format!(
                    "consumer did not acknowledge launch within {} ms",
                    timeout.as_millis()
                )));
            }
            backoff.snooze();
        }
    }

    /// Shut the consumer down and return to `Initialized`
    ///
    /// Legal from `Started`, or from `ShutdownAck` when the consumer already
    /// exited. Right after [`start`](Self::start) the executor is still
    /// `Posted` and `stop` fails with `ProtocolViolation`; call
    /// [`wait_until_running`](Self::wait_until_running) first. Waits for the
    /// shutdown acknowledgement as long as the configured stop timeout
    /// allows, forever by default.
    pub fn stop(&self) -> Result<()> {
        self.stop_within(self.config.stop_timeout)
    }

    /// Like [`stop`](Self::stop), but give up after `timeout`
    ///
    /// On `StopTimeout` the executor stays `Shutdown`; call
    /// [`resume_stop`](Self::resume_stop) to keep waiting.
    pub fn stop_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.stop_within(Some(timeout))
    }

    /// Continue a shutdown that timed out
    pub fn resume_stop(&self, timeout: Option<Duration>) -> Result<()> {
        let state = self.queue.state();
        if !matches!(state, ExecutorState::Shutdown | ExecutorState::ShutdownAck) {
            return Err(Error::protocol(
                "resume_stop",
                format!("executor is {}, no shutdown in progress", state),
            ));
        }
        self.await_shutdown_ack(timeout)?;
        self.reclaim()
    }

    fn stop_within(&self, timeout: Option<Duration>) -> Result<()> {
        let state = self.queue.state();
        if !state.can_stop() {
            return Err(Error::protocol(
                "stop",
                format!("executor is {}, expected started or shutdown_ack", state),
            ));
        }

        if state == ExecutorState::Started {
            let lease = self.queue.lease("stop")?;
            match self.queue.request_shutdown(&lease) {
                Ok(()) => debug!(executor = %self.id, "Shutdown requested"),
                // consumer exited on its own in the meantime
                Err(ExecutorState::ShutdownAck) => {}
                Err(observed) => {
                    return Err(Error::protocol(
                        "stop",
                        format!("executor changed to {} while stopping", observed),
                    ));
                }
            }
        }

        self.await_shutdown_ack(timeout)?;
        self.reclaim()
    }

    fn await_shutdown_ack(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let backoff = Backoff::new();

        while self.queue.state() != ExecutorState::ShutdownAck {
            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    warn!(
                        executor = %self.id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Consumer did not acknowledge shutdown"
                    );
                    return Err(Error::StopTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
            backoff.snooze();
        }
        Ok(())
    }

    fn reclaim(&self) -> Result<()> {
        self.device.reclaim_consumer()?;

        *self.mode.write() = None;
        self.queue
            .transition_state(ExecutorState::ShutdownAck, ExecutorState::Initialized)
            .map_err(|observed| {
                Error::protocol("stop", format!("executor changed to {} during reclaim", observed))
            })?;

        Counters::bump(&self.counters.stops);
        info!(executor = %self.id, epoch = self.queue.epoch(), "Executor stopped");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────

    /// Validate `args` and publish them to the consumer
    ///
    /// Never blocks on the device. A full ring fails with `QueueFull` and
    /// leaves everything untouched.
    pub fn submit(&self, args: TaskArgs) -> Result<TaskHandle> {
        if let Err(e) = validate_args(&args) {
            Counters::bump(&self.counters.rejected_unsupported);
            warn!(executor = %self.id, kind = %args.kind(), error = %e, "Task rejected");
            return Err(e);
        }

        let result = match self.mode() {
            Some(ExecutorMode::Persistent) => self.submit_persistent(args),
            None => Err(Error::protocol("submit", "executor is not started")),
        };

        match result {
            Ok(handle) => {
                Counters::bump(&self.counters.submitted);
                debug!(
                    executor = %self.id,
                    kind = %args.kind(),
                    slot = handle.slot,
                    seq = handle.seq,
                    "Task submitted"
                );
                Ok(handle)
            }
            Err(e) => {
                match e {
                    Error::QueueFull { .. } => Counters::bump(&self.counters.rejected_full),
                    _ => Counters::bump(&self.counters.rejected_protocol),
                }
                warn!(executor = %self.id, kind = %args.kind(), error = %e, "Task rejected");
                Err(e)
            }
        }
    }

    fn submit_persistent(&self, args: TaskArgs) -> Result<TaskHandle> {
        let lease = self.queue.lease("submit")?;
        let (slot, seq) = self.queue.publish(&lease, args)?;
        Ok(TaskHandle {
            executor: self.id,
            epoch: self.queue.epoch(),
            slot,
            seq,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Query
    // ─────────────────────────────────────────────────────────────

    /// Current status of the task behind `handle`
    ///
    /// Reports a device fault before anything else. Never blocks.
    pub fn test(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        self.device.last_device_error()?;

        if handle.executor != self.id || handle.epoch != self.queue.epoch() {
            return Err(Error::StaleHandle {
                slot: handle.slot,
                seq: handle.seq,
            });
        }
        self.queue.read_status(handle.slot, handle.seq)
    }

    /// Release a handle
    ///
    /// The slot is recycled by wraparound, not here.
    pub fn finalize(&self, _handle: TaskHandle) -> Result<()> {
        Ok(())
    }

    /// Poll `test` until the task is terminal or `timeout` elapses
    ///
    /// Returns the last observed status, `Initialized` if time ran out.
    pub fn wait(&self, handle: &TaskHandle, timeout: Duration) -> Result<TaskStatus> {
        let deadline = Instant::now() + timeout;
        let backoff = Backoff::new();

        loop {
            let status = self.test(handle)?;
            if status.is_terminal() || Instant::now() >= deadline {
                return Ok(status);
            }
            backoff.snooze();
        }
    }

    /// Copy of slot `index` taken under the producer guard
    pub fn inspect_slot(&self, index: usize) -> Result<Option<SlotSnapshot>> {
        let lease = self.queue.lease("inspect")?;
        Ok(self.queue.snapshot(&lease, index))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("device", &self.device.name())
            .field("state", &self.state())
            .field("post_index", &self.post_index())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let result = match self.queue.state() {
            ExecutorState::Initialized => return,
            ExecutorState::Posted => self
                .wait_until_running(DROP_STOP_TIMEOUT)
                .and_then(|_| self.stop_with_timeout(DROP_STOP_TIMEOUT)),
            ExecutorState::Started => self.stop_with_timeout(DROP_STOP_TIMEOUT),
            ExecutorState::Shutdown | ExecutorState::ShutdownAck => {
                self.resume_stop(Some(DROP_STOP_TIMEOUT))
            }
        };

        if let Err(e) = result {
            warn!(executor = %self.id, error = %e, "Executor dropped without a clean stop");
        }
    }
}
