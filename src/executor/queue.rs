//! Host/device shared task ring
//!
//! Ownership split of the shared region:
//! - host (producer path, under the producer guard): `post_index`, slot `seq`,
//!   slot `args`, the `Initialized` status, and every host-side state
//!   transition
//! - device (the single attached consumer): `Completed`/`Failed` statuses and
//!   the `Started`/`ShutdownAck` transitions
//!
//! Slot writes happen before the release store of `post_index`; the consumer
//! pairs it with an acquire load before reading a slot. The consumer's release
//! store of a terminal status pairs with the producer's acquire load before the
//! slot is overwritten.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::types::{TaskArgs, TaskStatus};

use super::state::{ExecutorState, StateCell, ThreadMode};

/// `post_index` value telling the consumer to shut down
pub const SHUTDOWN_SENTINEL: i64 = -1;

/// Largest ring the executor will allocate
pub const MAX_CAPACITY: usize = 1 << 20;

// ─────────────────────────────────────────────────────────────────
// Task Slot
// ─────────────────────────────────────────────────────────────────

/// One preallocated task record
#[derive(Debug, Default)]
pub struct TaskSlot {
    status: AtomicU8,
    seq: AtomicU64,
    args: UnsafeCell<TaskArgs>,
}

// SAFETY: `args` is written only by the producer while it holds the producer
// guard and the slot status is not `Initialized`, and read only by the single
// attached consumer after an acquire load of `post_index`, or by the host
// under the producer guard. The status handoff orders the two sides.
unsafe impl Sync for TaskSlot {}

impl TaskSlot {
    fn status(&self) -> TaskStatus {
        TaskStatus::from_raw(self.status.load(Ordering::Acquire)).unwrap_or(TaskStatus::Failed)
    }
}

/// Point-in-time copy of a slot, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSnapshot {
    pub index: usize,
    pub seq: u64,
    pub status: TaskStatus,
    pub args: TaskArgs,
}

// ─────────────────────────────────────────────────────────────────
// Producer Guard
// ─────────────────────────────────────────────────────────────────

/// Serializes the producer path according to the thread mode
#[derive(Debug)]
pub(crate) enum ProducerGuard {
    /// Caller promises exclusivity; overlap is detected and rejected
    Single(AtomicBool),
    /// Short-held lock across slot selection and publication
    Multiple(Mutex<()>),
}

/// Proof that the holder has exclusive producer access
pub(crate) enum ProducerLease<'a> {
    Single(&'a AtomicBool),
    #[allow(dead_code)]
    Multiple(MutexGuard<'a, ()>),
}

impl ProducerGuard {
    fn new(mode: ThreadMode) -> Self {
        match mode {
            ThreadMode::Single => ProducerGuard::Single(AtomicBool::new(false)),
            ThreadMode::Multiple => ProducerGuard::Multiple(Mutex::new(())),
        }
    }

    fn lease(&self, operation: &'static str) -> Result<ProducerLease<'_>> {
        match self {
            ProducerGuard::Single(busy) => {
                if busy
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_err()
                {
                    return Err(Error::protocol(
                        operation,
                        "concurrent producer access in single thread mode",
                    ));
                }
                Ok(ProducerLease::Single(busy))
            }
            ProducerGuard::Multiple(lock) => Ok(ProducerLease::Multiple(lock.lock())),
        }
    }
}

impl Drop for ProducerLease<'_> {
    fn drop(&mut self) {
        if let ProducerLease::Single(busy) = self {
            busy.store(false, Ordering::Release);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Shared Queue
// ─────────────────────────────────────────────────────────────────

/// Fixed-capacity task ring plus the lifecycle fields the device observes
#[derive(Debug)]
pub struct SharedQueue {
    state: CachePadded<StateCell>,
    post_index: CachePadded<AtomicI64>,
    epoch: AtomicU64,
    slots: Box<[TaskSlot]>,
    producer: ProducerGuard,
    thread_mode: ThreadMode,
    consumer_attached: AtomicBool,
}

impl SharedQueue {
    /// Allocate a ring of `capacity` slots
    pub fn new(capacity: usize, thread_mode: ThreadMode) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(Error::InvalidArgument(format!(
                "task ring capacity must be between 1 and {}, got {}",
                MAX_CAPACITY, capacity
            )));
        }

        let slots = (0..capacity).map(|_| TaskSlot::default()).collect();
        Ok(Self {
            state: CachePadded::new(StateCell::default()),
            post_index: CachePadded::new(AtomicI64::new(SHUTDOWN_SENTINEL)),
            epoch: AtomicU64::new(0),
            slots,
            producer: ProducerGuard::new(thread_mode),
            thread_mode,
            consumer_attached: AtomicBool::new(false),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExecutorState {
        self.state.load(Ordering::Acquire)
    }

    /// Number of tasks published since start, or the shutdown sentinel
    pub fn post_index(&self) -> i64 {
        self.post_index.load(Ordering::Acquire)
    }

    /// Start generation; bumped by every start
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a consumer currently holds the device side of the ring
    pub fn consumer_attached(&self) -> bool {
        self.consumer_attached.load(Ordering::Acquire)
    }

    /// Status byte of a slot, without any handle check
    pub fn slot_status(&self, index: usize) -> Option<TaskStatus> {
        self.slots.get(index).map(TaskSlot::status)
    }

    // ─────────────────────────────────────────────────────────────
    // Host Side
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn lease(&self, operation: &'static str) -> Result<ProducerLease<'_>> {
        self.producer.lease(operation)
    }

    pub(crate) fn set_state(&self, _lease: &ProducerLease<'_>, state: ExecutorState) {
        self.state.store(state, Ordering::Release);
    }

    pub(crate) fn transition_state(
        &self,
        current: ExecutorState,
        next: ExecutorState,
    ) -> std::result::Result<ExecutorState, ExecutorState> {
        self.state.compare_exchange(current, next)
    }

    /// Clear every slot, zero `post_index` and open a new epoch
    pub(crate) fn reset(&self, _lease: &ProducerLease<'_>) -> u64 {
        for slot in self.slots.iter() {
            slot.seq.store(0, Ordering::Relaxed);
            slot.status
                .store(TaskStatus::Uninitialized.as_raw(), Ordering::Relaxed);
        }
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.post_index.store(0, Ordering::Release);
        epoch
    }

    /// Put the ring back into its stopped shape after a failed launch
    pub(crate) fn rollback(&self, _lease: &ProducerLease<'_>) {
        self.post_index.store(SHUTDOWN_SENTINEL, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Claim the next slot, copy `args` into it and publish it
    pub(crate) fn publish(
        &self,
        _lease: &ProducerLease<'_>,
        args: TaskArgs,
    ) -> Result<(usize, u64)> {
        let state = self.state.load(Ordering::Acquire);
        let pidx = self.post_index.load(Ordering::Relaxed);
        if !state.accepts_submissions() || pidx < 0 {
            return Err(Error::protocol(
                "submit",
                format!("executor is {}, not accepting tasks", state),
            ));
        }

        let seq = pidx as u64;
        let index = (seq % self.slots.len() as u64) as usize;
        let slot = &self.slots[index];

        if slot.status() == TaskStatus::Initialized {
            return Err(Error::QueueFull {
                capacity: self.slots.len(),
                slot: index,
            });
        }

        slot.seq.store(seq, Ordering::Release);
        slot.status
            .store(TaskStatus::Initialized.as_raw(), Ordering::Release);
        // SAFETY: the lease excludes other producers, and the status observed
        // above was terminal or Uninitialized, so the consumer is done with
        // this slot until `post_index` moves past `seq`.
        unsafe {
            *slot.args.get() = args;
        }
        self.post_index.store(pidx + 1, Ordering::Release);

        Ok((index, seq))
    }

    /// Announce shutdown to the consumer
    ///
    /// Only a `Started` executor can be asked to shut down. On failure the
    /// observed state is returned and nothing is written.
    pub(crate) fn request_shutdown(
        &self,
        _lease: &ProducerLease<'_>,
    ) -> std::result::Result<(), ExecutorState> {
        self.transition_state(ExecutorState::Started, ExecutorState::Shutdown)?;
        self.post_index.store(SHUTDOWN_SENTINEL, Ordering::Release);
        Ok(())
    }

    /// Status of the task `seq`, provided it still owns slot `index`
    pub(crate) fn read_status(&self, index: usize, seq: u64) -> Result<TaskStatus> {
        let slot = self
            .slots
            .get(index)
            .ok_or(Error::StaleHandle { slot: index, seq })?;

        let before = slot.seq.load(Ordering::Acquire);
        let status = slot.status();
        let after = slot.seq.load(Ordering::Acquire);

        if before != seq || after != seq || status == TaskStatus::Uninitialized {
            return Err(Error::StaleHandle { slot: index, seq });
        }
        Ok(status)
    }

    pub(crate) fn snapshot(
        &self,
        _lease: &ProducerLease<'_>,
        index: usize,
    ) -> Option<SlotSnapshot> {
        let slot = self.slots.get(index)?;
        let status = slot.status();
        // SAFETY: producers are excluded by the lease and the consumer never
        // writes `args`.
        let args = unsafe { *slot.args.get() };
        Some(SlotSnapshot {
            index,
            seq: slot.seq.load(Ordering::Acquire),
            status,
            args,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Device Side
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn attach_consumer(&self) -> Result<()> {
        self.consumer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::protocol("attach", "a consumer is already attached to this ring"))
    }

    pub(crate) fn detach_consumer(&self) {
        self.consumer_attached.store(false, Ordering::Release);
    }

    pub(crate) fn load_state(&self) -> ExecutorState {
        self.state.load(Ordering::Acquire)
    }

    pub(crate) fn acknowledge_shutdown(&self) {
        self.state.store(ExecutorState::ShutdownAck, Ordering::Release);
    }

    /// Copy out the arguments of task `seq`
    ///
    /// # Safety
    ///
    /// Caller must be the attached consumer and must have observed
    /// `post_index > seq` with acquire ordering, without having marked `seq`
    /// terminal yet.
    pub(crate) unsafe fn read_args(&self, seq: u64) -> TaskArgs {
        let index = (seq % self.slots.len() as u64) as usize;
        *self.slots[index].args.get()
    }

    /// Record the outcome of task `seq`
    pub(crate) fn complete(&self, seq: u64, status: TaskStatus) {
        let index = (seq % self.slots.len() as u64) as usize;
        self.slots[index].status.store(status.as_raw(), Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
