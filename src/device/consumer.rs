//! Persistent consumer protocol
//!
//! The device half of the task ring. A consumer is launched once per executor
//! start and then loops on its own: acknowledge the launch, pick up tasks in
//! `post_index` order, execute them, mark them terminal, and exit when it sees
//! the shutdown sentinel together with the `Shutdown` state.
//!
//! The loop only spins and backs off. It never takes a host lock, so the same
//! protocol can run on hardware with no access to host scheduling.

use std::sync::Arc;

use crossbeam_utils::Backoff;
use tracing::{debug, trace};

use crate::error::Result;
use crate::executor::{ExecutorState, SharedQueue, SHUTDOWN_SENTINEL};
use crate::types::TaskStatus;

use super::TaskKernel;

/// Outcome of a single consumer poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerPoll {
    /// Nothing new to do
    Idle,
    /// Task `seq` ran and was marked `status`
    Executed { seq: u64, status: TaskStatus },
    /// Shutdown observed and acknowledged on this poll
    ShutdownAcked,
    /// Consumer already acknowledged shutdown earlier
    Terminated,
}

/// The single consumer attached to a [`SharedQueue`]
pub struct PersistentConsumer<K> {
    queue: Arc<SharedQueue>,
    kernel: K,
    consumed: u64,
    terminated: bool,
}

impl<K: TaskKernel> PersistentConsumer<K> {
    /// Attach to `queue`; fails if another consumer is attached
    pub fn attach(queue: Arc<SharedQueue>, kernel: K) -> Result<Self> {
        queue.attach_consumer()?;
        Ok(Self {
            queue,
            kernel,
            consumed: 0,
            terminated: false,
        })
    }

    /// Number of tasks this consumer has executed
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Move `Posted` to `Started`
    ///
    /// Returns false when the executor had already left `Posted`, e.g. because
    /// a shutdown raced the launch. The loop handles that case on its own.
    pub fn acknowledge_start(&self) -> bool {
        self.queue
            .transition_state(ExecutorState::Posted, ExecutorState::Started)
            .is_ok()
    }

    /// Run one iteration of the consumer loop
    pub fn poll_once(&mut self) -> ConsumerPoll {
        if self.terminated {
            return ConsumerPoll::Terminated;
        }

        let pidx = self.queue.post_index();
        if pidx == SHUTDOWN_SENTINEL {
            if self.queue.load_state() == ExecutorState::Shutdown {
                self.queue.acknowledge_shutdown();
                self.terminated = true;
                debug!(consumed = self.consumed, "Consumer acknowledged shutdown");
                return ConsumerPoll::ShutdownAcked;
            }
            return ConsumerPoll::Idle;
        }

        if pidx < 0 || pidx as u64 <= self.consumed {
            return ConsumerPoll::Idle;
        }

        let seq = self.consumed;
        // SAFETY: this is the attached consumer, the acquire load above
        // observed post_index > seq, and seq is not yet terminal.
        let args = unsafe { self.queue.read_args(seq) };

        let status = match self.kernel.execute(&args) {
            Ok(()) => TaskStatus::Completed,
            Err(e) => {
                debug!(seq, kind = %args.kind(), error = %e, "Task failed on device");
                TaskStatus::Failed
            }
        };

        self.queue.complete(seq, status);
        self.consumed += 1;
        trace!(seq, status = %status, "Task executed");

        ConsumerPoll::Executed { seq, status }
    }

    /// Acknowledge the launch and poll until shutdown
    ///
    /// Returns the number of tasks executed.
    pub fn run(&mut self) -> u64 {
        self.acknowledge_start();

        let backoff = Backoff::new();
        loop {
            match self.poll_once() {
                ConsumerPoll::Idle => backoff.snooze(),
                ConsumerPoll::Executed { .. } => backoff.reset(),
                ConsumerPoll::ShutdownAcked | ConsumerPoll::Terminated => break,
            }
        }

        self.consumed
    }
}

impl<K> Drop for PersistentConsumer<K> {
    fn drop(&mut self) {
        self.queue.detach_consumer();
    }
}
