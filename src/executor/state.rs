//! Executor lifecycle state
//!
//! The lifecycle state lives in memory shared with the device consumer, so it
//! is stored as a single byte behind an atomic. Host transitions go through
//! [`ExecutorState::can_transition_to`]; the device performs exactly two of
//! them (`Posted -> Started` and `Shutdown -> ShutdownAck`).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Executor State
// ─────────────────────────────────────────────────────────────────

/// Lifecycle state shared by host and device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ExecutorState {
    /// Idle, no consumer running
    Initialized = 0,
    /// Consumer launched, accepting submissions
    Posted = 1,
    /// Consumer acknowledged its launch
    Started = 2,
    /// Shutdown requested, consumer draining
    Shutdown = 3,
    /// Consumer exited, not yet reclaimed
    ShutdownAck = 4,
}

impl ExecutorState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ExecutorState::Initialized,
            1 => ExecutorState::Posted,
            2 => ExecutorState::Started,
            3 => ExecutorState::Shutdown,
            4 => ExecutorState::ShutdownAck,
            _ => unreachable!("invalid executor state byte {}", raw),
        }
    }

    /// Whether `next` is a legal successor of this state
    ///
    /// `Posted -> Initialized` is the rollback of a failed launch.
    pub fn can_transition_to(&self, next: ExecutorState) -> bool {
        use ExecutorState::*;
        matches!(
            (*self, next),
            (Initialized, Posted)
                | (Posted, Initialized)
                | (Posted, Started)
                | (Started, Shutdown)
                | (Shutdown, ShutdownAck)
                | (ShutdownAck, Initialized)
        )
    }

    /// Whether `submit` is allowed in this state
    pub fn accepts_submissions(&self) -> bool {
        matches!(self, ExecutorState::Posted | ExecutorState::Started)
    }

    /// Whether `stop` is allowed in this state
    pub fn can_stop(&self) -> bool {
        matches!(self, ExecutorState::Started | ExecutorState::ShutdownAck)
    }

    /// Whether a consumer may be running
    pub fn is_running(&self) -> bool {
        !matches!(self, ExecutorState::Initialized)
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Initialized => write!(f, "initialized"),
            ExecutorState::Posted => write!(f, "posted"),
            ExecutorState::Started => write!(f, "started"),
            ExecutorState::Shutdown => write!(f, "shutdown"),
            ExecutorState::ShutdownAck => write!(f, "shutdown_ack"),
        }
    }
}

/// Atomic cell holding an [`ExecutorState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ExecutorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self, order: Ordering) -> ExecutorState {
        ExecutorState::from_raw(self.0.load(order))
    }

    pub fn store(&self, state: ExecutorState, order: Ordering) {
        self.0.store(state as u8, order);
    }

    /// Move from `current` to `next`, returning the observed state on failure
    pub fn compare_exchange(
        &self,
        current: ExecutorState,
        next: ExecutorState,
    ) -> std::result::Result<ExecutorState, ExecutorState> {
        self.0
            .compare_exchange(current as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(ExecutorState::from_raw)
            .map_err(ExecutorState::from_raw)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(ExecutorState::Initialized)
    }
}

// ─────────────────────────────────────────────────────────────────
// Executor Mode
// ─────────────────────────────────────────────────────────────────

/// Execution strategy installed by `start`
///
/// Submission, query and release dispatch on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// Long-lived consumer polling the shared task ring
    Persistent,
}

impl fmt::Display for ExecutorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorMode::Persistent => write!(f, "persistent"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Thread Mode
// ─────────────────────────────────────────────────────────────────

/// How many host threads may submit concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMode {
    /// One submitting thread at a time; overlap is rejected
    Single,
    /// Any number of submitting threads, serialized by a lock
    #[default]
    Multiple,
}

impl fmt::Display for ThreadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadMode::Single => write!(f, "single"),
            ThreadMode::Multiple => write!(f, "multiple"),
        }
    }
}

impl FromStr for ThreadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ThreadMode::Single),
            "multiple" | "multi" => Ok(ThreadMode::Multiple),
            other => Err(Error::InvalidArgument(format!(
                "unknown thread mode '{}', expected single or multiple",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use ExecutorState::*;
        let path = [Initialized, Posted, Started, Shutdown, ShutdownAck, Initialized];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }

        assert!(!Initialized.can_transition_to(Started));
        assert!(!Posted.can_transition_to(Shutdown));
        assert!(!Started.can_transition_to(Initialized));
        assert!(!Shutdown.can_transition_to(Initialized));
    }

    #[test]
    fn test_stop_windows() {
        assert!(ExecutorState::Started.can_stop());
        assert!(ExecutorState::ShutdownAck.can_stop());
        assert!(!ExecutorState::Posted.can_stop());
        assert!(!ExecutorState::Shutdown.can_stop());
        assert!(!ExecutorState::Initialized.can_stop());
    }

    #[test]
    fn test_state_cell_compare_exchange() {
        let cell = StateCell::default();
        assert_eq!(cell.load(Ordering::Acquire), ExecutorState::Initialized);

        cell.store(ExecutorState::Posted, Ordering::Release);
        assert_eq!(
            cell.compare_exchange(ExecutorState::Posted, ExecutorState::Started),
            Ok(ExecutorState::Posted)
        );
        assert_eq!(
            cell.compare_exchange(ExecutorState::Posted, ExecutorState::Started),
            Err(ExecutorState::Started)
        );
    }

    #[test]
    fn test_thread_mode_parse() {
        assert_eq!("single".parse::<ThreadMode>().unwrap(), ThreadMode::Single);
        assert_eq!("MULTI".parse::<ThreadMode>().unwrap(), ThreadMode::Multiple);
        assert!("many".parse::<ThreadMode>().is_err());
        assert_eq!(ThreadMode::default(), ThreadMode::Multiple);
    }
}
