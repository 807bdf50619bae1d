//! Task executor module
//!
//! Host side of the persistent executor:
//! - Lifecycle state machine and thread modes
//! - Submission validation
//! - The shared task ring
//! - The `Executor` that ties them to a device

mod persistent;
mod queue;
mod state;
mod validate;

pub use persistent::*;
pub use queue::{SharedQueue, SlotSnapshot, TaskSlot, MAX_CAPACITY, SHUTDOWN_SENTINEL};
pub use state::*;
pub use validate::*;
