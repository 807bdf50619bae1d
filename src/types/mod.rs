//! Type definitions for the accelerator executor
//!
//! Task argument layouts, element types, reduction operators and the
//! device address type shared by the host producer and the device consumer.

mod buffer;
mod task;

pub use buffer::*;
pub use task::*;
