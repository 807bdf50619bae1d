//! Device module
//!
//! The device side of the executor:
//! - `DeviceContext` trait the executor launches consumers through
//! - The persistent consumer protocol
//! - A host-simulated device with bounds-checked memory and reference kernels
//! - A manually stepped mock device for tests

mod consumer;
mod host;
mod kernels;
mod memory;
mod mock;
mod traits;

pub use consumer::*;
pub use host::*;
pub use kernels::*;
pub use memory::*;
pub use mock::*;
pub use traits::*;
