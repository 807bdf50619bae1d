//! System module for workloads and benchmarking
//!
//! Provides:
//! - Synthetic, self-verifying workloads for the executor
//! - Throughput benchmarking across task kinds

mod benchmark;
mod workload;

pub use benchmark::*;
pub use workload::*;
