//! Device address type

use std::fmt;

/// An address in device memory.
///
/// Task arguments carry raw device addresses rather than host references so
/// that a task record can be copied byte-for-byte into a shared slot. The
/// device resolves an address against its own allocation table when it
/// executes the task.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DevicePtr(u64);

impl DevicePtr {
    /// The null device address
    pub const NULL: DevicePtr = DevicePtr(0);

    /// Wrap a raw device address
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Raw address value
    pub const fn addr(self) -> u64 {
        self.0
    }

    /// Whether this is the null address
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` past this one
    pub fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl fmt::Debug for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr({:#x})", self.0)
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
