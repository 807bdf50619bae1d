//! Simulated device memory
//!
//! Buffers live in host memory but are addressed by [`DevicePtr`] values from
//! a private address range, so task arguments carry plain device addresses
//! exactly as they would for a real accelerator. Every access is resolved
//! against the allocation table and bounds-checked.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::DevicePtr;

use super::KernelError;

type KernelResult<T> = std::result::Result<T, KernelError>;

/// First address handed out by a heap
pub const HEAP_BASE: u64 = 0x7f00_0000_0000;

/// Alignment of every allocation
pub const ALLOC_ALIGN: u64 = 256;

#[derive(Debug)]
struct Allocation {
    base: u64,
    len: usize,
    data: RwLock<Vec<u8>>,
}

#[derive(Debug, Default)]
struct HeapInner {
    allocations: BTreeMap<u64, Arc<Allocation>>,
    next_addr: u64,
    used: usize,
}

/// Allocation table of a simulated device
#[derive(Debug)]
pub struct DeviceHeap {
    limit_bytes: usize,
    inner: RwLock<HeapInner>,
}

impl DeviceHeap {
    /// Create a heap that refuses to hold more than `limit_bytes`
    pub fn new(limit_bytes: usize) -> Self {
        Self {
            limit_bytes,
            inner: RwLock::new(HeapInner {
                next_addr: HEAP_BASE,
                ..Default::default()
            }),
        }
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.inner.read().used
    }

    pub fn allocation_count(&self) -> usize {
        self.inner.read().allocations.len()
    }

    /// Allocate `len` zeroed bytes
    pub fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        if len == 0 {
            return Err(Error::InvalidArgument("cannot allocate an empty device buffer".into()));
        }

        let mut inner = self.inner.write();
        if inner.used.saturating_add(len) > self.limit_bytes {
            return Err(Error::exhausted(format!(
                "device heap exhausted: {} bytes requested, {} of {} in use",
                len, inner.used, self.limit_bytes
            )));
        }

        let base = inner.next_addr;
        // one alignment unit of guard space keeps neighbours from touching
        let span = (len as u64).div_ceil(ALLOC_ALIGN) * ALLOC_ALIGN + ALLOC_ALIGN;
        inner.next_addr = base
            .checked_add(span)
            .ok_or_else(|| Error::exhausted("device address space exhausted"))?;

        let allocation = Arc::new(Allocation {
            base,
            len,
            data: RwLock::new(vec![0u8; len]),
        });
        inner.allocations.insert(base, allocation.clone());
        inner.used += len;
        trace!(ptr = %DevicePtr::new(base), len, "Device buffer allocated");

        Ok(DeviceBuffer {
            ptr: DevicePtr::new(base),
            len,
            allocation,
        })
    }

    /// Allocate a buffer holding a copy of `values`
    pub fn alloc_from<T: Pod>(&self, values: &[T]) -> Result<DeviceBuffer> {
        let buffer = self.alloc(std::mem::size_of_val(values))?;
        buffer.write_from(values)?;
        Ok(buffer)
    }

    /// Release the allocation starting at `ptr`
    ///
    /// Outstanding [`DeviceBuffer`] handles keep their bytes readable, but the
    /// address no longer resolves for kernels.
    pub fn free(&self, ptr: DevicePtr) -> Result<()> {
        let mut inner = self.inner.write();
        let allocation = inner.allocations.remove(&ptr.addr()).ok_or_else(|| {
            Error::InvalidArgument(format!("{} is not the start of a device allocation", ptr))
        })?;
        inner.used -= allocation.len;
        Ok(())
    }

    fn resolve(&self, ptr: DevicePtr, len: usize) -> KernelResult<(Arc<Allocation>, usize)> {
        let inner = self.inner.read();
        let (_, allocation) = inner
            .allocations
            .range(..=ptr.addr())
            .next_back()
            .ok_or(KernelError::InvalidPointer(ptr))?;

        let offset = (ptr.addr() - allocation.base) as usize;
        let alloc_len = allocation.len;
        if offset >= alloc_len && len > 0 {
            return Err(KernelError::InvalidPointer(ptr));
        }
        match offset.checked_add(len) {
            Some(end) if end <= alloc_len => Ok((allocation.clone(), offset)),
            _ => Err(KernelError::OutOfBounds { ptr, len }),
        }
    }

    /// Copy `len` bytes out of device memory
    pub fn read_bytes(&self, ptr: DevicePtr, len: usize) -> KernelResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let (allocation, offset) = self.resolve(ptr, len)?;
        let data = allocation.data.read();
        Ok(data[offset..offset + len].to_vec())
    }

    /// Copy `bytes` into device memory
    pub fn write_bytes(&self, ptr: DevicePtr, bytes: &[u8]) -> KernelResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (allocation, offset) = self.resolve(ptr, bytes.len())?;
        let mut data = allocation.data.write();
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read `count` elements of `T`
    pub fn read_as<T: Pod>(&self, ptr: DevicePtr, count: usize) -> KernelResult<Vec<T>> {
        let len = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(KernelError::OutOfBounds { ptr, len: usize::MAX })?;
        let bytes = self.read_bytes(ptr, len)?;
        Ok(bytemuck::pod_collect_to_vec::<u8, T>(&bytes))
    }
}

// ─────────────────────────────────────────────────────────────────
// Device Buffer
// ─────────────────────────────────────────────────────────────────

/// Host handle to one device allocation
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    ptr: DevicePtr,
    len: usize,
    allocation: Arc<Allocation>,
}

impl DeviceBuffer {
    /// Device address of the first byte
    pub fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Device address of element `index` of type `T`
    pub fn element_ptr<T>(&self, index: usize) -> DevicePtr {
        self.ptr.offset((index * std::mem::size_of::<T>()) as u64)
    }

    pub fn read_bytes(&self) -> Vec<u8> {
        self.allocation.data.read().clone()
    }

    /// Reinterpret the contents as elements of `T`
    pub fn read_as<T: Pod>(&self) -> Vec<T> {
        let data = self.allocation.data.read();
        bytemuck::pod_collect_to_vec::<u8, T>(&data)
    }

    /// Overwrite the start of the buffer with `bytes`
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.len {
            return Err(Error::InvalidArgument(format!(
                "{} bytes do not fit a {} byte device buffer",
                bytes.len(),
                self.len
            )));
        }
        self.allocation.data.write()[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Overwrite the start of the buffer with `values`
    pub fn write_from<T: Pod>(&self, values: &[T]) -> Result<()> {
        self.write_bytes(bytemuck::cast_slice(values))
    }
}
