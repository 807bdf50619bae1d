//! Reference kernels of the host-simulated device
//!
//! Straightforward element loops over [`DeviceHeap`] memory. Sources are read
//! into scratch vectors before the destination is written, so in-place
//! reductions (`dst == src1`) behave like their device counterparts.

use std::sync::Arc;

use bytemuck::Pod;

use crate::types::{
    CopyArgs, CopyMultiArgs, DataType, DevicePtr, ReduceArgs, ReduceMultiDstArgs,
    ReduceStridedArgs, ReductionOp, TaskArgs, MAX_STRIDED_SRCS,
};

use super::{DeviceHeap, KernelError, TaskKernel};

type KernelResult<T> = std::result::Result<T, KernelError>;

/// Element type a reduction can accumulate
trait Element: Pod {
    fn add(self, other: Self) -> Self;
    fn scale(self, alpha: f64) -> Self;
}

impl Element for f32 {
    fn add(self, other: Self) -> Self {
        self + other
    }

    fn scale(self, alpha: f64) -> Self {
        (self as f64 * alpha) as f32
    }
}

impl Element for f64 {
    fn add(self, other: Self) -> Self {
        self + other
    }

    fn scale(self, alpha: f64) -> Self {
        self * alpha
    }
}

impl Element for i32 {
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    fn scale(self, alpha: f64) -> Self {
        (self as f64 * alpha).round() as i32
    }
}

/// Kernels operating on a [`DeviceHeap`]
#[derive(Debug, Clone)]
pub struct HostKernels {
    heap: Arc<DeviceHeap>,
}

impl HostKernels {
    pub fn new(heap: Arc<DeviceHeap>) -> Self {
        Self { heap }
    }

    fn copy(&self, args: &CopyArgs) -> KernelResult<()> {
        let bytes = self.heap.read_bytes(args.src, args.len)?;
        self.heap.write_bytes(args.dst, &bytes)
    }

    fn copy_multi(&self, args: &CopyMultiArgs) -> KernelResult<()> {
        for (dst, src, len) in args.vectors() {
            self.copy(&CopyArgs { dst, src, len })?;
        }
        Ok(())
    }

    fn reduce(&self, args: &ReduceArgs) -> KernelResult<()> {
        check_sum(args.op)?;
        let srcs = args.sources().iter().copied();
        let (dst, count, alpha) = (args.dst, args.count, args.alpha);
        match args.dt {
            DataType::Float32 => self.reduce_typed::<f32, _>(dst, srcs, count, alpha),
            DataType::Float64 => self.reduce_typed::<f64, _>(dst, srcs, count, alpha),
            DataType::Int32 => self.reduce_typed::<i32, _>(dst, srcs, count, alpha),
            other => Err(unsupported_type(other)),
        }
    }

    fn reduce_strided(&self, args: &ReduceStridedArgs) -> KernelResult<()> {
        check_sum(args.op)?;
        if args.n_src2 == 0 || args.n_src2 > MAX_STRIDED_SRCS {
            return Err(KernelError::Malformed(format!(
                "n_src2 = {}, expected 1..={}",
                args.n_src2, MAX_STRIDED_SRCS
            )));
        }

        // the last operand bounds every other offset
        (args.n_src2 - 1)
            .checked_mul(args.stride)
            .and_then(|span| u64::try_from(span).ok())
            .and_then(|span| args.src2.addr().checked_add(span))
            .ok_or_else(|| {
                KernelError::Malformed("strided operands overflow the address space".into())
            })?;

        let stride = args.stride as u64;
        let srcs = std::iter::once(args.src1)
            .chain((0..args.n_src2 as u64).map(|k| args.src2.offset(k * stride)));

        let (dst, count, alpha) = (args.dst, args.count, args.alpha);
        match args.dt {
            DataType::Float32 => self.reduce_typed::<f32, _>(dst, srcs, count, alpha),
            DataType::Float64 => self.reduce_typed::<f64, _>(dst, srcs, count, alpha),
            DataType::Int32 => self.reduce_typed::<i32, _>(dst, srcs, count, alpha),
            other => Err(unsupported_type(other)),
        }
    }

    fn reduce_multi_dst(&self, args: &ReduceMultiDstArgs) -> KernelResult<()> {
        check_sum(args.op)?;
        for (dst, src1, src2, count) in args.groups() {
            let srcs = [src1, src2];
            match args.dt {
                DataType::Float32 => self.reduce_typed::<f32, _>(dst, srcs, count, None)?,
                DataType::Float64 => self.reduce_typed::<f64, _>(dst, srcs, count, None)?,
                DataType::Int32 => self.reduce_typed::<i32, _>(dst, srcs, count, None)?,
                other => return Err(unsupported_type(other)),
            }
        }
        Ok(())
    }

    fn reduce_typed<T, I>(
        &self,
        dst: DevicePtr,
        srcs: I,
        count: usize,
        alpha: Option<f64>,
    ) -> KernelResult<()>
    where
        T: Element,
        I: IntoIterator<Item = DevicePtr>,
    {
        let mut srcs = srcs.into_iter();
        let first = srcs
            .next()
            .ok_or_else(|| KernelError::Malformed("reduction without sources".into()))?;

        let mut acc = self.heap.read_as::<T>(first, count)?;
        for src in srcs {
            let values = self.heap.read_as::<T>(src, count)?;
            for (a, v) in acc.iter_mut().zip(values) {
                *a = a.add(v);
            }
        }

        if let Some(alpha) = alpha {
            for a in acc.iter_mut() {
                *a = a.scale(alpha);
            }
        }

        self.heap.write_bytes(dst, bytemuck::cast_slice(&acc))
    }
}

impl TaskKernel for HostKernels {
    fn execute(&mut self, args: &TaskArgs) -> KernelResult<()> {
        match args {
            TaskArgs::Copy(a) => self.copy(a),
            TaskArgs::CopyMulti(a) => self.copy_multi(a),
            TaskArgs::Reduce(a) => self.reduce(a),
            TaskArgs::ReduceStrided(a) => self.reduce_strided(a),
            TaskArgs::ReduceMultiDst(a) => self.reduce_multi_dst(a),
        }
    }
}

fn check_sum(op: ReductionOp) -> KernelResult<()> {
    if op == ReductionOp::Sum {
        Ok(())
    } else {
        Err(KernelError::Unsupported(format!("reduction operator {}", op)))
    }
}

fn unsupported_type(dt: DataType) -> KernelError {
    KernelError::Unsupported(format!("datatype {}", dt))
}
