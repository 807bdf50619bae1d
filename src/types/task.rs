//! Task type definitions
//!
//! Defines the task kinds the executor accepts, the argument layout copied
//! into each ring slot, and the status values shared with the device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::DevicePtr;

/// Maximum number of source buffers of a single reduce task
pub const MAX_REDUCE_SRCS: usize = 9;

/// Maximum number of buffer groups of a multi-buffer task
pub const MAX_MULTI_BUFS: usize = 7;

/// Maximum number of strided operands (`n_src2`) of a strided reduce task
pub const MAX_STRIDED_SRCS: usize = 64;

// ─────────────────────────────────────────────────────────────────
// Task Kind
// ─────────────────────────────────────────────────────────────────

/// Kinds of work the executor can offload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Single buffer copy
    Copy,
    /// Up to `MAX_MULTI_BUFS` independent copies
    CopyMulti,
    /// Element-wise reduction of up to `MAX_REDUCE_SRCS` sources
    Reduce,
    /// Reduction of one source with a strided run of others
    ReduceStrided,
    /// Up to `MAX_MULTI_BUFS` independent two-source reductions
    ReduceMultiDst,
}

impl TaskKind {
    /// Get all task kinds
    pub fn all() -> &'static [TaskKind] {
        &[
            TaskKind::Copy,
            TaskKind::CopyMulti,
            TaskKind::Reduce,
            TaskKind::ReduceStrided,
            TaskKind::ReduceMultiDst,
        ]
    }

    /// Whether this kind carries a datatype and reduction operator
    pub fn is_reduction(&self) -> bool {
        matches!(
            self,
            TaskKind::Reduce | TaskKind::ReduceStrided | TaskKind::ReduceMultiDst
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Copy => write!(f, "copy"),
            TaskKind::CopyMulti => write!(f, "copy_multi"),
            TaskKind::Reduce => write!(f, "reduce"),
            TaskKind::ReduceStrided => write!(f, "reduce_strided"),
            TaskKind::ReduceMultiDst => write!(f, "reduce_multi_dst"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "copy" => Ok(TaskKind::Copy),
            "copy_multi" => Ok(TaskKind::CopyMulti),
            "reduce" => Ok(TaskKind::Reduce),
            "reduce_strided" => Ok(TaskKind::ReduceStrided),
            "reduce_multi_dst" => Ok(TaskKind::ReduceMultiDst),
            other => Err(Error::InvalidArgument(format!("unknown task kind '{}'", other))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Datatype & Reduction Operator
// ─────────────────────────────────────────────────────────────────

/// Element types a reduction can be asked to operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    BFloat16,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 | DataType::Float16 | DataType::BFloat16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
        }
    }

    /// Whether this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::Float16 | DataType::BFloat16 | DataType::Float32 | DataType::Float64
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float16 => "float16",
            DataType::BFloat16 => "bfloat16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "int8" | "i8" => Ok(DataType::Int8),
            "int16" | "i16" => Ok(DataType::Int16),
            "int32" | "i32" => Ok(DataType::Int32),
            "int64" | "i64" => Ok(DataType::Int64),
            "uint8" | "u8" => Ok(DataType::UInt8),
            "uint16" | "u16" => Ok(DataType::UInt16),
            "uint32" | "u32" => Ok(DataType::UInt32),
            "uint64" | "u64" => Ok(DataType::UInt64),
            "float16" | "f16" => Ok(DataType::Float16),
            "bfloat16" | "bf16" => Ok(DataType::BFloat16),
            "float32" | "f32" => Ok(DataType::Float32),
            "float64" | "f64" => Ok(DataType::Float64),
            other => Err(Error::InvalidArgument(format!("unknown datatype '{}'", other))),
        }
    }
}

/// Arithmetic combination applied across the sources of a reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionOp {
    Sum,
    Prod,
    Max,
    Min,
    Avg,
    Land,
    Lor,
    Lxor,
    Band,
    Bor,
    Bxor,
}

impl fmt::Display for ReductionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReductionOp::Sum => "sum",
            ReductionOp::Prod => "prod",
            ReductionOp::Max => "max",
            ReductionOp::Min => "min",
            ReductionOp::Avg => "avg",
            ReductionOp::Land => "land",
            ReductionOp::Lor => "lor",
            ReductionOp::Lxor => "lxor",
            ReductionOp::Band => "band",
            ReductionOp::Bor => "bor",
            ReductionOp::Bxor => "bxor",
        };
        f.write_str(name)
    }
}

impl FromStr for ReductionOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(ReductionOp::Sum),
            "prod" => Ok(ReductionOp::Prod),
            "max" => Ok(ReductionOp::Max),
            "min" => Ok(ReductionOp::Min),
            "avg" => Ok(ReductionOp::Avg),
            "land" => Ok(ReductionOp::Land),
            "lor" => Ok(ReductionOp::Lor),
            "lxor" => Ok(ReductionOp::Lxor),
            "band" => Ok(ReductionOp::Band),
            "bor" => Ok(ReductionOp::Bor),
            "bxor" => Ok(ReductionOp::Bxor),
            other => Err(Error::InvalidArgument(format!("unknown reduction op '{}'", other))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Status
// ─────────────────────────────────────────────────────────────────

/// Completion status of a queued task, as last written to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
    /// Slot has never held a task since the executor started
    Uninitialized = 0,
    /// Task is queued or executing
    Initialized = 1,
    /// Device finished the task
    Completed = 2,
    /// Device could not execute the task
    Failed = 3,
}

impl TaskStatus {
    /// Decode a raw status byte
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(TaskStatus::Uninitialized),
            1 => Some(TaskStatus::Initialized),
            2 => Some(TaskStatus::Completed),
            3 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Raw status byte
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    /// Whether the device is done with the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Uninitialized => write!(f, "uninitialized"),
            TaskStatus::Initialized => write!(f, "initialized"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Copy
// ─────────────────────────────────────────────────────────────────

/// Arguments of a single buffer copy
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CopyArgs {
    pub dst: DevicePtr,
    pub src: DevicePtr,
    /// Bytes to copy
    pub len: usize,
}

/// Arguments of a batch of independent copies
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CopyMultiArgs {
    pub dst: [DevicePtr; MAX_MULTI_BUFS],
    pub src: [DevicePtr; MAX_MULTI_BUFS],
    /// Bytes to copy per vector
    pub counts: [usize; MAX_MULTI_BUFS],
    pub num_vectors: usize,
}

impl CopyMultiArgs {
    /// Build from `(dst, src, len)` triples
    pub fn new(vectors: &[(DevicePtr, DevicePtr, usize)]) -> Result<Self> {
        if vectors.is_empty() || vectors.len() > MAX_MULTI_BUFS {
            return Err(Error::InvalidArgument(format!(
                "copy_multi takes 1 to {} vectors, got {}",
                MAX_MULTI_BUFS,
                vectors.len()
            )));
        }

        let mut args = Self {
            num_vectors: vectors.len(),
            ..Default::default()
        };
        for (i, &(dst, src, len)) in vectors.iter().enumerate() {
            args.dst[i] = dst;
            args.src[i] = src;
            args.counts[i] = len;
        }
        Ok(args)
    }

    /// Iterate the populated `(dst, src, len)` vectors
    pub fn vectors(&self) -> impl Iterator<Item = (DevicePtr, DevicePtr, usize)> + '_ {
        (0..self.num_vectors.min(MAX_MULTI_BUFS))
            .map(move |i| (self.dst[i], self.src[i], self.counts[i]))
    }
}

// ─────────────────────────────────────────────────────────────────
// Reductions
// ─────────────────────────────────────────────────────────────────

/// Arguments of `dst = alpha * (srcs[0] + ... + srcs[n-1])`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceArgs {
    pub dst: DevicePtr,
    pub srcs: [DevicePtr; MAX_REDUCE_SRCS],
    pub n_srcs: usize,
    /// Elements per buffer
    pub count: usize,
    pub dt: DataType,
    pub op: ReductionOp,
    /// Optional scaling of the result
    pub alpha: Option<f64>,
}

impl ReduceArgs {
    /// Reduce `srcs` element-wise into `dst`
    pub fn new(
        dst: DevicePtr,
        srcs: &[DevicePtr],
        count: usize,
        dt: DataType,
        op: ReductionOp,
    ) -> Result<Self> {
        if srcs.is_empty() || srcs.len() > MAX_REDUCE_SRCS {
            return Err(Error::InvalidArgument(format!(
                "reduce takes 1 to {} sources, got {}",
                MAX_REDUCE_SRCS,
                srcs.len()
            )));
        }

        let mut buf = [DevicePtr::NULL; MAX_REDUCE_SRCS];
        buf[..srcs.len()].copy_from_slice(srcs);
        Ok(Self {
            dst,
            srcs: buf,
            n_srcs: srcs.len(),
            count,
            dt,
            op,
            alpha: None,
        })
    }

    /// Scale the reduced result by `alpha`
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// The populated source buffers
    pub fn sources(&self) -> &[DevicePtr] {
        &self.srcs[..self.n_srcs.min(MAX_REDUCE_SRCS)]
    }
}

/// Arguments of `dst = alpha * (src1 + src2[0] + src2[stride] + ...)`
///
/// `stride` is in bytes and separates the `n_src2` consecutive operands that
/// start at `src2`. `n_src2` is at most [`MAX_STRIDED_SRCS`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceStridedArgs {
    pub dst: DevicePtr,
    pub src1: DevicePtr,
    pub src2: DevicePtr,
    pub stride: usize,
    pub n_src2: usize,
    pub count: usize,
    pub dt: DataType,
    pub op: ReductionOp,
    pub alpha: Option<f64>,
}

impl ReduceStridedArgs {
    /// Two-operand reduction; use [`ReduceStridedArgs::strided`] for more
    pub fn new(
        dst: DevicePtr,
        src1: DevicePtr,
        src2: DevicePtr,
        count: usize,
        dt: DataType,
        op: ReductionOp,
    ) -> Self {
        Self {
            dst,
            src1,
            src2,
            stride: count * dt.size_bytes(),
            n_src2: 1,
            count,
            dt,
            op,
            alpha: None,
        }
    }

    /// Read `n_src2` operands spaced `stride` bytes apart from `src2`
    pub fn strided(mut self, stride: usize, n_src2: usize) -> Self {
        self.stride = stride;
        self.n_src2 = n_src2;
        self
    }

    /// Scale the reduced result by `alpha`
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

/// Arguments of `dst[b] = src1[b] + src2[b]` for each buffer group `b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceMultiDstArgs {
    pub dst: [DevicePtr; MAX_MULTI_BUFS],
    pub src1: [DevicePtr; MAX_MULTI_BUFS],
    pub src2: [DevicePtr; MAX_MULTI_BUFS],
    /// Elements per group
    pub counts: [usize; MAX_MULTI_BUFS],
    pub n_bufs: usize,
    pub dt: DataType,
    pub op: ReductionOp,
}

impl ReduceMultiDstArgs {
    /// Build from `(dst, src1, src2, count)` groups
    pub fn new(
        groups: &[(DevicePtr, DevicePtr, DevicePtr, usize)],
        dt: DataType,
        op: ReductionOp,
    ) -> Result<Self> {
        if groups.is_empty() || groups.len() > MAX_MULTI_BUFS {
            return Err(Error::InvalidArgument(format!(
                "reduce_multi_dst takes 1 to {} buffer groups, got {}",
                MAX_MULTI_BUFS,
                groups.len()
            )));
        }

        let mut args = Self {
            dst: [DevicePtr::NULL; MAX_MULTI_BUFS],
            src1: [DevicePtr::NULL; MAX_MULTI_BUFS],
            src2: [DevicePtr::NULL; MAX_MULTI_BUFS],
            counts: [0; MAX_MULTI_BUFS],
            n_bufs: groups.len(),
            dt,
            op,
        };
        for (i, &(dst, src1, src2, count)) in groups.iter().enumerate() {
            args.dst[i] = dst;
            args.src1[i] = src1;
            args.src2[i] = src2;
            args.counts[i] = count;
        }
        Ok(args)
    }

    /// Iterate the populated `(dst, src1, src2, count)` groups
    pub fn groups(&self) -> impl Iterator<Item = (DevicePtr, DevicePtr, DevicePtr, usize)> + '_ {
        (0..self.n_bufs.min(MAX_MULTI_BUFS))
            .map(move |i| (self.dst[i], self.src1[i], self.src2[i], self.counts[i]))
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Arguments
// ─────────────────────────────────────────────────────────────────

/// Arguments of one task, copied by value into a ring slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskArgs {
    Copy(CopyArgs),
    CopyMulti(CopyMultiArgs),
    Reduce(ReduceArgs),
    ReduceStrided(ReduceStridedArgs),
    ReduceMultiDst(ReduceMultiDstArgs),
}

impl TaskArgs {
    /// Single buffer copy of `len` bytes
    pub fn copy(dst: DevicePtr, src: DevicePtr, len: usize) -> Self {
        TaskArgs::Copy(CopyArgs { dst, src, len })
    }

    /// The kind of this task
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskArgs::Copy(_) => TaskKind::Copy,
            TaskArgs::CopyMulti(_) => TaskKind::CopyMulti,
            TaskArgs::Reduce(_) => TaskKind::Reduce,
            TaskArgs::ReduceStrided(_) => TaskKind::ReduceStrided,
            TaskArgs::ReduceMultiDst(_) => TaskKind::ReduceMultiDst,
        }
    }

    /// Operator and datatype of a reduction task
    pub fn reduction(&self) -> Option<(ReductionOp, DataType)> {
        match self {
            TaskArgs::Copy(_) | TaskArgs::CopyMulti(_) => None,
            TaskArgs::Reduce(r) => Some((r.op, r.dt)),
            TaskArgs::ReduceStrided(r) => Some((r.op, r.dt)),
            TaskArgs::ReduceMultiDst(r) => Some((r.op, r.dt)),
        }
    }

    /// Check buffer-count fields against the fixed slot layout
    pub fn check_layout(&self) -> Result<()> {
        let (what, n, max) = match self {
            TaskArgs::Copy(_) => return Ok(()),
            TaskArgs::CopyMulti(a) => ("num_vectors", a.num_vectors, MAX_MULTI_BUFS),
            TaskArgs::Reduce(a) => ("n_srcs", a.n_srcs, MAX_REDUCE_SRCS),
            TaskArgs::ReduceStrided(a) => ("n_src2", a.n_src2, MAX_STRIDED_SRCS),
            TaskArgs::ReduceMultiDst(a) => ("n_bufs", a.n_bufs, MAX_MULTI_BUFS),
        };

        if n == 0 || n > max {
            return Err(Error::InvalidArgument(format!(
                "{} task has {} = {}, expected 1..={}",
                self.kind(),
                what,
                n,
                max
            )));
        }
        Ok(())
    }
}

impl Default for TaskArgs {
    fn default() -> Self {
        TaskArgs::Copy(CopyArgs::default())
    }
}

impl From<CopyArgs> for TaskArgs {
    fn from(args: CopyArgs) -> Self {
        TaskArgs::Copy(args)
    }
}

impl From<CopyMultiArgs> for TaskArgs {
    fn from(args: CopyMultiArgs) -> Self {
        TaskArgs::CopyMulti(args)
    }
}

impl From<ReduceArgs> for TaskArgs {
    fn from(args: ReduceArgs) -> Self {
        TaskArgs::Reduce(args)
    }
}

impl From<ReduceStridedArgs> for TaskArgs {
    fn from(args: ReduceStridedArgs) -> Self {
        TaskArgs::ReduceStrided(args)
    }
}

impl From<ReduceMultiDstArgs> for TaskArgs {
    fn from(args: ReduceMultiDstArgs) -> Self {
        TaskArgs::ReduceMultiDst(args)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_accepts_dashes() {
        assert_eq!("reduce-multi-dst".parse::<TaskKind>().unwrap(), TaskKind::ReduceMultiDst);
        assert_eq!("copy_multi".parse::<TaskKind>().unwrap(), TaskKind::CopyMulti);
        assert!("scatter".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_kind_display_round_trips() {
        for kind in TaskKind::all() {
            assert_eq!(kind.to_string().parse::<TaskKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_datatype_aliases() {
        assert_eq!("f32".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!("INT32".parse::<DataType>().unwrap(), DataType::Int32);
        assert_eq!(DataType::Float64.size_bytes(), 8);
        assert!(DataType::BFloat16.is_float());
        assert!(!DataType::UInt8.is_float());
    }

    #[test]
    fn test_status_raw_values() {
        for status in [
            TaskStatus::Uninitialized,
            TaskStatus::Initialized,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_raw(status.as_raw()), Some(status));
        }
        assert_eq!(TaskStatus::from_raw(9), None);
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Initialized.is_terminal());
    }

    #[test]
    fn test_reduce_args_source_limits() {
        let srcs = [DevicePtr::new(0x100); MAX_REDUCE_SRCS + 1];
        let dst = DevicePtr::new(0x10);
        assert!(ReduceArgs::new(dst, &srcs, 4, DataType::Float32, ReductionOp::Sum).is_err());
        assert!(ReduceArgs::new(dst, &[], 4, DataType::Float32, ReductionOp::Sum).is_err());

        let args = ReduceArgs::new(dst, &srcs[..3], 4, DataType::Float32, ReductionOp::Sum)
            .unwrap()
            .with_alpha(0.5);
        assert_eq!(args.sources().len(), 3);
        assert_eq!(args.alpha, Some(0.5));
    }

    #[test]
    fn test_strided_defaults_to_contiguous_pair() {
        let args = ReduceStridedArgs::new(
            DevicePtr::new(1),
            DevicePtr::new(2),
            DevicePtr::new(3),
            16,
            DataType::Float64,
            ReductionOp::Sum,
        );
        assert_eq!(args.stride, 128);
        assert_eq!(args.n_src2, 1);
    }

    #[test]
    fn test_check_layout() {
        assert!(TaskArgs::copy(DevicePtr::new(1), DevicePtr::new(2), 0).check_layout().is_ok());

        let mut multi = CopyMultiArgs::new(&[(DevicePtr::new(1), DevicePtr::new(2), 8)]).unwrap();
        assert!(TaskArgs::from(multi).check_layout().is_ok());
        multi.num_vectors = MAX_MULTI_BUFS + 1;
        assert!(TaskArgs::from(multi).check_layout().is_err());

        let strided = ReduceStridedArgs::new(
            DevicePtr::new(1),
            DevicePtr::new(2),
            DevicePtr::new(3),
            4,
            DataType::Int32,
            ReductionOp::Sum,
        )
        .strided(16, 0);
        assert!(TaskArgs::from(strided).check_layout().is_err());
        assert!(TaskArgs::from(strided.strided(16, MAX_STRIDED_SRCS)).check_layout().is_ok());
        assert!(TaskArgs::from(strided.strided(16, MAX_STRIDED_SRCS + 1)).check_layout().is_err());
        assert!(TaskArgs::from(strided.strided(16, usize::MAX)).check_layout().is_err());
    }

    #[test]
    fn test_reduction_accessor() {
        let copy = TaskArgs::copy(DevicePtr::new(1), DevicePtr::new(2), 8);
        assert_eq!(copy.kind(), TaskKind::Copy);
        assert!(copy.reduction().is_none());

        let groups = [(DevicePtr::new(1), DevicePtr::new(2), DevicePtr::new(3), 4)];
        let multi = ReduceMultiDstArgs::new(&groups, DataType::Int32, ReductionOp::Max).unwrap();
        assert_eq!(
            TaskArgs::from(multi).reduction(),
            Some((ReductionOp::Max, DataType::Int32))
        );
        assert_eq!(multi.groups().count(), 1);
    }
}
