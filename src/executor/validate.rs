//! Submission validation
//!
//! Decides whether a task can be offloaded at all, before the producer touches
//! the ring. Pure and stateless.

use crate::error::{Error, Result};
use crate::types::{DataType, ReductionOp, TaskArgs, TaskKind};

/// Datatypes the reduction kernels accept
pub const SUPPORTED_REDUCTION_TYPES: &[DataType] =
    &[DataType::Float32, DataType::Float64, DataType::Int32];

/// Check a (kind, operator, datatype) triple
///
/// Copy kinds are always supported and ignore `reduction`. Reduction kinds
/// are supported for `Sum` over [`SUPPORTED_REDUCTION_TYPES`] only.
pub fn validate(kind: TaskKind, reduction: Option<(ReductionOp, DataType)>) -> Result<()> {
    if !kind.is_reduction() {
        return Ok(());
    }

    let (op, dt) = reduction
        .ok_or_else(|| Error::unsupported(kind, "reduction task without operator and datatype"))?;

    if op != ReductionOp::Sum {
        return Err(Error::unsupported(kind, format!("operator {} is not supported", op)));
    }
    if !SUPPORTED_REDUCTION_TYPES.contains(&dt) {
        return Err(Error::unsupported(kind, format!("datatype {} is not supported", dt)));
    }

    Ok(())
}

/// Validate the arguments of a task about to be submitted
pub fn validate_args(args: &TaskArgs) -> Result<()> {
    validate(args.kind(), args.reduction())?;
    args.check_layout()
}
