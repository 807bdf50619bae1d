//! Synthetic workloads
//!
//! Drives an [`Executor`] with generated copy and reduction tasks whose
//! buffers live in a [`DeviceHeap`], then checks every destination buffer
//! against a host-computed expectation. Element values are small integers so
//! float sums are exact and the output digest is reproducible.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::device::{DeviceBuffer, DeviceHeap};
use crate::error::{Error, Result};
use crate::executor::{validate, Executor, TaskHandle, ThreadMode};
use crate::types::{
    CopyMultiArgs, DataType, ReduceArgs, ReduceMultiDstArgs, ReduceStridedArgs, ReductionOp,
    TaskArgs, TaskKind, TaskStatus, MAX_MULTI_BUFS, MAX_REDUCE_SRCS, MAX_STRIDED_SRCS,
};

/// How long a submitter keeps retrying a full ring
const SUBMIT_DEADLINE: Duration = Duration::from_secs(30);

/// How long to wait for a single task to turn terminal
const TASK_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────
// Workload Description
// ─────────────────────────────────────────────────────────────────

/// What to submit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub kind: TaskKind,
    pub dtype: DataType,
    pub op: ReductionOp,

    /// Number of tasks
    pub tasks: usize,

    /// Host threads submitting concurrently
    pub submitters: usize,

    /// Elements per buffer
    pub count: usize,

    /// Operands per task: sources of a reduce, vectors of a multi-copy,
    /// groups of a multi-destination reduce
    pub sources: usize,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            kind: TaskKind::Copy,
            dtype: DataType::Float32,
            op: ReductionOp::Sum,
            tasks: 64,
            submitters: 1,
            count: 1024,
            sources: 2,
        }
    }
}

/// Outcome of one workload run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadReport {
    pub kind: TaskKind,

    /// Tasks accepted by the executor
    pub submitted: usize,

    pub completed: usize,
    pub failed: usize,

    /// Tasks whose slot was reused before their status was read
    pub retired: usize,

    /// Submissions repeated because the ring was full
    pub queue_full_retries: u64,

    /// Destination buffers that differ from the expected result
    pub mismatches: usize,

    /// Whether submission stopped early on request
    pub cancelled: bool,

    pub elapsed: Duration,

    /// SHA-256 over every destination buffer, in task order
    pub digest: String,
}

impl WorkloadReport {
    /// Every submitted task produced the expected output
    pub fn verified(&self) -> bool {
        self.failed == 0 && self.mismatches == 0
    }

    pub fn tasks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.submitted as f64 / secs
        } else {
            0.0
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Preparation
// ─────────────────────────────────────────────────────────────────

/// A task's arguments plus the buffers behind them
struct PreparedTask {
    args: TaskArgs,
    inputs: Vec<DeviceBuffer>,
    outputs: Vec<(DeviceBuffer, Vec<u8>)>,
}

impl PreparedTask {
    fn release(&self, heap: &DeviceHeap) -> Result<()> {
        for buffer in self.inputs.iter().chain(self.outputs.iter().map(|(b, _)| b)) {
            heap.free(buffer.ptr())?;
        }
        Ok(())
    }
}

fn operand(task: usize, index: usize, count: usize) -> Vec<f64> {
    (0..count)
        .map(|j| ((task * 31 + index * 17 + j * 7) % 101) as f64)
        .collect()
}

fn pattern(task: usize, index: usize, len: usize) -> Vec<u8> {
    (0..len)
        .map(|j| ((task * 131 + index * 31 + j) % 251) as u8)
        .collect()
}

fn encode(dtype: DataType, values: &[f64]) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = match dtype {
        DataType::Float32 => {
            let v: Vec<f32> = values.iter().map(|x| *x as f32).collect();
            bytemuck::cast_slice(&v).to_vec()
        }
        DataType::Float64 => bytemuck::cast_slice(values).to_vec(),
        DataType::Int32 => {
            let v: Vec<i32> = values.iter().map(|x| *x as i32).collect();
            bytemuck::cast_slice(&v).to_vec()
        }
        other => {
            return Err(Error::InvalidArgument(format!(
                "workload cannot generate {} reduction data",
                other
            )))
        }
    };
    Ok(bytes)
}

fn sum(operands: &[Vec<f64>]) -> Vec<f64> {
    let mut out = vec![0.0; operands.first().map_or(0, Vec::len)];
    for values in operands {
        for (acc, v) in out.iter_mut().zip(values) {
            *acc += v;
        }
    }
    out
}

fn prepare(heap: &DeviceHeap, spec: &WorkloadSpec, task: usize) -> Result<PreparedTask> {
    let len = spec.count * spec.dtype.size_bytes();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    let args: TaskArgs = match spec.kind {
        TaskKind::Copy => {
            let bytes = pattern(task, 0, len);
            let src = heap.alloc_from::<u8>(&bytes)?;
            let dst = heap.alloc(len)?;
            let args = TaskArgs::copy(dst.ptr(), src.ptr(), len);
            inputs.push(src);
            outputs.push((dst, bytes));
            args
        }
        TaskKind::CopyMulti => {
            let mut vectors = Vec::new();
            for v in 0..spec.sources.clamp(1, MAX_MULTI_BUFS) {
                let bytes = pattern(task, v, len);
                let src = heap.alloc_from::<u8>(&bytes)?;
                let dst = heap.alloc(len)?;
                vectors.push((dst.ptr(), src.ptr(), len));
                inputs.push(src);
                outputs.push((dst, bytes));
            }
            CopyMultiArgs::new(&vectors)?.into()
        }
        TaskKind::Reduce => {
            let operands: Vec<_> = (0..spec.sources.clamp(1, MAX_REDUCE_SRCS))
                .map(|k| operand(task, k, spec.count))
                .collect();
            let mut srcs = Vec::new();
            for values in &operands {
                let src = heap.alloc_from::<u8>(&encode(spec.dtype, values)?)?;
                srcs.push(src.ptr());
                inputs.push(src);
            }
            let dst = heap.alloc(len)?;
            let args = ReduceArgs::new(dst.ptr(), &srcs, spec.count, spec.dtype, spec.op)?;
            outputs.push((dst, encode(spec.dtype, &sum(&operands))?));
            args.into()
        }
        TaskKind::ReduceStrided => {
            let n_src2 = spec.sources.saturating_sub(1).clamp(1, MAX_STRIDED_SRCS);
            let operands: Vec<_> = (0..=n_src2).map(|k| operand(task, k, spec.count)).collect();

            let src1 = heap.alloc_from::<u8>(&encode(spec.dtype, &operands[0])?)?;
            let mut block = Vec::with_capacity(len * n_src2);
            for values in &operands[1..] {
                block.extend(encode(spec.dtype, values)?);
            }
            let src2 = heap.alloc_from::<u8>(&block)?;
            let dst = heap.alloc(len)?;

            let args = ReduceStridedArgs::new(
                dst.ptr(),
                src1.ptr(),
                src2.ptr(),
                spec.count,
                spec.dtype,
                spec.op,
            )
            .strided(len, n_src2);
            inputs.push(src1);
            inputs.push(src2);
            outputs.push((dst, encode(spec.dtype, &sum(&operands))?));
            args.into()
        }
        TaskKind::ReduceMultiDst => {
            let mut groups = Vec::new();
            for g in 0..spec.sources.clamp(1, MAX_MULTI_BUFS) {
                let operands = [
                    operand(task, 2 * g, spec.count),
                    operand(task, 2 * g + 1, spec.count),
                ];
                let src1 = heap.alloc_from::<u8>(&encode(spec.dtype, &operands[0])?)?;
                let src2 = heap.alloc_from::<u8>(&encode(spec.dtype, &operands[1])?)?;
                let dst = heap.alloc(len)?;
                groups.push((dst.ptr(), src1.ptr(), src2.ptr(), spec.count));
                inputs.push(src1);
                inputs.push(src2);
                outputs.push((dst, encode(spec.dtype, &sum(&operands))?));
            }
            ReduceMultiDstArgs::new(&groups, spec.dtype, spec.op)?.into()
        }
    };

    Ok(PreparedTask {
        args,
        inputs,
        outputs,
    })
}

// ─────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────

fn check_spec(executor: &Executor, spec: &WorkloadSpec) -> Result<()> {
    if spec.tasks == 0 || spec.count == 0 || spec.submitters == 0 {
        return Err(Error::InvalidArgument(
            "workload needs at least one task, one element and one submitter".into(),
        ));
    }
    if executor.config().thread_mode == ThreadMode::Single && spec.submitters > 1 {
        return Err(Error::InvalidArgument(format!(
            "single thread mode allows one submitter, got {}",
            spec.submitters
        )));
    }

    let reduction = spec.kind.is_reduction().then_some((spec.op, spec.dtype));
    validate(spec.kind, reduction)
}

/// Submit, retrying while the ring is full
fn submit_with_retry(
    executor: &Executor,
    args: TaskArgs,
    retries: &AtomicU64,
) -> Result<TaskHandle> {
    let deadline = Instant::now() + SUBMIT_DEADLINE;
    let backoff = Backoff::new();

    loop {
        match executor.submit(args) {
            Ok(handle) => return Ok(handle),
            Err(e @ Error::QueueFull { .. }) => {
                if Instant::now() >= deadline {
                    return Err(e);
                }
                retries.fetch_add(1, Ordering::Relaxed);
                backoff.snooze();
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `spec` against a started executor
///
/// Setting `cancel` stops further submissions; tasks already submitted are
/// still awaited and verified.
pub fn run_workload(
    executor: &Executor,
    heap: &DeviceHeap,
    spec: &WorkloadSpec,
    cancel: &AtomicBool,
) -> Result<WorkloadReport> {
    check_spec(executor, spec)?;

    let prepared = (0..spec.tasks)
        .map(|task| prepare(heap, spec, task))
        .collect::<Result<Vec<_>>>()?;
    debug!(
        kind = %spec.kind,
        tasks = spec.tasks,
        heap_used = heap.used_bytes(),
        "Workload buffers prepared"
    );

    let outcome = execute(executor, &prepared, spec, cancel);

    for task in &prepared {
        task.release(heap)?;
    }
    outcome
}

fn execute(
    executor: &Executor,
    prepared: &[PreparedTask],
    spec: &WorkloadSpec,
    cancel: &AtomicBool,
) -> Result<WorkloadReport> {
    let retries = AtomicU64::new(0);
    let start = Instant::now();

    let per_thread: Vec<Result<Vec<(usize, TaskHandle)>>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..spec.submitters)
            .map(|t| {
                let retries = &retries;
                s.spawn(move || -> Result<Vec<(usize, TaskHandle)>> {
                    let mut handles = Vec::new();
                    for i in (t..prepared.len()).step_by(spec.submitters) {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let handle = submit_with_retry(executor, prepared[i].args, retries)?;
                        handles.push((i, handle));
                    }
                    Ok(handles)
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|w| {
                w.join()
                    .unwrap_or_else(|_| Err(Error::Internal("submitter thread panicked".into())))
            })
            .collect()
    });

    let mut submitted = Vec::new();
    for handles in per_thread {
        submitted.extend(handles?);
    }
    submitted.sort_by_key(|(i, _)| *i);

    let (mut completed, mut failed, mut retired) = (0, 0, 0);
    for (i, handle) in &submitted {
        match executor.wait(handle, TASK_TIMEOUT) {
            Ok(TaskStatus::Completed) => completed += 1,
            Ok(TaskStatus::Failed) => failed += 1,
            Ok(status) => {
                return Err(Error::device_fault(
                    executor.device().name(),
                    format!("task {} still {} after {:?}", i, status, TASK_TIMEOUT),
                ))
            }
            // the slot only turns over once the task is terminal
            Err(Error::StaleHandle { .. }) => retired += 1,
            Err(e) => return Err(e),
        }
    }
    let elapsed = start.elapsed();

    let mut hasher = Sha256::new();
    let mut mismatches = 0;
    for (i, _) in &submitted {
        for (dst, expected) in &prepared[*i].outputs {
            let actual = dst.read_bytes();
            hasher.update(&actual);
            if &actual != expected {
                mismatches += 1;
            }
        }
    }

    let report = WorkloadReport {
        kind: spec.kind,
        submitted: submitted.len(),
        completed,
        failed,
        retired,
        queue_full_retries: retries.load(Ordering::Relaxed),
        mismatches,
        cancelled: submitted.len() < prepared.len(),
        elapsed,
        digest: hex::encode(hasher.finalize()),
    };

    if report.verified() {
        info!(
            kind = %spec.kind,
            submitted = report.submitted,
            elapsed_ms = elapsed.as_millis() as u64,
            retries = report.queue_full_retries,
            "Workload verified"
        );
    } else {
        warn!(
            kind = %spec.kind,
            failed = report.failed,
            mismatches = report.mismatches,
            "Workload produced wrong results"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::device::{HostDevice, HostDeviceConfig};
    use crate::error::ErrorCode;
    use crate::executor::ExecutorConfig;

    fn running(max_tasks: usize, thread_mode: ThreadMode) -> (Executor, Arc<HostDevice>) {
        let device = Arc::new(HostDevice::with_config(HostDeviceConfig {
            heap_bytes: 64 * 1024 * 1024,
            ..Default::default()
        }));
        let executor = Executor::new(
            ExecutorConfig {
                max_tasks,
                thread_mode,
                ..Default::default()
            },
            device.clone(),
        )
        .unwrap();
        executor.start().unwrap();
        executor.wait_until_running(Duration::from_secs(5)).unwrap();
        (executor, device)
    }

    fn run(executor: &Executor, device: &HostDevice, spec: WorkloadSpec) -> WorkloadReport {
        run_workload(executor, device.heap(), &spec, &AtomicBool::new(false)).unwrap()
    }

    #[test]
    fn test_every_kind_verifies() {
        let (executor, device) = running(8, ThreadMode::Multiple);
        for &kind in TaskKind::all() {
            let report = run(
                &executor,
                &device,
                WorkloadSpec {
                    kind,
                    tasks: 20,
                    count: 33,
                    sources: 3,
                    ..Default::default()
                },
            );
            assert!(report.verified(), "{} failed: {:?}", kind, report);
            assert_eq!(report.submitted, 20);
            assert_eq!(report.completed + report.retired, 20);
            assert!(!report.cancelled);
        }
        executor.stop().unwrap();
        assert_eq!(device.heap().allocation_count(), 0);
    }

    #[test]
    fn test_int_and_double_reductions() {
        let (executor, device) = running(4, ThreadMode::Multiple);
        for dtype in [DataType::Int32, DataType::Float64] {
            let report = run(
                &executor,
                &device,
                WorkloadSpec {
                    kind: TaskKind::Reduce,
                    dtype,
                    tasks: 10,
                    count: 17,
                    sources: MAX_REDUCE_SRCS,
                    ..Default::default()
                },
            );
            assert!(report.verified());
        }
        executor.stop().unwrap();
    }

    #[test]
    fn test_digest_is_reproducible() {
        let spec = WorkloadSpec {
            kind: TaskKind::ReduceMultiDst,
            tasks: 6,
            count: 9,
            ..Default::default()
        };

        let (first, device_a) = running(4, ThreadMode::Multiple);
        let a = run(&first, &device_a, spec.clone());
        first.stop().unwrap();

        let (second, device_b) = running(2, ThreadMode::Multiple);
        let b = run(&second, &device_b, WorkloadSpec { submitters: 3, ..spec });
        second.stop().unwrap();

        assert_eq!(a.digest, b.digest);
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn test_concurrent_submitters_with_small_ring() {
        let (executor, device) = running(2, ThreadMode::Multiple);
        let report = run(
            &executor,
            &device,
            WorkloadSpec {
                tasks: 200,
                submitters: 4,
                count: 8,
                ..Default::default()
            },
        );
        assert!(report.verified());
        assert_eq!(report.submitted, 200);
        assert_eq!(executor.stats().submitted, 200);
        executor.stop().unwrap();
    }

    #[test]
    fn test_strided_operand_count_is_clamped() {
        let (executor, device) = running(4, ThreadMode::Multiple);
        let report = run(
            &executor,
            &device,
            WorkloadSpec {
                kind: TaskKind::ReduceStrided,
                tasks: 4,
                count: 8,
                sources: MAX_STRIDED_SRCS + 10,
                ..Default::default()
            },
        );
        assert!(report.verified());
        assert_eq!(report.submitted, 4);
        executor.stop().unwrap();
    }

    #[test]
    fn test_unsupported_reduction_rejected_up_front() {
        let (executor, device) = running(4, ThreadMode::Multiple);
        let spec = WorkloadSpec {
            kind: TaskKind::Reduce,
            op: ReductionOp::Prod,
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let err = run_workload(&executor, device.heap(), &spec, &cancel).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedOperation);
        assert_eq!(executor.post_index(), 0);
        assert_eq!(device.heap().allocation_count(), 0);
        executor.stop().unwrap();
    }

    #[test]
    fn test_single_mode_needs_one_submitter() {
        let (executor, device) = running(4, ThreadMode::Single);
        let spec = WorkloadSpec {
            submitters: 2,
            ..Default::default()
        };
        let cancel = AtomicBool::new(false);
        let err = run_workload(&executor, device.heap(), &spec, &cancel).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let report = run(&executor, &device, WorkloadSpec { tasks: 8, ..Default::default() });
        assert!(report.verified());
        executor.stop().unwrap();
    }

    #[test]
    fn test_cancelled_before_submission() {
        let (executor, device) = running(4, ThreadMode::Multiple);
        let spec = WorkloadSpec { tasks: 8, ..Default::default() };
        let report = run_workload(&executor, device.heap(), &spec, &AtomicBool::new(true)).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.submitted, 0);
        executor.stop().unwrap();
    }
}
