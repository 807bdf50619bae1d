//! Executor throughput benchmarks
//!
//! Runs the synthetic workload for every task kind against a fresh host
//! device and reports submission throughput and per-task latency.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::{DeviceContext, HostDevice, HostDeviceConfig};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorConfig, ThreadMode};
use crate::types::{DataType, ReductionOp, TaskKind};

use super::workload::{run_workload, WorkloadSpec};

/// Start acknowledgement bound used by the benchmark executor
const START_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────
// Benchmark Results
// ─────────────────────────────────────────────────────────────────

/// Complete benchmark results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    /// When the benchmark was run
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Device backend measured
    pub device: String,

    pub max_tasks: usize,
    pub thread_mode: ThreadMode,
    pub submitters: usize,
    pub iterations: u32,

    /// One entry per task kind
    pub kinds: Vec<KindBenchmark>,

    /// Duration of the full benchmark
    pub duration_secs: f32,
}

/// Measurements for one task kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindBenchmark {
    pub kind: TaskKind,

    /// Tasks per iteration
    pub tasks: usize,

    /// Mean throughput across iterations
    pub mean_tasks_per_second: f64,

    /// Best single iteration
    pub best_tasks_per_second: f64,

    /// Mean wall time per task, submission to completion (microseconds)
    pub mean_task_latency_us: f64,

    /// Full-ring retries summed over all iterations
    pub queue_full_retries: u64,

    /// All iterations produced the expected outputs
    pub verified: bool,
}

// ─────────────────────────────────────────────────────────────────
// Benchmark Runner
// ─────────────────────────────────────────────────────────────────

/// Runs performance benchmarks
pub struct BenchmarkRunner {
    /// Number of iterations for each task kind
    iterations: u32,

    /// Executor configuration under test
    executor: ExecutorConfig,

    /// Shape of every iteration's workload
    workload: WorkloadSpec,

    /// Benchmark results storage path
    results_path: Option<PathBuf>,
}

impl BenchmarkRunner {
    /// Create a new benchmark runner
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
            executor: ExecutorConfig::default(),
            workload: WorkloadSpec {
                tasks: 256,
                count: 256,
                ..Default::default()
            },
            results_path: None,
        }
    }

    pub fn with_executor(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    /// Set tasks per iteration, elements per buffer and submitter threads
    pub fn with_workload(mut self, tasks: usize, count: usize, submitters: usize) -> Self {
        self.workload.tasks = tasks;
        self.workload.count = count;
        self.workload.submitters = submitters;
        self
    }

    /// Set the path to store benchmark results
    pub fn with_results_path(mut self, path: PathBuf) -> Self {
        self.results_path = Some(path);
        self
    }

    /// Run all benchmarks
    pub fn run(&self) -> Result<BenchmarkResults> {
        info!(
            iterations = self.iterations,
            max_tasks = self.executor.max_tasks,
            tasks = self.workload.tasks,
            "Starting benchmarks"
        );
        let start = Instant::now();

        let device = Arc::new(HostDevice::with_config(HostDeviceConfig {
            heap_bytes: self.heap_bytes(),
            ..Default::default()
        }));
        let executor = Executor::new(self.executor.clone(), device.clone())?;
        executor.start()?;
        executor.wait_until_running(START_TIMEOUT)?;

        let measured = TaskKind::all()
            .iter()
            .map(|&kind| self.run_kind(&executor, &device, kind))
            .collect::<Result<Vec<_>>>();
        executor.stop()?;
        let kinds = measured?;

        let results = BenchmarkResults {
            timestamp: chrono::Utc::now(),
            device: device.name().to_string(),
            max_tasks: self.executor.max_tasks,
            thread_mode: self.executor.thread_mode,
            submitters: self.workload.submitters,
            iterations: self.iterations,
            kinds,
            duration_secs: start.elapsed().as_secs_f32(),
        };

        info!(duration_secs = results.duration_secs, "Benchmark complete");

        // Save results if path is configured
        if let Some(ref path) = self.results_path {
            self.save_results(&results, path)?;
        }

        Ok(results)
    }

    fn run_kind(
        &self,
        executor: &Executor,
        device: &HostDevice,
        kind: TaskKind,
    ) -> Result<KindBenchmark> {
        let spec = WorkloadSpec {
            kind,
            dtype: DataType::Float32,
            op: ReductionOp::Sum,
            ..self.workload.clone()
        };
        let never = AtomicBool::new(false);

        let mut throughput = Vec::with_capacity(self.iterations as usize);
        let mut latency_us = 0.0;
        let mut retries = 0;
        let mut verified = true;

        for iteration in 0..self.iterations {
            let report = run_workload(executor, device.heap(), &spec, &never)?;
            throughput.push(report.tasks_per_second());
            latency_us += report.elapsed.as_secs_f64() * 1e6 / report.submitted.max(1) as f64;
            retries += report.queue_full_retries;
            verified &= report.verified();
            debug!(
                kind = %kind,
                iteration,
                tasks_per_second = report.tasks_per_second(),
                "Benchmark iteration complete"
            );
        }

        let n = throughput.len().max(1) as f64;
        Ok(KindBenchmark {
            kind,
            tasks: spec.tasks,
            mean_tasks_per_second: throughput.iter().sum::<f64>() / n,
            best_tasks_per_second: throughput.iter().cloned().fold(0.0, f64::max),
            mean_task_latency_us: latency_us / n,
            queue_full_retries: retries,
            verified,
        })
    }

    /// Heap large enough for the widest task kind of one iteration
    fn heap_bytes(&self) -> usize {
        // widest kind allocates three buffers per group, seven groups
        let per_task = 3 * 7 * self.workload.count * DataType::Float64.size_bytes() + 21 * 512;
        (per_task * self.workload.tasks).max(16 * 1024 * 1024)
    }

    /// Save benchmark results to file
    fn save_results(&self, results: &BenchmarkResults, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(results)?;

        std::fs::write(path, json).map_err(|e| Error::IoWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(path = %path.display(), "Benchmark results saved");
        Ok(())
    }

    /// Load previous benchmark results
    pub fn load_results(path: &Path) -> Result<BenchmarkResults> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(3)
    }
}
