//! accel-exec - persistent accelerator task executor
//!
//! Command-line driver around the library: runs self-verifying workloads and
//! benchmarks against a host-simulated device, and manages configuration.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use accel_exec::config::{self, AppConfig};
use accel_exec::device::{DeviceContext, HostDevice, HostDeviceConfig};
use accel_exec::error::{Error, Result};
use accel_exec::executor::{Executor, ExecutorConfig};
use accel_exec::logging::{self, LogGuards};
use accel_exec::system::{
    run_workload, BenchmarkResults, BenchmarkRunner, WorkloadReport, WorkloadSpec,
};
use accel_exec::version;

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    // Commands that don't need configuration or logging
    match &cli.command {
        Commands::Version { json } => {
            return if *json {
                version::print_version_json()
            } else {
                version::print_version();
                Ok(())
            };
        }
        Commands::Config { subcommand } => {
            return handle_config_command(cli.config.as_deref(), subcommand.clone());
        }
        _ => {}
    }

    let mut config = AppConfig::load(cli.config.as_deref())?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = init_logging_from_config(&config, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting accel-exec"
    );

    match cli.command {
        Commands::Run {
            kind,
            dtype,
            op,
            tasks,
            submitters,
            count,
            sources,
            max_tasks,
            thread_mode,
            json,
        } => {
            if let Some(max_tasks) = max_tasks {
                config.executor.max_tasks = max_tasks;
            }
            if let Some(thread_mode) = thread_mode {
                config.executor.thread_mode = thread_mode;
            }
            config.validate()?;

            let spec = WorkloadSpec {
                kind,
                dtype,
                op,
                tasks,
                submitters,
                count,
                sources,
            };
            run_command(config, spec, json)
        }
        Commands::Benchmark {
            iterations,
            tasks,
            submitters,
            output,
        } => run_benchmark(&config, iterations, tasks, submitters, output),
        Commands::Version { .. } | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    }
}

/// Initialize logging from configuration
fn init_logging_from_config(config: &AppConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

/// Run a workload on a multi-threaded runtime so Ctrl-C can cancel it
fn run_command(config: AppConfig, spec: WorkloadSpec, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(1, 4))
        .thread_name("accel-exec")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    let report = runtime.block_on(async_run(config, spec))?;
    print_report(&report, json)?;

    if !report.verified() {
        return Err(Error::device_fault(
            "host",
            format!(
                "{} failed tasks and {} mismatched buffers out of {} tasks",
                report.failed, report.mismatches, report.submitted
            ),
        ));
    }
    Ok(())
}

async fn async_run(config: AppConfig, spec: WorkloadSpec) -> Result<WorkloadReport> {
    let device = Arc::new(HostDevice::with_config(HostDeviceConfig::from(&config.device)));
    let executor = Arc::new(Executor::new(
        ExecutorConfig::from(&config.executor),
        device.clone(),
    )?);

    info!(
        device = device.name(),
        kind = %spec.kind,
        tasks = spec.tasks,
        submitters = spec.submitters,
        max_tasks = config.executor.max_tasks,
        thread_mode = %config.executor.thread_mode,
        "Running workload"
    );

    executor.start()?;
    let start_timeout = config.executor.start_timeout();
    let running = executor.clone();
    tokio::task::spawn_blocking(move || running.wait_until_running(start_timeout))
        .await
        .map_err(|e| Error::Internal(format!("start wait failed: {}", e)))??;

    let cancel = Arc::new(AtomicBool::new(false));
    let mut job = tokio::task::spawn_blocking({
        let executor = executor.clone();
        let device = device.clone();
        let cancel = cancel.clone();
        move || run_workload(&executor, device.heap(), &spec, &cancel)
    });

    // Set up graceful shutdown on Ctrl+C
    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let joined = tokio::select! {
        joined = &mut job => joined,
        _ = &mut shutdown_signal => {
            warn!("Shutdown signal received, draining submitted tasks");
            cancel.store(true, Ordering::Relaxed);
            job.await
        }
    };
    let outcome = joined
        .map_err(|e| Error::Internal(format!("workload task failed: {}", e)))
        .and_then(|report| report);

    let stopping = executor.clone();
    let stopped = tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .map_err(|e| Error::Internal(format!("stop failed: {}", e)))
        .and_then(|stop| stop);

    let report = outcome?;
    stopped?;
    Ok(report)
}

fn print_report(report: &WorkloadReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Workload:    {}", report.kind);
    let cancelled = if report.cancelled { " (cancelled)" } else { "" };
    println!("Submitted:   {}{}", report.submitted, cancelled);
    println!("Completed:   {}", report.completed);
    println!("Failed:      {}", report.failed);
    println!("Retired:     {}", report.retired);
    println!("Mismatches:  {}", report.mismatches);
    println!("Retries:     {}", report.queue_full_retries);
    println!("Elapsed:     {:.3} s", report.elapsed.as_secs_f64());
    println!("Throughput:  {:.0} tasks/s", report.tasks_per_second());
    println!("Verified:    {}", if report.verified() { "yes" } else { "NO" });
    println!("SHA-256:     {}", report.digest);
    Ok(())
}

/// Run throughput benchmarks
fn run_benchmark(
    config: &AppConfig,
    iterations: u32,
    tasks: usize,
    submitters: usize,
    output: Option<String>,
) -> Result<()> {
    let mut runner = BenchmarkRunner::new(iterations)
        .with_executor(ExecutorConfig::from(&config.executor))
        .with_workload(tasks, 256, submitters);

    if let Some(path) = output {
        let expanded = shellexpand::tilde(&path).to_string();
        runner = runner.with_results_path(PathBuf::from(expanded));
    }

    let results = runner.run()?;
    print_benchmark(&results);
    Ok(())
}

fn print_benchmark(results: &BenchmarkResults) {
    println!(
        "Device: {}  capacity: {}  thread mode: {}  submitters: {}  iterations: {}",
        results.device,
        results.max_tasks,
        results.thread_mode,
        results.submitters,
        results.iterations
    );
    println!();
    println!(
        "{:<18} {:>8} {:>14} {:>14} {:>12} {:>9} {:>9}",
        "kind", "tasks", "mean tasks/s", "best tasks/s", "latency us", "retries", "verified"
    );
    for kind in &results.kinds {
        println!(
            "{:<18} {:>8} {:>14.0} {:>14.0} {:>12.2} {:>9} {:>9}",
            kind.kind.to_string(),
            kind.tasks,
            kind.mean_tasks_per_second,
            kind.best_tasks_per_second,
            kind.mean_task_latency_us,
            kind.queue_full_retries,
            if kind.verified { "yes" } else { "NO" }
        );
    }
    println!();
    println!("Completed in {:.2} s", results.duration_secs);
}

fn handle_config_command(config_path: Option<&str>, subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = AppConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Created configuration file at {}", written.display());
        }
        ConfigSubcommand::Validate => {
            let cfg = AppConfig::load(config_path)?;
            println!(
                "Configuration is valid (max_tasks = {}, thread_mode = {}).",
                cfg.executor.max_tasks, cfg.executor.thread_mode
            );
        }
    }

    Ok(())
}
