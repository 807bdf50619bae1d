//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for accel-exec.

use clap::{Parser, Subcommand};

use accel_exec::executor::ThreadMode;
use accel_exec::types::{DataType, ReductionOp, TaskKind};

/// accel-exec - persistent accelerator task executor
///
/// Drives copy and reduction tasks through a host/device shared task ring,
/// verifies their results, and measures throughput.
#[derive(Parser, Debug)]
#[command(name = "accel-exec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "ACCEL_EXEC_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a self-verifying workload through a host device
    Run {
        /// Task kind (copy, copy-multi, reduce, reduce-strided, reduce-multi-dst)
        #[arg(short, long, default_value = "copy")]
        kind: TaskKind,

        /// Element datatype
        #[arg(short, long, default_value = "float32")]
        dtype: DataType,

        /// Reduction operator
        #[arg(long, default_value = "sum")]
        op: ReductionOp,

        /// Number of tasks to submit
        #[arg(short, long, default_value = "1024")]
        tasks: usize,

        /// Host threads submitting concurrently
        #[arg(short, long, default_value = "1")]
        submitters: usize,

        /// Elements per buffer
        #[arg(long, default_value = "1024")]
        count: usize,

        /// Operands per task (reduce sources, copy vectors, destination groups)
        #[arg(long, default_value = "2")]
        sources: usize,

        /// Override the ring capacity
        #[arg(long)]
        max_tasks: Option<usize>,

        /// Override the submission thread mode (single, multiple)
        #[arg(long)]
        thread_mode: Option<ThreadMode>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run throughput benchmarks across every task kind
    Benchmark {
        /// Number of benchmark iterations
        #[arg(short, long, default_value = "3")]
        iterations: u32,

        /// Tasks per iteration
        #[arg(short, long, default_value = "256")]
        tasks: usize,

        /// Host threads submitting concurrently
        #[arg(short, long, default_value = "1")]
        submitters: usize,

        /// Output file for benchmark results (JSON)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Display version and build information
    Version {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Verifies that the CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["accel-exec", "run"]);
        match cli.command {
            Commands::Run {
                kind,
                dtype,
                op,
                tasks,
                submitters,
                max_tasks,
                thread_mode,
                json,
                ..
            } => {
                assert_eq!(kind, TaskKind::Copy);
                assert_eq!(dtype, DataType::Float32);
                assert_eq!(op, ReductionOp::Sum);
                assert_eq!(tasks, 1024);
                assert_eq!(submitters, 1);
                assert!(max_tasks.is_none());
                assert!(thread_mode.is_none());
                assert!(!json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_options() {
        let cli = Cli::parse_from([
            "accel-exec",
            "run",
            "--kind",
            "reduce-strided",
            "--dtype",
            "int32",
            "--submitters",
            "4",
            "--max-tasks",
            "8",
            "--thread-mode",
            "single",
        ]);
        match cli.command {
            Commands::Run {
                kind,
                dtype,
                submitters,
                max_tasks,
                thread_mode,
                ..
            } => {
                assert_eq!(kind, TaskKind::ReduceStrided);
                assert_eq!(dtype, DataType::Int32);
                assert_eq!(submitters, 4);
                assert_eq!(max_tasks, Some(8));
                assert_eq!(thread_mode, Some(ThreadMode::Single));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["accel-exec", "run", "--kind", "scatter"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from([
            "accel-exec",
            "config",
            "show",
            "--config",
            "/path/to/config.toml",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert!(matches!(
            cli.command,
            Commands::Config {
                subcommand: ConfigSubcommand::Show
            }
        ));
    }

    #[test]
    fn test_benchmark_defaults() {
        let cli = Cli::parse_from(["accel-exec", "benchmark"]);
        match cli.command {
            Commands::Benchmark {
                iterations,
                tasks,
                output,
                ..
            } => {
                assert_eq!(iterations, 3);
                assert_eq!(tasks, 256);
                assert!(output.is_none());
            }
            _ => panic!("Expected Benchmark command"),
        }
    }

    #[test]
    fn test_benchmark_with_options() {
        let cli = Cli::parse_from([
            "accel-exec",
            "benchmark",
            "--iterations",
            "10",
            "--output",
            "results.json",
        ]);
        match cli.command {
            Commands::Benchmark { iterations, output, .. } => {
                assert_eq!(iterations, 10);
                assert_eq!(output, Some("results.json".to_string()));
            }
            _ => panic!("Expected Benchmark command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["accel-exec", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["accel-exec", "--quiet", "version", "--json"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Version { json: true }));
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["accel-exec", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
