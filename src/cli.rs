// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::ParallelPolicy;

/// Command-line arguments for `orcaq`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "orcaq",
    version,
    about = "Run ORCA input files one after another, with cancellation on Ctrl-C.",
    long_about = None
)]
pub struct CliArgs {
    /// Input files to run, in order. Output goes to `<input>.out` beside each.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Path to a job file (TOML).
    ///
    /// Default: `Orcaq.toml` in the current directory, if it exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Executable to run; overrides `[engine].executable`.
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// How often to check the running process, in milliseconds.
    #[arg(long, value_name = "N")]
    pub poll_interval_ms: Option<u64>,

    /// Parallelism handling: `preserve` or `serial-when-unavailable`.
    ///
    /// Overrides `[engine].parallel_policy`.
    #[arg(long, value_name = "POLICY")]
    pub parallel_policy: Option<ParallelPolicy>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ORCAQ_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load and validate everything, print the job list, run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_inputs_and_flags() {
        let args = CliArgs::try_parse_from([
            "orcaq",
            "a.inp",
            "b.inp",
            "--executable",
            "/opt/orca/orca",
            "--poll-interval-ms",
            "50",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.inputs, vec![PathBuf::from("a.inp"), PathBuf::from("b.inp")]);
        assert_eq!(args.executable, Some(PathBuf::from("/opt/orca/orca")));
        assert_eq!(args.poll_interval_ms, Some(50));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(!args.dry_run);
        assert!(args.config.is_none());
    }

    #[test]
    fn parallel_policy_flag() {
        let args =
            CliArgs::try_parse_from(["orcaq", "--parallel-policy", "serial-when-unavailable"]).unwrap();
        assert_eq!(args.parallel_policy, Some(ParallelPolicy::SerialWhenUnavailable));

        assert!(CliArgs::try_parse_from(["orcaq", "--parallel-policy", "sometimes"]).is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        assert!(CliArgs::try_parse_from(["orcaq", "--log-level", "loud"]).is_err());
    }
}
