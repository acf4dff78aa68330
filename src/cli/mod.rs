//! CLI argument parsing for withlockfile.
//!
//! Uses clap derive macros. Options must come before the lock file: the
//! lock file and the command are one trailing list, so nothing after the
//! lock file is ever read as an option.

use crate::exit_codes;
use crate::locks::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL, RetryPolicy};
use crate::run::RunRequest;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Run a command while holding an exclusive lock on a file.
///
/// Concurrent invocations sharing the same lock file run their commands one
/// at a time. The command and everything it spawns is killed if
/// withlockfile itself is killed. The exit status is the command's own.
#[derive(Parser, Debug)]
#[command(name = "withlockfile")]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "withlockfile [OPTIONS] <lockfile> <command> [args..]")]
pub struct Cli {
    /// Number of lock attempts before giving up.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_ATTEMPTS,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: u32,

    /// Milliseconds to wait between two lock attempts.
    #[arg(long = "retry-interval", value_name = "MS",
          default_value_t = DEFAULT_INTERVAL.as_millis() as u64)]
    pub retry_interval_ms: u64,

    /// Log level (overrides WITHLOCKFILE_LOG).
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// File to lock (created if absent, content never touched), then the
    /// command to run while the lock is held and its arguments.
    #[arg(value_name = "LOCKFILE COMMAND", required = true, num_args = 2..,
          trailing_var_arg = true, allow_hyphen_values = true)]
    pub invocation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Cli {
    /// Parse the process arguments.
    ///
    /// On failure the diagnostic (or help/version text) has already been
    /// printed, and `Err` carries the exit status to use: 1 for usage
    /// errors, 0 for `--help` / `--version`.
    pub fn parse_args() -> Result<Self, i32> {
        Cli::try_parse().map_err(|err| {
            let _ = err.print();
            if err.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            }
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.retry_interval_ms))
    }

    /// Split the trailing list into the lock file and the command.
    pub fn into_request(self) -> RunRequest {
        let policy = self.retry_policy();
        let mut invocation = self.invocation.into_iter();
        let lockfile = invocation.next().map(PathBuf::from).unwrap_or_default();
        RunRequest {
            lockfile,
            command: invocation.collect(),
            policy,
        }
    }
}
