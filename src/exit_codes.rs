//! Exit code constants for the withlockfile CLI.
//!
//! Most exit statuses are not chosen by withlockfile at all:
//! - the child's own exit status is passed through on success
//! - an OS-level failure exits with the platform status code
//!
//! The constants below cover the remaining cases.

/// Successful execution (also used for `--help` / `--version`).
pub const SUCCESS: i32 = 0;

/// Missing or malformed command-line arguments.
pub const USAGE_ERROR: i32 = 1;

/// A failure that carries no platform status code.
pub const GENERIC_FAILURE: i32 = 1;

/// Base for reporting a child killed by a signal (`128 + signo`), as shells do.
pub const SIGNAL_BASE: i32 = 128;
