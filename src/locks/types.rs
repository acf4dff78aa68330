//! Lock acquisition policy and attempt outcomes.

use std::time::Duration;

/// Default number of lock attempts before giving up.
pub const DEFAULT_ATTEMPTS: u32 = 300;

/// Default pause between two lock attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// How long to keep asking for a lock that another owner holds.
///
/// The worst-case wait is `(attempts - 1) * interval`: there is no sleep
/// after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of non-blocking attempts, including the first.
    pub attempts: u32,

    /// Pause between two consecutive attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_INTERVAL)
    }
}

/// Outcome of a single non-blocking lock attempt that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockAttempt {
    /// The lock is now held by this process.
    Acquired,
    /// Another owner holds the lock.
    Contended,
}
