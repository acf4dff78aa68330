//! Lock acquisition with bounded retries.

use super::guard::LockToken;
use super::platform;
use super::types::{LockAttempt, RetryPolicy};
use super::LOCK_HELD;
use crate::error::{Result, WithLockError};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Open (creating if absent) the lock file at `path` and acquire it.
///
/// # Returns
///
/// * `Ok(LockToken)` - the lock is held until the token is released or dropped
/// * `Err(WithLockError::Os { operation: "lock", code: LOCK_HELD })` - still
///   held by another owner after every attempt of `policy`
/// * `Err(WithLockError::Os { .. })` - opening or locking failed otherwise
pub fn acquire(path: &Path, policy: &RetryPolicy) -> Result<LockToken> {
    let file = platform::open_lock_file(path)
        .map_err(|e| WithLockError::from_io("open lock file", &e))?;

    // On failure `file` is dropped here, which closes the handle.
    acquire_with(policy, || platform::try_lock(&file), std::thread::sleep)?;

    info!(path = %path.display(), "acquired lock");
    Ok(LockToken::new(path.to_path_buf(), file))
}

/// The retry loop behind [`acquire`], with the attempt and the pause injected.
///
/// Only [`LockAttempt::Contended`] is retried; an error from `try_once` ends
/// the loop immediately.
pub(crate) fn acquire_with<T, S>(policy: &RetryPolicy, mut try_once: T, mut sleep: S) -> Result<()>
where
    T: FnMut() -> Result<LockAttempt>,
    S: FnMut(Duration),
{
    for attempt in 1..=policy.attempts {
        match try_once()? {
            LockAttempt::Acquired => {
                debug!(attempt, "lock attempt succeeded");
                return Ok(());
            }
            LockAttempt::Contended => {
                debug!(attempt, attempts = policy.attempts, "lock is held elsewhere");
                if attempt < policy.attempts {
                    sleep(policy.interval);
                }
            }
        }
    }

    Err(WithLockError::os("lock", LOCK_HELD))
}
