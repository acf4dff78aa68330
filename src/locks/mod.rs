//! Lock manager for withlockfile.
//!
//! A lock file is only an anchor: its content is never read or written.
//! Exclusion comes from an OS byte-range lock over the first byte of the
//! file, so any number of instances may open the same path concurrently
//! while at most one of them holds the lock.
//!
//! # Acquisition
//!
//! The lock is requested without blocking. While another owner holds it the
//! request is repeated according to a [`RetryPolicy`] (300 attempts one
//! second apart by default). Any other failure is returned at once.
//!
//! # Release
//!
//! [`guard::LockToken::release`] unlocks the byte range and closes the handle,
//! reporting failures. A token dropped without `release` (any error path)
//! does the same on a best-effort basis and logs what went wrong.

mod guard;
mod operations;
mod types;

#[cfg(unix)]
#[path = "unix.rs"]
mod platform;

#[cfg(windows)]
#[path = "windows.rs"]
mod platform;


pub use operations::acquire;
pub use types::{DEFAULT_ATTEMPTS, DEFAULT_INTERVAL, RetryPolicy};

/// Platform status code reported when the lock is still held by another owner.
pub const LOCK_HELD: i32 = platform::LOCK_HELD;
