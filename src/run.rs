//! One run of withlockfile: lock, launch, unlock.

use crate::error::Result;
use crate::launcher::{self, CommandSpec};
use crate::locks::{self, RetryPolicy};
use std::path::PathBuf;
use tracing::debug;

/// Everything a run needs, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub lockfile: PathBuf,

    /// `[program, args...]`, exactly as given.
    pub command: Vec<String>,

    pub policy: RetryPolicy,
}

/// Run the command under the lock and return its exit status.
///
/// The lock is held until the child, and its containment group, are gone.
/// On any error after acquisition the token is dropped on the way out,
/// which unlocks and closes the lock file.
pub fn run(request: &RunRequest) -> Result<i32> {
    let token = locks::acquire(&request.lockfile, &request.policy)?;
    debug!(path = %token.path().display(), "lock held, preparing command");

    let spec = CommandSpec::resolve(&request.command)?;
    let status = launcher::launch(&spec)?;

    token.release()?;
    Ok(status)
}
