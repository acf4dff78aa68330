//! Process launcher for withlockfile.
//!
//! Runs one command to completion inside a containment group: a set of
//! processes that is killed as a whole once the group's owner lets go of it,
//! including when withlockfile itself is killed.
//!
//! The child is a member of the group before it executes its first
//! instruction:
//! - Windows: the child is created suspended, assigned to a Job Object
//!   configured with `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE`, then resumed.
//! - Unix: the group is a process group led by a keeper process that kills
//!   the whole group when the pipe it watches is closed. The child joins the
//!   group between fork and exec, so there is nothing left to resume.

mod command;

#[cfg(unix)]
#[path = "unix.rs"]
mod platform;

#[cfg(windows)]
#[path = "windows.rs"]
mod platform;

#[cfg(test)]
mod tests;

pub use command::CommandSpec;
pub use platform::ContainmentGroup;

use crate::error::{Result, WithLockError};
use std::process::Child;
use tracing::{debug, info, warn};

/// Run `spec` to completion and return its exit status.
///
/// Standard streams are inherited. There is no timeout.
pub fn launch(spec: &CommandSpec) -> Result<i32> {
    debug!(command = %spec, "launching");

    let group = ContainmentGroup::create()?;
    let mut child = ChildProcess::spawn(spec, &group)?;
    group.attach(&child.child)?;
    child.resume()?;
    let status = child.wait()?;

    // The group goes last: closing it kills anything the child left behind.
    drop(group);
    Ok(status)
}

/// A spawned child owned by one run.
///
/// If dropped before it has been waited for, the child is killed and
/// reaped, so a failure between spawn and wait never leaves it running
/// outside the wrapper's control.
struct ChildProcess {
    child: Child,
    reaped: bool,
}

impl ChildProcess {
    fn spawn(spec: &CommandSpec, group: &ContainmentGroup) -> Result<Self> {
        let child = platform::spawn_suspended(spec, group)?;
        debug!(pid = child.id(), "spawned child");
        Ok(Self {
            child,
            reaped: false,
        })
    }

    fn resume(&mut self) -> Result<()> {
        platform::resume(&self.child)
    }

    fn wait(mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .map_err(|e| WithLockError::from_io("wait", &e))?;
        self.reaped = true;

        let code = platform::exit_code(status);
        info!(pid = self.child.id(), code, "child exited");
        Ok(code)
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!(pid = self.child.id(), error = %e, "failed to kill child");
        }
        let _ = self.child.wait();
    }
}
