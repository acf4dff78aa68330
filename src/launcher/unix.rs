//! Containment on Unix: a process group guarded by a keeper process.
//!
//! The keeper is forked from withlockfile and leads a fresh process group.
//! It blocks reading a pipe whose only write end stays in withlockfile
//! (close-on-exec, so the child never inherits it). The write end closes
//! when the [`ContainmentGroup`] is dropped or when withlockfile dies for
//! any reason, including `SIGKILL`. The keeper then reads end-of-file and
//! sends `SIGKILL` to the whole group, itself included.
//!
//! While withlockfile owns the terminal the group is made its foreground
//! process group, so the child reads and writes the terminal as if it had
//! been started directly. Ownership is handed back before the group closes.
//!
//! A descendant that moves itself to another process group or session
//! (`setpgid`, `setsid`) is outside the group and is not killed with it.

use super::command::CommandSpec;
use crate::error::{Result, WithLockError};
use crate::exit_codes;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{SigHandler, SigSet, SigmaskHow, Signal, killpg, signal, sigprocmask};
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork, getpgid, getpgrp, setpgid, tcgetpgrp, tcsetpgrp};
use std::io::{self, IsTerminal, PipeReader, PipeWriter, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, warn};

/// Signals the keeper must survive: terminal, hang-up and polite termination.
const KEEPER_IGNORES: [Signal; 8] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGPIPE,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// A process group whose members are killed when this value is dropped or
/// its owner dies.
#[derive(Debug)]
pub struct ContainmentGroup {
    keeper: Pid,
    kill_switch: Option<PipeWriter>,

    /// Held while the group is the terminal's foreground process group.
    terminal: Option<Foreground>,
}

impl ContainmentGroup {
    /// Fork the keeper and make it the leader of a new process group.
    pub fn create() -> Result<Self> {
        let (watch, kill_switch) =
            io::pipe().map_err(|e| WithLockError::from_io("create containment group", &e))?;

        // Keep the keeper from dying to a signal before it ignores them.
        let mut blocked = SigSet::empty();
        for sig in KEEPER_IGNORES {
            blocked.add(sig);
        }
        let mut previous = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous))
            .map_err(|e| WithLockError::os("create containment group", e as i32))?;

        // SAFETY: the child branch only makes async-signal-safe calls (no
        // allocation, no locks) before `_exit`.
        let forked = match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                drop(kill_switch);
                keep_watch(watch, &previous)
            }
            Ok(ForkResult::Parent { child }) => Ok(child),
            Err(e) => Err(e),
        };
        let restored = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None);
        drop(watch);

        let keeper = forked.map_err(|e| WithLockError::os("create containment group", e as i32))?;
        let mut group = Self {
            keeper,
            kill_switch: Some(kill_switch),
            terminal: None,
        };
        restored.map_err(|e| WithLockError::os("create containment group", e as i32))?;

        // The keeper does the same; whichever runs first wins.
        setpgid(keeper, keeper)
            .map_err(|e| WithLockError::os("configure containment group", e as i32))?;
        group.terminal = Foreground::hand_to(keeper)?;

        debug!(pgid = keeper.as_raw(), "created containment group");
        Ok(group)
    }

    /// Process group id that children are spawned into.
    pub fn id(&self) -> i32 {
        self.keeper.as_raw()
    }

    /// Confirm the child joined the group at spawn time.
    ///
    /// A child that has already exited and been reaped is tolerated: it
    /// joined the group before exec, so so did anything it spawned.
    pub fn attach(&self, child: &Child) -> Result<()> {
        let pid = Pid::from_raw(child.id() as i32);
        match getpgid(Some(pid)) {
            Ok(pgid) if pgid == self.keeper => Ok(()),
            Ok(pgid) => Err(WithLockError::Generic(format!(
                "attach to containment group failed: child {} is in process group {}, expected {}",
                pid,
                pgid,
                self.keeper
            ))),
            Err(Errno::ESRCH) => {
                debug!(pid = pid.as_raw(), "child gone before attach check");
                Ok(())
            }
            Err(e) => Err(WithLockError::os("attach to containment group", e as i32)),
        }
    }
}

impl Drop for ContainmentGroup {
    fn drop(&mut self) {
        drop(self.terminal.take());
        // End-of-file on the keeper's pipe fires the group kill.
        drop(self.kill_switch.take());
        if let Err(e) = waitpid(self.keeper, None) {
            warn!(keeper = self.keeper.as_raw(), error = %e, "failed to reap containment keeper");
        }
    }
}

/// Body of the keeper process. Never returns.
fn keep_watch(mut watch: PipeReader, mask: &SigSet) -> ! {
    close_inherited_fds(watch.as_raw_fd());
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    for sig in KEEPER_IGNORES {
        // SAFETY: `SigIgn` installs no handler code.
        let _ = unsafe { signal(sig, SigHandler::SigIgn) };
    }
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(mask), None);

    let mut buf = [0u8; 1];
    loop {
        match watch.read(&mut buf) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    let _ = killpg(getpgrp(), Signal::SIGKILL);
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, neither of
    // which belongs to the keeper.
    unsafe { libc::_exit(0) }
}

/// The controlling terminal, lent to a containment group.
///
/// Only taken when withlockfile is in the terminal's foreground process
/// group; a wrapper started in the background leaves the terminal alone.
/// Dropping the value hands the terminal back.
#[derive(Debug)]
struct Foreground {
    owner: Pid,
}

impl Foreground {
    fn hand_to(group: Pid) -> Result<Option<Self>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }
        let owner = getpgrp();
        match tcgetpgrp(&stdin) {
            Ok(pgrp) if pgrp == owner => {}
            _ => return Ok(None),
        }

        set_foreground(group)
            .map_err(|e| WithLockError::os("configure containment group", e as i32))?;
        debug!(pgid = group.as_raw(), "handed terminal to containment group");
        Ok(Some(Self { owner }))
    }
}

impl Drop for Foreground {
    fn drop(&mut self) {
        if let Err(e) = set_foreground(self.owner) {
            warn!(pgid = self.owner.as_raw(), error = %e, "failed to take back the terminal");
        }
    }
}

/// `tcsetpgrp` on standard input with `SIGTTOU` blocked. A caller outside
/// the foreground process group would otherwise be stopped by it.
fn set_foreground(pgrp: Pid) -> nix::Result<()> {
    let mut ttou = SigSet::empty();
    ttou.add(Signal::SIGTTOU);
    let mut previous = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&ttou), Some(&mut previous))?;

    let result = tcsetpgrp(io::stdin(), pgrp);
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)?;
    result
}

/// Close every descriptor but `keep`.
///
/// Another group's kill switch (or the lock file) must never stay open in a
/// keeper, or that group would outlive its owner.
fn close_inherited_fds(keep: RawFd) {
    // SAFETY: sysconf has no preconditions.
    let open_max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let limit = (if open_max <= 0 { 1024 } else { open_max.min(65_536) }) as RawFd;
    for fd in (0..limit).filter(|&fd| fd != keep) {
        // SAFETY: nothing in the keeper uses these descriptors.
        unsafe { libc::close(fd) };
    }
}

/// Spawn the child directly into `group`.
///
/// `setpgid` runs between fork and exec, so the child is contained before
/// its first instruction and there is nothing to suspend.
pub(super) fn spawn_suspended(spec: &CommandSpec, group: &ContainmentGroup) -> Result<Child> {
    Command::new(spec.program())
        .args(spec.args())
        .process_group(group.id())
        .spawn()
        .map_err(|e| WithLockError::from_io("spawn", &e))
}

/// Nothing to do: Unix children start running as soon as they are spawned.
pub(super) fn resume(_child: &Child) -> Result<()> {
    Ok(())
}

/// The child's exit code, or `128 + signo` if a signal killed it.
pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| exit_codes::SIGNAL_BASE + sig))
        .unwrap_or(exit_codes::GENERIC_FAILURE)
}
