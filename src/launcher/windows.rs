//! Containment on Windows: a Job Object that kills its members on close.

use super::command::{CommandSpec, quote_argument};
use crate::error::{Result, WithLockError};
use crate::exit_codes;
use std::os::windows::io::AsRawHandle;
use std::os::windows::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use tracing::{debug, warn};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
    JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JobObjectExtendedLimitInformation,
    SetInformationJobObject,
};
use windows::Win32::System::Threading::{
    CREATE_SUSPENDED, OpenThread, ResumeThread, THREAD_SUSPEND_RESUME,
};
use windows::core::PCWSTR;

/// `ERROR_ACCESS_DENIED`
const ACCESS_DENIED: i32 = 5;

/// A Job Object configured with `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE`.
///
/// Closing the handle (on drop, or by the OS when withlockfile dies)
/// terminates every process in the job.
#[derive(Debug)]
pub struct ContainmentGroup {
    job: OwnedHandle,
}

impl ContainmentGroup {
    pub fn create() -> Result<Self> {
        // SAFETY: no security attributes and no name.
        let job = unsafe { CreateJobObjectW(None, PCWSTR::null()) }
            .map_err(|e| WithLockError::from_win32("create containment group", &e))?;
        let group = Self {
            job: OwnedHandle(job),
        };

        let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
        info.BasicLimitInformation.LimitFlags |= JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
        // SAFETY: `info` is the structure matching the information class and
        // outlives the call.
        unsafe {
            SetInformationJobObject(
                group.job.0,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const std::ffi::c_void,
                std::mem::size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        }
        .map_err(|e| WithLockError::from_win32("configure containment group", &e))?;

        debug!("created containment group");
        Ok(group)
    }

    /// Assign the suspended child to the job.
    ///
    /// Access denied is tolerated: older Windows versions refuse nested jobs
    /// when withlockfile itself already runs inside one.
    pub fn attach(&self, child: &Child) -> Result<()> {
        // SAFETY: both handles are open for the duration of the call.
        let assigned =
            unsafe { AssignProcessToJobObject(self.job.0, HANDLE(child.as_raw_handle())) };
        match assigned {
            Ok(()) => Ok(()),
            Err(e) => match WithLockError::from_win32("attach to containment group", &e) {
                WithLockError::Os {
                    code: ACCESS_DENIED,
                    ..
                } => {
                    warn!(pid = child.id(), "access denied assigning child to job, continuing");
                    Ok(())
                }
                other => Err(other),
            },
        }
    }
}

/// Create the child with its initial thread suspended.
///
/// Arguments are quoted with [`quote_argument`] and passed verbatim, so the
/// child sees exactly [`CommandSpec::command_line`].
pub(super) fn spawn_suspended(spec: &CommandSpec, _group: &ContainmentGroup) -> Result<Child> {
    let mut command = Command::new(spec.program());
    for arg in spec.args() {
        command.raw_arg(quote_argument(arg));
    }
    command
        .creation_flags(CREATE_SUSPENDED.0)
        .spawn()
        .map_err(|e| WithLockError::from_io("spawn", &e))
}

/// Resume the child's initial thread.
///
/// std does not expose the thread handle from process creation, so the
/// thread is found through a ToolHelp snapshot of the child's threads.
pub(super) fn resume(child: &Child) -> Result<()> {
    let pid = child.id();
    // SAFETY: plain snapshot request.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) }
        .map(OwnedHandle)
        .map_err(|e| WithLockError::from_win32("resume", &e))?;

    let mut entry = THREADENTRY32 {
        dwSize: std::mem::size_of::<THREADENTRY32>() as u32,
        ..Default::default()
    };
    let mut resumed = 0;

    // SAFETY: `entry.dwSize` is initialised as the API requires.
    let mut more = unsafe { Thread32First(snapshot.0, &mut entry) }.is_ok();
    while more {
        if entry.th32OwnerProcessID == pid {
            // SAFETY: plain handle request for a thread id from the snapshot.
            let thread = unsafe { OpenThread(THREAD_SUSPEND_RESUME, false, entry.th32ThreadID) }
                .map(OwnedHandle)
                .map_err(|e| WithLockError::from_win32("resume", &e))?;
            // SAFETY: the handle was opened with THREAD_SUSPEND_RESUME.
            if unsafe { ResumeThread(thread.0) } == u32::MAX {
                return Err(WithLockError::last_os_error("resume"));
            }
            resumed += 1;
        }
        // SAFETY: as for `Thread32First`.
        more = unsafe { Thread32Next(snapshot.0, &mut entry) }.is_ok();
    }

    if resumed == 0 {
        return Err(WithLockError::Generic(format!(
            "resume failed: no thread found for process {}",
            pid
        )));
    }
    Ok(())
}

pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(exit_codes::GENERIC_FAILURE)
}

/// A Win32 handle closed on drop.
#[derive(Debug)]
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by this value and closed exactly once.
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            warn!(error = %e, "failed to close handle");
        }
    }
}
