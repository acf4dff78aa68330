//! POSIX record locks (`fcntl(F_SETLK)`) over the first byte of the file.
//!
//! Record locks belong to the process: they are not inherited across `fork`
//! and they vanish when the process exits, however it exits.

use super::types::LockAttempt;
use crate::error::{Result, WithLockError};
use nix::libc;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

pub(super) const LOCK_HELD: i32 = libc::EAGAIN;

/// Open or create the lock file. Write access is required for `F_WRLCK`.
pub(super) fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o644)
        .open(path)
}

pub(super) fn try_lock(file: &File) -> Result<LockAttempt> {
    match set_lock(file, libc::F_WRLCK as libc::c_short) {
        Ok(()) => Ok(LockAttempt::Acquired),
        // POSIX allows either code for a conflicting lock.
        Err(e) if matches!(e.raw_os_error(), Some(libc::EAGAIN | libc::EACCES)) => {
            Ok(LockAttempt::Contended)
        }
        Err(e) => Err(WithLockError::from_io("lock", &e)),
    }
}

pub(super) fn unlock(file: &File) -> Result<()> {
    set_lock(file, libc::F_UNLCK as libc::c_short).map_err(|e| WithLockError::from_io("unlock", &e))
}

/// Close the descriptor, reporting the error `File`'s own drop would ignore.
pub(super) fn close(file: File) -> Result<()> {
    let fd = file.into_raw_fd();
    // SAFETY: `fd` came from `into_raw_fd`, so nothing else will close it.
    if unsafe { libc::close(fd) } == -1 {
        return Err(WithLockError::last_os_error("close"));
    }
    Ok(())
}

fn set_lock(file: &File, lock_type: libc::c_short) -> io::Result<()> {
    // SAFETY: `flock` is a plain C struct for which all-zero is valid.
    let mut record: libc::flock = unsafe { std::mem::zeroed() };
    record.l_type = lock_type;
    record.l_whence = libc::SEEK_SET as libc::c_short;
    record.l_start = 0;
    record.l_len = 1;

    // SAFETY: the descriptor is open for the lifetime of `file` and `record`
    // outlives the call.
    let rc = unsafe {
        libc::fcntl(
            file.as_raw_fd(),
            libc::F_SETLK,
            &record as *const libc::flock,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
