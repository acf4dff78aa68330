//! `LockFileEx` over the first byte of the file.

use super::types::LockAttempt;
use crate::error::{Result, WithLockError};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::{AsRawHandle, IntoRawHandle};
use std::path::Path;
use windows::Win32::Foundation::{CloseHandle, GENERIC_READ, HANDLE};
use windows::Win32::Storage::FileSystem::{
    FILE_ATTRIBUTE_READONLY, FILE_SHARE_READ, FILE_SHARE_WRITE, LOCKFILE_EXCLUSIVE_LOCK,
    LOCKFILE_FAIL_IMMEDIATELY, LockFileEx, UnlockFileEx,
};
use windows::Win32::System::IO::OVERLAPPED;

/// `ERROR_LOCK_VIOLATION`
pub(super) const LOCK_HELD: i32 = 33;

/// Open or create the lock file, letting other instances open it too.
///
/// `LockFileEx` only needs read access, so a read-only lock file opens
/// fine. A new file is created read-only.
pub(super) fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        // std refuses `create` without write; `access_mode` overrides both.
        .write(true)
        .create(true)
        .truncate(false)
        .access_mode(GENERIC_READ.0)
        .attributes(FILE_ATTRIBUTE_READONLY.0)
        .share_mode((FILE_SHARE_READ | FILE_SHARE_WRITE).0)
        .open(path)
}

pub(super) fn try_lock(file: &File) -> Result<LockAttempt> {
    let mut overlapped = OVERLAPPED::default();
    // SAFETY: the handle is open for the lifetime of `file`; `overlapped`
    // outlives the synchronous call.
    let locked = unsafe {
        LockFileEx(
            HANDLE(file.as_raw_handle()),
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            None,
            1,
            0,
            &mut overlapped,
        )
    };
    match locked {
        Ok(()) => Ok(LockAttempt::Acquired),
        Err(e) => match WithLockError::from_win32("lock", &e) {
            WithLockError::Os { code: LOCK_HELD, .. } => Ok(LockAttempt::Contended),
            other => Err(other),
        },
    }
}

pub(super) fn unlock(file: &File) -> Result<()> {
    let mut overlapped = OVERLAPPED::default();
    // SAFETY: as in `try_lock`.
    unsafe { UnlockFileEx(HANDLE(file.as_raw_handle()), None, 1, 0, &mut overlapped) }
        .map_err(|e| WithLockError::from_win32("unlock", &e))
}

pub(super) fn close(file: File) -> Result<()> {
    // SAFETY: the handle came from `into_raw_handle`, so nothing else closes it.
    unsafe { CloseHandle(HANDLE(file.into_raw_handle())) }
        .map_err(|e| WithLockError::from_win32("close", &e))
}
