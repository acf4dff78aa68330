//! RAII lock token.

use super::platform;
use crate::error::Result;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// An open lock file whose byte-range lock is held by this process.
///
/// When dropped without [`LockToken::release`], the lock is unlocked and the
/// handle closed. Failures there are logged, never propagated.
#[derive(Debug)]
pub struct LockToken {
    path: PathBuf,

    /// `None` once the handle has been closed.
    file: Option<File>,

    held: bool,
}

impl LockToken {
    pub(super) fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            file: Some(file),
            held: true,
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock the byte range, then close the handle.
    ///
    /// The handle is closed even if unlocking fails; the unlock error wins.
    pub fn release(mut self) -> Result<()> {
        let (unlocked, closed) = self.unlock_and_close();
        unlocked?;
        closed?;
        info!(path = %self.path.display(), "released lock");
        Ok(())
    }

    fn unlock_and_close(&mut self) -> (Result<()>, Result<()>) {
        let Some(file) = self.file.take() else {
            return (Ok(()), Ok(()));
        };

        let unlocked = if std::mem::replace(&mut self.held, false) {
            platform::unlock(&file)
        } else {
            Ok(())
        };
        (unlocked, platform::close(file))
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        let (unlocked, closed) = self.unlock_and_close();
        if let Err(e) = unlocked {
            warn!(path = %self.path.display(), error = %e, "failed to unlock lock file");
        }
        if let Err(e) = closed {
            warn!(path = %self.path.display(), error = %e, "failed to close lock file");
        }
    }
}
