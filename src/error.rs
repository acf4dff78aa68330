//! Error types for the withlockfile CLI.
//!
//! Every OS-facing step returns `Result<T>`. The first failure is returned
//! unchanged up to `main`, which prints it once and turns it into the
//! process exit status via [`WithLockError::exit_code`].

use crate::exit_codes;
use std::io;
use thiserror::Error;

/// Main error type for withlockfile operations.
#[derive(Error, Debug)]
pub enum WithLockError {
    /// A platform call failed with a status code.
    ///
    /// The code doubles as the exit status of the wrapper.
    #[error("{operation} failed: {} (code {code})", system_message(.code))]
    Os { operation: &'static str, code: i32 },

    /// A failure that has no platform status code.
    #[error("{0}")]
    Generic(String),
}

impl WithLockError {
    /// Build an OS error from an operation label and a raw status code.
    pub fn os(operation: &'static str, code: i32) -> Self {
        WithLockError::Os { operation, code }
    }

    /// Build an OS error from the calling thread's last OS error.
    pub fn last_os_error(operation: &'static str) -> Self {
        Self::from_io(operation, &io::Error::last_os_error())
    }

    /// Convert an I/O error produced by `operation`.
    ///
    /// Errors that carry no raw OS code (e.g. synthesized by std) become
    /// [`WithLockError::Generic`], still naming the operation.
    pub fn from_io(operation: &'static str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => WithLockError::os(operation, code),
            None => WithLockError::Generic(format!("{} failed: {}", operation, err)),
        }
    }

    /// Returns the process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WithLockError::Os { code, .. } => *code,
            WithLockError::Generic(_) => exit_codes::GENERIC_FAILURE,
        }
    }
}

#[cfg(windows)]
impl WithLockError {
    /// Convert a failed Win32 call, recovering the `GetLastError` code from
    /// its `HRESULT_FROM_WIN32` form.
    pub fn from_win32(operation: &'static str, err: &windows::core::Error) -> Self {
        let hresult = err.code().0 as u32;
        let code = if hresult & 0xFFFF_0000 == 0x8007_0000 {
            hresult & 0xFFFF
        } else {
            hresult
        };
        WithLockError::os(operation, code as i32)
    }
}

/// Result type alias for withlockfile operations.
pub type Result<T> = std::result::Result<T, WithLockError>;

/// Human-readable platform description of a raw OS status code.
///
/// std renders OS errors as `<message> (os error N)`; only the message is
/// kept, minus a single trailing line break.
pub fn system_message(code: &i32) -> String {
    let rendered = io::Error::from_raw_os_error(*code).to_string();
    let suffix = format!(" (os error {})", code);
    let message = rendered.strip_suffix(&suffix).unwrap_or(&rendered);
    trim_line_break(message).to_string()
}

fn trim_line_break(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_exits_with_its_code() {
        let err = WithLockError::os("lock", 11);
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn generic_error_exits_with_fallback() {
        let err = WithLockError::Generic("no command given".to_string());
        assert_eq!(err.exit_code(), exit_codes::GENERIC_FAILURE);
        assert_eq!(err.to_string(), "no command given");
    }

    #[test]
    fn os_error_message_names_operation_and_code() {
        let code = 2;
        let err = WithLockError::os("open lock file", code);
        let msg = err.to_string();

        assert!(msg.starts_with("open lock file failed: "), "{msg}");
        assert!(msg.ends_with(&format!(" (code {})", code)), "{msg}");
        assert!(!msg.contains("os error"), "{msg}");
    }

    #[test]
    fn system_message_has_no_trailing_line_break() {
        let msg = system_message(&2);
        assert!(!msg.is_empty());
        assert!(!msg.ends_with('\n'));
        assert!(!msg.ends_with('\r'));
    }

    #[test]
    fn trim_line_break_strips_exactly_one() {
        assert_eq!(trim_line_break("Access is denied.\r\n"), "Access is denied.");
        assert_eq!(trim_line_break("denied\n"), "denied");
        assert_eq!(trim_line_break("denied\n\n"), "denied\n");
        assert_eq!(trim_line_break("denied"), "denied");
    }

    #[test]
    fn io_error_without_code_is_generic() {
        let io_err = io::Error::other("synthetic");
        let err = WithLockError::from_io("spawn", &io_err);
        assert!(matches!(err, WithLockError::Generic(_)));
        assert_eq!(err.to_string(), "spawn failed: synthetic");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn io_error_with_code_keeps_it() {
        let io_err = io::Error::from_raw_os_error(13);
        let err = WithLockError::from_io("open lock file", &io_err);
        assert!(matches!(
            err,
            WithLockError::Os {
                operation: "open lock file",
                code: 13
            }
        ));
    }
}
