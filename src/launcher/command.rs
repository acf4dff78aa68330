//! The command to run: program resolution and command-line quoting.

use crate::error::{Result, WithLockError};
use std::env::consts::EXE_SUFFIX;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `ENOENT` on Unix, `ERROR_FILE_NOT_FOUND` on Windows.
const FILE_NOT_FOUND: i32 = 2;

/// A fully resolved program plus its literal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Build a spec from `[program, args...]` as given on the command line,
    /// resolving the program the way a shell would.
    pub fn resolve(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| WithLockError::Generic("no command given".to_string()))?;

        Ok(Self::new(resolve_executable(program)?, args.to_vec()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The single command line handed to the OS on Windows.
    ///
    /// Every element is passed through [`quote_argument`] and the results
    /// are joined with single spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(quote_argument(&self.program.to_string_lossy()))
            .chain(self.args.iter().map(|a| quote_argument(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Append the platform's executable suffix unless `name` already ends with
/// it (compared case-insensitively). A no-op where the suffix is empty.
pub fn normalize_program(name: &str) -> String {
    if EXE_SUFFIX.is_empty() || name.to_ascii_lowercase().ends_with(EXE_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, EXE_SUFFIX)
    }
}

/// Normalize `name` and resolve it to an absolute path.
///
/// Bare names are searched on `PATH`; names containing a path separator are
/// taken relative to the current directory. Symlinks are not resolved, so a
/// multi-call binary still sees the name it was invoked by.
pub fn resolve_executable(name: &str) -> Result<PathBuf> {
    let normalized = normalize_program(name);
    let found = which::which(&normalized).map_err(|e| {
        debug!(program = %normalized, error = %e, "executable not found");
        WithLockError::os("resolve executable", FILE_NOT_FOUND)
    })?;
    let absolute =
        std::path::absolute(&found).map_err(|e| WithLockError::from_io("resolve executable", &e))?;

    debug!(program = %normalized, resolved = %absolute.display(), "resolved executable");
    Ok(absolute)
}

/// Wrap `arg` in double quotes if it contains a space or a tab.
///
/// Embedded double quotes are NOT escaped: an argument such as `a "b" c`
/// reaches a Windows child split differently than it was given. Arguments
/// without whitespace are passed through unchanged.
pub fn quote_argument(arg: &str) -> String {
    if arg.contains([' ', '\t']) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}
