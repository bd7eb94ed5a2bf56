//! Interpreter resolution and startup flags.

use crate::error::ExecError;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Default interpreter path.
pub const DEFAULT_INTERPRETER: &str = "/usr/bin/python3";

/// Startup flags passed before `-c`.
///
/// - `-I`: isolated mode (ignore `PYTHON*` variables, no user site, no script dir on `sys.path`)
/// - `-S`: don't import `site`
/// - `-B`: don't write bytecode
/// - `-u`: unbuffered streams, so output written before a kill is still captured
pub const STARTUP_FLAGS: &[&str] = &["-I", "-S", "-B", "-u"];

/// Resolve the interpreter to a canonical path to a regular executable file.
///
/// # Errors
///
/// - `InterpreterNotAbsolute` if the path is relative
/// - `InterpreterNotFound` if nothing exists at the path
/// - `InterpreterInvalid` if it isn't a regular, executable file
pub fn resolve_interpreter(path: &Path) -> Result<PathBuf, ExecError> {
    let path_str = path.display().to_string();

    // Relative paths would be resolved against PATH or the cwd.
    if !path.is_absolute() {
        return Err(ExecError::InterpreterNotAbsolute { path: path_str });
    }

    let canonical = std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExecError::InterpreterNotFound {
            path: path_str.clone(),
        },
        _ => ExecError::InterpreterInvalid {
            path: path_str.clone(),
            reason: e.to_string(),
        },
    })?;

    let metadata = std::fs::metadata(&canonical).map_err(|e| ExecError::InterpreterInvalid {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;

    if !metadata.is_file() {
        return Err(ExecError::InterpreterInvalid {
            path: path_str,
            reason: "not a regular file".to_string(),
        });
    }

    if !is_executable(&metadata) {
        return Err(ExecError::InterpreterInvalid {
            path: path_str,
            reason: "not executable".to_string(),
        });
    }

    Ok(canonical)
}

/// Check if a file is executable by the current user.
fn is_executable(metadata: &Metadata) -> bool {
    let mode = metadata.permissions().mode();

    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    if uid == 0 && (mode & 0o111) != 0 {
        return true;
    }

    if uid == metadata.uid() && (mode & 0o100) != 0 {
        return true;
    }

    if gid == metadata.gid() && (mode & 0o010) != 0 {
        return true;
    }

    (mode & 0o001) != 0
}
