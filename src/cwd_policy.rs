//! Working directory policy.
//!
//! Controls where the interpreter process starts.

use crate::error::{ConfigError, ExecError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Policy for the working directory of the interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CwdPolicy {
    /// Fresh empty directory per run, removed afterwards (default).
    ///
    /// Whatever one run leaves behind is invisible to the next.
    #[default]
    TempDir,

    /// Fixed directory shared by every run.
    Fixed(PathBuf),
}

impl CwdPolicy {
    /// Create a fixed cwd policy.
    pub fn fixed(path: impl Into<PathBuf>) -> Self {
        CwdPolicy::Fixed(path.into())
    }

    /// Check the policy at build time.
    pub(crate) fn check(&self) -> Result<(), ConfigError> {
        match self {
            CwdPolicy::TempDir => Ok(()),
            CwdPolicy::Fixed(path) => {
                if path.is_dir() {
                    Ok(())
                } else {
                    Err(ConfigError::CwdNotDirectory {
                        path: path.display().to_string(),
                    })
                }
            }
        }
    }

    /// Produce the directory for one run.
    pub(crate) fn enter(&self) -> Result<RunDir, ExecError> {
        match self {
            CwdPolicy::TempDir => tempfile::Builder::new()
                .prefix("snippet-")
                .tempdir()
                .map(RunDir::Temp)
                .map_err(|e| ExecError::Workspace {
                    reason: e.to_string(),
                }),
            CwdPolicy::Fixed(path) => Ok(RunDir::Fixed(path.clone())),
        }
    }
}

/// Working directory held for the duration of one run.
///
/// A temporary directory is deleted when this value is dropped.
#[derive(Debug)]
pub(crate) enum RunDir {
    Temp(TempDir),
    Fixed(PathBuf),
}

impl RunDir {
    pub(crate) fn path(&self) -> &Path {
        match self {
            RunDir::Temp(dir) => dir.path(),
            RunDir::Fixed(path) => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_is_fresh_and_removed() {
        let policy = CwdPolicy::TempDir;

        let first = policy.enter().unwrap();
        let second = policy.enter().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());

        let path = first.path().to_path_buf();
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn test_fixed_dir_checked() {
        let tmp = TempDir::new().unwrap();
        assert!(CwdPolicy::fixed(tmp.path()).check().is_ok());

        let missing = tmp.path().join("missing");
        assert!(matches!(
            CwdPolicy::fixed(&missing).check(),
            Err(ConfigError::CwdNotDirectory { .. })
        ));
    }

    #[test]
    fn test_fixed_dir_survives_run() {
        let tmp = TempDir::new().unwrap();
        let run = CwdPolicy::fixed(tmp.path()).enter().unwrap();
        assert_eq!(run.path(), tmp.path());
        drop(run);
        assert!(tmp.path().is_dir());
    }
}
