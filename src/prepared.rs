//! Prepared snippet ready for execution.
//!
//! This module contains `PreparedSnippet`, which can only be created
//! by `SnippetPolicy::prepare()`. This ensures every run went through validation.

use crate::cwd_policy::CwdPolicy;
use crate::error::ExecError;
use crate::interpreter::{resolve_interpreter, STARTUP_FLAGS};
use crate::limits::ResourceLimits;
use crate::output::{read_bounded, read_error, Captured, Output};
use std::collections::HashMap;
use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to wait for buffered output once the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A validated snippet ready for execution.
///
/// This type cannot be constructed outside of `snippet_jail`.
/// The only way to create it is via `SnippetPolicy::prepare()`.
#[derive(Debug, Clone)]
pub struct PreparedSnippet {
    pub(crate) code: String,
    pub(crate) wrapped: String,
    pub(crate) interpreter: PathBuf,
    pub(crate) env: HashMap<String, String>,
    pub(crate) cwd_policy: CwdPolicy,
    pub(crate) timeout: Duration,
    pub(crate) limits: ResourceLimits,
}

impl PreparedSnippet {
    /// Run the snippet in a fresh interpreter process.
    ///
    /// Never fails: a missing interpreter, a spawn error or a timeout
    /// is reported in `Output::failure`. On timeout the process is
    /// killed and reaped before this returns.
    pub async fn run(self) -> Output {
        let interpreter = match resolve_interpreter(&self.interpreter) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Snippet interpreter unavailable");
                return Output::failed(e, Duration::ZERO);
            }
        };

        // Held until the end of this function; a temp dir is removed on drop.
        let run_dir = match self.cwd_policy.enter() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(error = %e, "Snippet working directory unavailable");
                return Output::failed(e, Duration::ZERO);
            }
        };

        let mut cmd = Command::new(&interpreter);
        cmd.args(STARTUP_FLAGS)
            .arg("-c")
            .arg(&self.wrapped)
            .current_dir(run_dir.path())
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    interpreter = %interpreter.display(),
                    error = %e,
                    "Failed to spawn snippet interpreter"
                );
                return Output::failed(
                    ExecError::SpawnFailed {
                        reason: e.to_string(),
                    },
                    start.elapsed(),
                );
            }
        };

        let pid = child.id();
        tracing::debug!(
            pid,
            timeout_ms = self.timeout.as_millis() as u64,
            "Spawned snippet interpreter"
        );

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill().await;
            return Output::failed(
                ExecError::Wait {
                    reason: "output pipes unavailable".to_string(),
                },
                start.elapsed(),
            );
        };

        // Both streams are drained concurrently with the wait, so a chatty
        // snippet can't stall on a full pipe.
        let capture = self.limits.capture_bytes();
        let stdout_task = tokio::spawn(read_bounded(stdout, capture));
        let stderr_task = tokio::spawn(read_bounded(stderr, capture));

        let (exit_code, mut failure) = match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => (Some(exit_code_of(status)), None),
            Ok(Err(e)) => {
                let _ = child.kill().await;
                (
                    None,
                    Some(ExecError::Wait {
                        reason: e.to_string(),
                    }),
                )
            }
            Err(_) => {
                let elapsed = start.elapsed();
                // kill() also reaps, so the process is gone once this returns.
                if let Err(e) = child.kill().await {
                    tracing::warn!(pid, error = %e, "Failed to kill timed-out snippet");
                }
                tracing::warn!(
                    pid,
                    limit_ms = self.timeout.as_millis() as u64,
                    "Snippet timed out and was killed"
                );
                (
                    None,
                    Some(ExecError::Timeout {
                        limit: self.timeout,
                        elapsed,
                    }),
                )
            }
        };

        let stdout = drain("stdout", stdout_task, &mut failure).await;
        let stderr = drain("stderr", stderr_task, &mut failure).await;
        let elapsed = start.elapsed();

        drop(run_dir);

        Output {
            stdout,
            stderr,
            exit_code,
            pid,
            elapsed,
            failure,
        }
    }

    /// Run the snippet synchronously.
    ///
    /// This is a convenience wrapper that creates a runtime if needed.
    pub fn run_sync(self) -> Output {
        match block_on(self.run()) {
            Ok(output) => output,
            Err(e) => Output::failed(e, Duration::ZERO),
        }
    }

    /// The snippet as validated (without the preamble).
    pub fn code(&self) -> &str {
        &self.code
    }

    /// The full source handed to the interpreter.
    pub fn wrapped_source(&self) -> &str {
        &self.wrapped
    }

    /// The clamped wall-clock timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the interpreter path.
    pub fn interpreter(&self) -> &PathBuf {
        &self.interpreter
    }

    /// Get the environment.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

/// Exit code, or the negated signal number for a signal death.
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

/// Collect a reader task, giving up after `DRAIN_GRACE`.
async fn drain(
    stream: &str,
    mut task: JoinHandle<std::io::Result<Captured>>,
    failure: &mut Option<ExecError>,
) -> Captured {
    match timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(e))) => {
            failure.get_or_insert(read_error(stream, e));
            Captured::default()
        }
        Ok(Err(e)) => {
            failure.get_or_insert(ExecError::Wait {
                reason: format!("{stream} reader failed: {e}"),
            });
            Captured::default()
        }
        Err(_) => {
            // A leftover grandchild may still hold the pipe open.
            task.abort();
            tracing::warn!(stream, "Gave up draining snippet output");
            Captured::default()
        }
    }
}

/// Drive a future to completion from synchronous code.
pub(crate) fn block_on<F>(fut: F) -> Result<F::Output, ExecError>
where
    F: Future + Send,
    F::Output: Send,
{
    let run = move || -> Result<F::Output, ExecError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ExecError::SpawnFailed {
                reason: format!("failed to create runtime: {}", e),
            })?;
        Ok(rt.block_on(fut))
    };

    if tokio::runtime::Handle::try_current().is_ok() {
        // A runtime can't be started on a thread that is already driving one.
        std::thread::scope(|s| s.spawn(run).join()).unwrap_or_else(|_| {
            Err(ExecError::Wait {
                reason: "runtime thread panicked".to_string(),
            })
        })
    } else {
        run()
    }
}
