//! Output capture utilities.

use crate::error::ExecError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes captured from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// Bytes kept, up to the capture budget.
    pub bytes: Vec<u8>,

    /// Whether the stream produced more than was kept.
    pub truncated: bool,
}

impl Captured {
    /// Decode permissively (lossy UTF-8).
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Raw outcome of one run, before normalization.
#[derive(Debug, Clone, Default)]
pub struct Output {
    /// Captured standard output.
    pub stdout: Captured,

    /// Captured standard error.
    pub stderr: Captured,

    /// Exit code, or the negated signal number if the process was killed by a signal.
    ///
    /// `None` when the process never started or was killed on timeout.
    pub exit_code: Option<i32>,

    /// Process id, if the process started.
    pub pid: Option<u32>,

    /// Spawn-to-completion wall-clock time.
    pub elapsed: Duration,

    /// Why the run did not end with a normal exit.
    pub failure: Option<ExecError>,
}

impl Output {
    /// An output for a run that never reached a process.
    pub(crate) fn failed(failure: ExecError, elapsed: Duration) -> Self {
        Self {
            elapsed,
            failure: Some(failure),
            ..Self::default()
        }
    }

    /// Check if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.failure.is_none() && self.exit_code == Some(0)
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
///
/// Everything past the limit is read and discarded so the writer never
/// blocks on a full pipe.
pub(crate) async fn read_bounded<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.bytes.extend_from_slice(&buf[..room]);
            captured.truncated = true;
        } else {
            captured.bytes.extend_from_slice(&buf[..n]);
        }
    }

    Ok(captured)
}

/// Map a stream read failure.
pub(crate) fn read_error(stream: &str, e: std::io::Error) -> ExecError {
    ExecError::Wait {
        reason: format!("{stream} read error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_bounded_under_limit() {
        let data: &[u8] = b"hello";
        let captured = read_bounded(data, 16).await.unwrap();
        assert_eq!(captured.bytes, b"hello");
        assert!(!captured.truncated);
    }

    #[tokio::test]
    async fn test_read_bounded_drains_past_limit() {
        let data = vec![b'x'; 100_000];
        let captured = read_bounded(data.as_slice(), 10).await.unwrap();
        assert_eq!(captured.bytes.len(), 10);
        assert!(captured.truncated);
    }

    #[test]
    fn test_lossy_decoding() {
        let captured = Captured {
            bytes: vec![b'a', 0xff, b'b'],
            truncated: false,
        };
        assert_eq!(captured.to_string_lossy(), "a\u{fffd}b");
    }

    #[test]
    fn test_failed_output_is_not_success() {
        let output = Output::failed(
            ExecError::SpawnFailed {
                reason: "boom".to_string(),
            },
            Duration::ZERO,
        );
        assert!(!output.success());
        assert_eq!(output.exit_code, None);
    }
}
