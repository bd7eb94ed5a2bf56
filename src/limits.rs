//! Resource limits for snippet execution.

use std::time::Duration;

/// Shortest timeout a caller can request.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Resource limits applied to every run.
///
/// The wall-clock timeout is enforced from the outside by killing the
/// process. CPU time and virtual memory are set inside the child by the
/// preamble, best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Timeout used when the request doesn't specify one.
    ///
    /// Default: 10 seconds.
    pub default_timeout: Duration,

    /// Ceiling for caller-supplied timeouts.
    ///
    /// Default: 30 seconds.
    pub max_timeout: Duration,

    /// Maximum characters kept per output stream.
    ///
    /// Longer streams are cut and marked, the run is not killed.
    /// Default: 10,000.
    pub max_output_chars: usize,

    /// Virtual memory ceiling (RLIMIT_AS) in bytes.
    ///
    /// Default: 512 MiB.
    pub memory_bytes: u64,

    /// Extra CPU seconds allowed above the wall-clock timeout.
    ///
    /// Default: 1 second.
    pub cpu_grace: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(30),
            max_output_chars: 10_000,
            memory_bytes: 512 * 1024 * 1024, // 512 MiB
            cpu_grace: Duration::from_secs(1),
        }
    }
}

impl ResourceLimits {
    /// Set the default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the timeout ceiling.
    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Set maximum characters per stream.
    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// Set the virtual memory ceiling in bytes.
    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Resolve a caller-supplied timeout.
    ///
    /// Absent or non-finite values fall back to the default; everything
    /// else is clamped into `[MIN_TIMEOUT, max_timeout]`.
    pub fn clamp_timeout(&self, requested: Option<f64>) -> Duration {
        let upper = self.max_timeout.max(MIN_TIMEOUT);
        let wanted = match requested {
            Some(secs) if secs.is_finite() => {
                // Clamp in f64 first so from_secs_f64 never sees a negative or huge value.
                let secs = secs.clamp(MIN_TIMEOUT.as_secs_f64(), upper.as_secs_f64());
                Duration::from_secs_f64(secs)
            }
            _ => self.default_timeout,
        };
        wanted.clamp(MIN_TIMEOUT, upper)
    }

    /// CPU-time ceiling in whole seconds for a given wall-clock timeout.
    pub fn cpu_seconds(&self, timeout: Duration) -> u64 {
        let total = timeout + self.cpu_grace;
        let whole = total.as_secs();
        if total.subsec_nanos() > 0 {
            whole + 1
        } else {
            whole
        }
    }

    /// Byte budget for capturing one stream.
    ///
    /// Four bytes per character covers any UTF-8 text, so character
    /// truncation afterwards is exact.
    pub(crate) fn capture_bytes(&self) -> usize {
        self.max_output_chars.saturating_mul(4).saturating_add(4)
    }
}
