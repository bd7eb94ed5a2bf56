//! Execution results and output normalization.

use crate::error::Violation;
use crate::output::{Captured, Output};
use crate::preamble::adjust_traceback;
use serde::{Deserialize, Serialize};

/// Appended to a stream that was cut at the output limit.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Final outcome of one request.
///
/// Created exactly once per request and returned as-is to the caller;
/// every field is a plain value suitable for JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `true` only for a normal exit with code 0.
    pub success: bool,

    /// Captured standard output, truncated and marked if too long.
    pub stdout: String,

    /// Captured standard error, truncated and marked if too long.
    pub stderr: String,

    /// Human-readable failure description.
    pub error: Option<String>,

    /// Process exit code; negative for a signal death.
    ///
    /// `None` for rejected requests, timeouts and spawn failures.
    pub exit_code: Option<i32>,

    /// Spawn-to-completion wall-clock time in milliseconds.
    pub duration_ms: u64,

    /// The exact snippet that was validated and run.
    pub executed_code: String,
}

impl ExecutionResult {
    /// The terminal result for a request rejected before spawning.
    pub fn rejected(code: impl Into<String>, violation: &Violation) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(violation.to_string()),
            exit_code: None,
            duration_ms: 0,
            executed_code: code.into(),
        }
    }
}

/// Assemble the result of a run.
///
/// Streams are capped at `max_output_chars` characters each. A run that
/// didn't succeed always carries an `error`: the runner's own failure if
/// there was one, else the captured stderr, else the exit status.
pub fn normalize(output: Output, executed_code: String, max_output_chars: usize) -> ExecutionResult {
    let stdout = cap_stream(&output.stdout, max_output_chars, false);
    let stderr = cap_stream(&output.stderr, max_output_chars, true);

    let success = output.success();
    let error = match output.failure {
        Some(failure) => Some(failure.to_string()),
        None if success => None,
        None => Some(derive_error(&stderr, output.exit_code)),
    };

    ExecutionResult {
        success,
        stdout,
        stderr,
        error,
        exit_code: output.exit_code,
        duration_ms: u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
        executed_code,
    }
}

/// Cut `text` to `max_chars` characters, appending the marker when anything was dropped.
pub fn truncate_output(text: &str, max_chars: usize, already_truncated: bool) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None if already_truncated => format!("{text}{TRUNCATION_MARKER}"),
        None => text.to_string(),
    }
}

fn cap_stream(captured: &Captured, max_chars: usize, is_stderr: bool) -> String {
    let text = captured.to_string_lossy();
    let text = if is_stderr {
        adjust_traceback(&text)
    } else {
        text
    };
    truncate_output(&text, max_chars, captured.truncated)
}

fn derive_error(stderr: &str, exit_code: Option<i32>) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match exit_code {
        Some(code) if code < 0 => format!("process killed by signal {}", -code),
        Some(code) => format!("process exited with code {code}"),
        None => "process ended without an exit status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecError;
    use std::time::Duration;

    fn output(stdout: &str, stderr: &str, exit_code: Option<i32>) -> Output {
        Output {
            stdout: Captured {
                bytes: stdout.as_bytes().to_vec(),
                truncated: false,
            },
            stderr: Captured {
                bytes: stderr.as_bytes().to_vec(),
                truncated: false,
            },
            exit_code,
            pid: Some(42),
            elapsed: Duration::from_millis(37),
            failure: None,
        }
    }

    #[test]
    fn test_successful_run() {
        let result = normalize(output("4\n", "", Some(0)), "print(2 + 2)".to_string(), 100);

        assert!(result.success);
        assert_eq!(result.stdout, "4\n");
        assert_eq!(result.error, None);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.duration_ms, 37);
        assert_eq!(result.executed_code, "print(2 + 2)");
    }

    #[test]
    fn test_error_from_stderr() {
        let result = normalize(
            output("", "ZeroDivisionError: division by zero\n", Some(1)),
            "1 / 0".to_string(),
            100,
        );

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
    }

    #[test]
    fn test_error_from_exit_code() {
        let result = normalize(output("", "", Some(3)), "x".to_string(), 100);
        assert_eq!(result.error.as_deref(), Some("process exited with code 3"));

        let result = normalize(output("", "", Some(-9)), "x".to_string(), 100);
        assert_eq!(result.error.as_deref(), Some("process killed by signal 9"));
    }

    #[test]
    fn test_runner_failure_takes_precedence() {
        let mut out = output("partial\n", "", None);
        out.failure = Some(ExecError::Timeout {
            limit: Duration::from_secs(1),
            elapsed: Duration::from_secs(1),
        });

        let result = normalize(out, "while True: pass".to_string(), 100);

        assert!(!result.success);
        assert_eq!(result.stdout, "partial\n");
        assert_eq!(result.error.as_deref(), Some("execution timed out after 1s"));
    }

    #[test]
    fn test_truncation_does_not_affect_success() {
        let long = "a".repeat(50);
        let result = normalize(output(&long, "", Some(0)), "x".to_string(), 10);

        assert!(result.success);
        assert_eq!(result.stdout, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_output("ééé", 2, false), format!("éé{TRUNCATION_MARKER}"));
        assert_eq!(truncate_output("éé", 2, false), "éé");
        assert_eq!(truncate_output("éé", 2, true), format!("éé{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_rejected_result() {
        let violation = Violation::ImportNotAllowed {
            module: "os".to_string(),
        };
        let result = ExecutionResult::rejected("import os", &violation);

        assert!(!result.success);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.duration_ms, 0);
        assert_eq!(
            result.error.as_deref(),
            Some("import of module 'os' is not allowed")
        );
    }

    #[test]
    fn test_json_shape() {
        let result = normalize(output("1\n", "", Some(0)), "print(1)".to_string(), 100);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["stdout"], "1\n");
        assert_eq!(json["error"], serde_json::Value::Null);
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["executed_code"], "print(1)");
    }
}
