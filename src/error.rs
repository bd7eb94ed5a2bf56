//! Error types for snippet_jail.
//!
//! This module defines three error categories:
//! - [`Violation`]: Input errors and policy violations detected before any process
//!   exists - the snippet is rejected
//! - [`ExecError`]: Failures after the validation gate - folded into the result,
//!   never raised to `execute()` callers
//! - [`ConfigError`]: Invalid configuration detected when building a policy

use std::time::Duration;
use thiserror::Error;

/// Reason a snippet was rejected before execution.
///
/// All messages are user-facing and name the offending construct.
/// None of them echo the submitted source beyond that name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    // Input errors
    /// Nothing runnable after extraction and trimming
    #[error("no code provided")]
    NoCode,

    /// Source exceeds the configured character limit
    #[error("code too long: {len} characters (max {max})")]
    CodeTooLong { len: usize, max: usize },

    /// Source does not parse
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Brackets, operators or blocks nested past the walk's depth bound
    #[error("code is nested too deeply (max depth {max})")]
    TooDeeplyNested { max: usize },

    // Import policy
    /// Module is not in the import allowlist
    #[error("import of module '{module}' is not allowed")]
    ImportNotAllowed { module: String },

    /// `from X import *`
    #[error("wildcard import from '{module}' is not allowed")]
    WildcardImport { module: String },

    /// `from . import x`
    #[error("relative imports are not allowed")]
    RelativeImport,

    // Attribute and call policy
    /// Access to a `__name__`-style attribute
    #[error("access to attribute '{attr}' is not allowed")]
    DunderAttribute { attr: String },

    /// Call to a denylisted function or method
    #[error("call to '{name}' is not allowed")]
    BlockedCall { name: String },
}

/// Failure after the validation gate.
///
/// The snippet was accepted but running it did not produce a normal exit.
/// The `Display` text becomes `ExecutionResult::error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// Wall-clock timeout expired; the process was killed
    #[error("execution timed out after {}s", .limit.as_secs_f64())]
    Timeout { limit: Duration, elapsed: Duration },

    /// Interpreter path is relative
    #[error("interpreter path must be absolute: {path}")]
    InterpreterNotAbsolute { path: String },

    /// Interpreter does not exist
    #[error("interpreter not found: {path}")]
    InterpreterNotFound { path: String },

    /// Interpreter exists but cannot be used
    #[error("interpreter unusable: {path} ({reason})")]
    InterpreterInvalid { path: String, reason: String },

    /// Per-run working directory could not be prepared
    #[error("failed to prepare working directory: {reason}")]
    Workspace { reason: String },

    /// The OS refused to start the process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed { reason: String },

    /// Waiting on the process or reading its output failed
    #[error("failed to collect process status: {reason}")]
    Wait { reason: String },
}

/// Invalid configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting could not be parsed or is out of range
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Fixed working directory is missing or not a directory
    #[error("working directory is not a directory: {path}")]
    CwdNotDirectory { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_messages_name_the_construct() {
        let v = Violation::ImportNotAllowed {
            module: "os".to_string(),
        };
        assert_eq!(v.to_string(), "import of module 'os' is not allowed");

        let v = Violation::BlockedCall {
            name: "eval".to_string(),
        };
        assert_eq!(v.to_string(), "call to 'eval' is not allowed");

        let v = Violation::TooDeeplyNested { max: 100 };
        assert_eq!(v.to_string(), "code is nested too deeply (max depth 100)");
    }

    #[test]
    fn test_timeout_message() {
        let e = ExecError::Timeout {
            limit: Duration::from_secs(2),
            elapsed: Duration::from_millis(2003),
        };
        assert_eq!(e.to_string(), "execution timed out after 2s");
    }
}
