//! Snippet execution policy.
//!
//! `SnippetPolicy` decides what a snippet may contain and how it runs,
//! and is the only way to turn a request into something runnable.

use crate::cwd_policy::CwdPolicy;
use crate::env_policy::EnvPolicy;
use crate::error::{ConfigError, Violation};
use crate::extract::extract_code;
use crate::interpreter::DEFAULT_INTERPRETER;
use crate::limits::{ResourceLimits, MIN_TIMEOUT};
use crate::preamble::wrap;
use crate::prepared::PreparedSnippet;
use crate::request::ExecutionRequest;
use crate::validator::{Validator, Verdict, DEFAULT_ALLOWED_MODULES, DEFAULT_BLOCKED_CALLS};
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum source length in characters.
pub const DEFAULT_MAX_CODE_LENGTH: usize = 10_000;

/// Snippet execution policy.
///
/// Create using `SnippetPolicy::builder()`.
#[derive(Debug, Clone)]
pub struct SnippetPolicy {
    /// Static checks.
    validator: Validator,

    /// Interpreter path (resolved on every run).
    interpreter: PathBuf,

    /// Environment variable policy.
    env_policy: EnvPolicy,

    /// Working directory policy.
    cwd_policy: CwdPolicy,

    /// Resource limits.
    limits: ResourceLimits,
}

impl SnippetPolicy {
    /// Create a new policy builder.
    pub fn builder() -> SnippetPolicyBuilder {
        SnippetPolicyBuilder::new()
    }

    /// Validate extracted code without preparing it.
    pub fn validate(&self, code: &str) -> Result<(), Violation> {
        self.validator.validate(code)
    }

    /// Validate extracted code and report the verdict.
    pub fn verdict(&self, code: &str) -> Verdict {
        Verdict::from(self.validate(code))
    }

    /// Extract, validate and prepare a request for execution.
    ///
    /// This is the ONLY way to create a `PreparedSnippet`.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` if the snippet is rejected. No process is
    /// spawned in that case.
    pub fn prepare(&self, request: &ExecutionRequest) -> Result<PreparedSnippet, Violation> {
        self.prepare_code(extract_code(&request.content), request.timeout_seconds)
    }

    /// Validate and prepare already-extracted code.
    pub fn prepare_code(
        &self,
        code: String,
        timeout_seconds: Option<f64>,
    ) -> Result<PreparedSnippet, Violation> {
        if let Err(violation) = self.validate(&code) {
            tracing::info!(reason = %violation, "Snippet rejected");
            return Err(violation);
        }

        let timeout = self.limits.clamp_timeout(timeout_seconds);
        tracing::debug!(
            chars = code.chars().count(),
            timeout_ms = timeout.as_millis() as u64,
            "Snippet accepted"
        );

        Ok(PreparedSnippet {
            wrapped: wrap(&code, &self.limits, timeout),
            code,
            interpreter: self.interpreter.clone(),
            env: self.env_policy.apply(),
            cwd_policy: self.cwd_policy.clone(),
            timeout,
            limits: self.limits,
        })
    }

    /// Get the validator.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Get the resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Get the interpreter path.
    pub fn interpreter(&self) -> &PathBuf {
        &self.interpreter
    }
}

impl Default for SnippetPolicy {
    /// The builder's defaults, which always pass `build()`'s checks.
    fn default() -> Self {
        let builder = SnippetPolicyBuilder::new();
        SnippetPolicy {
            validator: Validator::new(
                builder.allowed_modules,
                builder.blocked_calls,
                builder.max_code_length,
            ),
            interpreter: builder.interpreter,
            env_policy: builder.env_policy,
            cwd_policy: builder.cwd_policy,
            limits: builder.limits,
        }
    }
}

/// Builder for `SnippetPolicy`.
#[derive(Debug, Clone)]
pub struct SnippetPolicyBuilder {
    /// Importable top-level modules.
    allowed_modules: Vec<String>,

    /// Denylisted call names.
    blocked_calls: Vec<String>,

    /// Maximum source length in characters.
    max_code_length: usize,

    /// Interpreter path.
    interpreter: PathBuf,

    /// Environment policy.
    env_policy: EnvPolicy,

    /// CWD policy.
    cwd_policy: CwdPolicy,

    /// Resource limits.
    limits: ResourceLimits,
}

impl SnippetPolicyBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            allowed_modules: DEFAULT_ALLOWED_MODULES.iter().map(|s| s.to_string()).collect(),
            blocked_calls: DEFAULT_BLOCKED_CALLS.iter().map(|s| s.to_string()).collect(),
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            env_policy: EnvPolicy::default(),
            cwd_policy: CwdPolicy::default(),
            limits: ResourceLimits::default(),
        }
    }

    /// Allow an additional top-level module.
    pub fn allow_module(mut self, module: impl Into<String>) -> Self {
        self.allowed_modules.push(module.into());
        self
    }

    /// Replace the module allowlist.
    pub fn allowed_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Deny an additional call name.
    pub fn block_call(mut self, name: impl Into<String>) -> Self {
        self.blocked_calls.push(name.into());
        self
    }

    /// Replace the call denylist.
    pub fn blocked_calls<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_calls = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the maximum source length in characters.
    pub fn max_code_length(mut self, max: usize) -> Self {
        self.max_code_length = max;
        self
    }

    /// Set the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.limits.default_timeout = timeout;
        self
    }

    /// Set the ceiling for caller-supplied timeouts.
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.limits.max_timeout = timeout;
        self
    }

    /// Set maximum characters kept per output stream.
    pub fn max_output_length(mut self, max: usize) -> Self {
        self.limits.max_output_chars = max;
        self
    }

    /// Set the virtual memory ceiling in bytes.
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.limits.memory_bytes = bytes;
        self
    }

    /// Set resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the interpreter path.
    ///
    /// The path is checked on every run, so a missing interpreter shows up
    /// as a failed result rather than a build error.
    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = path.into();
        self
    }

    /// Set the environment policy.
    pub fn env_policy(mut self, policy: EnvPolicy) -> Self {
        self.env_policy = policy;
        self
    }

    /// Set the working directory policy.
    pub fn cwd_policy(mut self, policy: CwdPolicy) -> Self {
        self.cwd_policy = policy;
        self
    }

    /// Build the policy.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A length limit is zero
    /// - The timeout ceiling is below one second
    /// - A fixed working directory doesn't exist
    pub fn build(self) -> Result<SnippetPolicy, ConfigError> {
        if self.max_code_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_code_length",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        if self.limits.max_output_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_output_length",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        if self.limits.max_timeout < MIN_TIMEOUT {
            return Err(ConfigError::InvalidValue {
                key: "max_timeout",
                value: format!("{:?}", self.limits.max_timeout),
                reason: "must be at least one second",
            });
        }
        self.cwd_policy.check()?;

        Ok(SnippetPolicy {
            validator: Validator::new(
                self.allowed_modules,
                self.blocked_calls,
                self.max_code_length,
            ),
            interpreter: self.interpreter,
            env_policy: self.env_policy,
            cwd_policy: self.cwd_policy,
            limits: self.limits,
        })
    }
}

impl Default for SnippetPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_builds() {
        let policy = SnippetPolicy::builder().build().unwrap();
        assert_eq!(policy.validator().max_code_length(), DEFAULT_MAX_CODE_LENGTH);
        assert_eq!(policy.interpreter(), &PathBuf::from(DEFAULT_INTERPRETER));
    }

    #[test]
    fn test_builder_rejects_zero_limits() {
        let result = SnippetPolicy::builder().max_code_length(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = SnippetPolicy::builder().max_output_length(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_builder_rejects_tiny_ceiling() {
        let result = SnippetPolicy::builder()
            .max_timeout(Duration::from_millis(200))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "max_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_builder_checks_fixed_cwd() {
        let result = SnippetPolicy::builder()
            .cwd_policy(CwdPolicy::fixed("/nonexistent/snippet/dir"))
            .build();
        assert!(matches!(result, Err(ConfigError::CwdNotDirectory { .. })));
    }

    #[test]
    fn test_prepare_extracts_and_clamps() {
        let policy = SnippetPolicy::builder().build().unwrap();
        let request = ExecutionRequest::new("Sum:\n```python\nprint(sum(range(5)))\n```")
            .with_timeout_seconds(999.0);

        let prepared = policy.prepare(&request).unwrap();

        assert_eq!(prepared.code(), "print(sum(range(5)))");
        assert_eq!(prepared.timeout(), Duration::from_secs(30));
        assert!(prepared.wrapped_source().ends_with("print(sum(range(5)))\n"));
        assert_eq!(prepared.env().get("PYTHONIOENCODING"), Some(&"utf-8".to_string()));
    }

    #[test]
    fn test_prepare_rejects() {
        let policy = SnippetPolicy::builder().build().unwrap();

        let result = policy.prepare(&ExecutionRequest::new("import socket"));
        assert!(matches!(result, Err(Violation::ImportNotAllowed { .. })));

        let result = policy.prepare(&ExecutionRequest::new("```python\n```"));
        assert!(matches!(result, Err(Violation::NoCode)));
    }

    #[test]
    fn test_allow_module_extends_allowlist() {
        let policy = SnippetPolicy::builder().allow_module("string").build().unwrap();
        assert_eq!(policy.verdict("import string"), Verdict::Accepted);
        assert_eq!(policy.verdict("import math"), Verdict::Accepted);
    }

    #[test]
    fn test_replacing_lists() {
        let policy = SnippetPolicy::builder()
            .allowed_modules(["json"])
            .blocked_calls(["print"])
            .build()
            .unwrap();

        assert!(!policy.verdict("import math").is_accepted());
        assert!(policy.verdict("import json").is_accepted());
        assert!(!policy.verdict("print(1)").is_accepted());
        assert!(policy.verdict("eval('1')").is_accepted());
    }
}
