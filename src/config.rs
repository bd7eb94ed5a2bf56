//! Sandbox configuration.
//!
//! Settings come from the process environment, with defaults for
//! everything that isn't set.

use crate::error::ConfigError;
use crate::interpreter::DEFAULT_INTERPRETER;
use crate::limits::ResourceLimits;
use crate::policy::{SnippetPolicy, DEFAULT_MAX_CODE_LENGTH};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable names.
pub mod vars {
    pub const MAX_CODE_LENGTH: &str = "SNIPPET_MAX_CODE_LENGTH";
    pub const MAX_OUTPUT_LENGTH: &str = "SNIPPET_MAX_OUTPUT_LENGTH";
    pub const DEFAULT_TIMEOUT: &str = "SNIPPET_DEFAULT_TIMEOUT";
    pub const MAX_TIMEOUT: &str = "SNIPPET_MAX_TIMEOUT";
    pub const MEMORY_LIMIT_MB: &str = "SNIPPET_MEMORY_LIMIT_MB";
    pub const MAX_CONCURRENT: &str = "SNIPPET_MAX_CONCURRENT";
    pub const PYTHON: &str = "SNIPPET_PYTHON";
}

/// Default number of snippets running at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Sandbox settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Maximum accepted source length in characters.
    pub max_code_length: usize,

    /// Maximum captured characters per output stream.
    pub max_output_length: usize,

    /// Timeout in seconds when the request doesn't give one.
    pub default_timeout_secs: f64,

    /// Ceiling in seconds for caller-supplied timeouts.
    pub max_timeout_secs: f64,

    /// Virtual memory ceiling in MiB.
    pub memory_limit_mb: u64,

    /// Maximum interpreter processes running at once.
    pub max_concurrent: usize,

    /// Interpreter path.
    pub python: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = ResourceLimits::default();
        Self {
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            max_output_length: limits.max_output_chars,
            default_timeout_secs: limits.default_timeout.as_secs_f64(),
            max_timeout_secs: limits.max_timeout.as_secs_f64(),
            memory_limit_mb: limits.memory_bytes / (1024 * 1024),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            python: PathBuf::from(DEFAULT_INTERPRETER),
        }
    }
}

impl SandboxConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(vars::MAX_CODE_LENGTH) {
            config.max_code_length = parse_count(vars::MAX_CODE_LENGTH, &v)?;
        }
        if let Some(v) = lookup(vars::MAX_OUTPUT_LENGTH) {
            config.max_output_length = parse_count(vars::MAX_OUTPUT_LENGTH, &v)?;
        }
        if let Some(v) = lookup(vars::DEFAULT_TIMEOUT) {
            config.default_timeout_secs = parse_secs(vars::DEFAULT_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(vars::MAX_TIMEOUT) {
            config.max_timeout_secs = parse_secs(vars::MAX_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(vars::MEMORY_LIMIT_MB) {
            config.memory_limit_mb = parse_count(vars::MEMORY_LIMIT_MB, &v)? as u64;
        }
        if let Some(v) = lookup(vars::MAX_CONCURRENT) {
            config.max_concurrent = parse_count(vars::MAX_CONCURRENT, &v)?;
        }
        if let Some(v) = lookup(vars::PYTHON) {
            let v = v.trim();
            if !v.is_empty() {
                config.python = PathBuf::from(v);
            }
        }

        Ok(config)
    }

    /// Resource limits described by this configuration.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits::default()
            .with_default_timeout(Duration::from_secs_f64(self.default_timeout_secs))
            .with_max_timeout(Duration::from_secs_f64(self.max_timeout_secs))
            .with_max_output_chars(self.max_output_length)
            .with_memory_bytes(self.memory_limit_mb.saturating_mul(1024 * 1024))
    }

    /// Build the policy described by this configuration.
    pub fn policy(&self) -> Result<SnippetPolicy, ConfigError> {
        SnippetPolicy::builder()
            .max_code_length(self.max_code_length)
            .limits(self.limits())
            .interpreter(&self.python)
            .build()
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(invalid(key, value, "must be positive")),
        Err(_) => Err(invalid(key, value, "not a whole number")),
    }
}

fn parse_secs(key: &'static str, value: &str) -> Result<f64, ConfigError> {
    match value.trim().parse::<f64>() {
        // Upper bound keeps Duration::from_secs_f64 from overflowing.
        Ok(secs) if secs.is_finite() && secs > 0.0 && secs <= 86_400.0 => Ok(secs),
        Ok(_) => Err(invalid(key, value, "must be between 0 and 86400 seconds")),
        Err(_) => Err(invalid(key, value, "not a number")),
    }
}

fn invalid(key: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason,
    }
}
