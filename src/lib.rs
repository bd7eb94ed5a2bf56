//! # snippet_jail
//!
//! Sandboxed evaluation of computation nodes.
//!
//! `snippet_jail` takes an untrusted content blob, pulls the runnable snippet
//! out of it, rejects anything that fails static checks, and runs the rest in
//! a fresh, minimally-privileged interpreter process under CPU, memory and
//! wall-clock bounds. The caller always gets a structured result back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snippet_jail::{Sandbox, SnippetPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Define a policy
//! let policy = SnippetPolicy::builder()
//!     .allow_module("string")
//!     .timeout(Duration::from_secs(5))
//!     .max_output_length(4_000)
//!     .build()?;
//!
//! // At most four snippets run at once
//! let sandbox = Sandbox::new(policy, 4);
//!
//! // Evaluate a node
//! let result = sandbox
//!     .execute("```python\nimport math\nprint(math.factorial(10))\n```", Some(2.0))
//!     .await;
//!
//! println!("success={} stdout={}", result.success, result.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. **Extract**: prefer a fenced block tagged `python`, else the first fenced block, else the whole blob
//! 2. **Validate**: bound nesting depth, parse, then walk the tree against an import allowlist, a dunder-attribute ban and a call denylist
//! 3. **Run**: wrap in a resource-limiting preamble, spawn `python -I -S -B -u -c`, kill on timeout
//! 4. **Normalize**: cap each stream, derive `success` and `error`
//!
//! A rejected snippet never reaches step 3.
//!
//! ## Security Model
//!
//! The validator is a best-effort denylist, not a proof of safety. The real
//! bounds are the per-run process, the empty environment, the per-run
//! temporary directory, OS resource limits and the external timeout.
//!
//! ## Platform Support
//!
//! Unix only (Linux, macOS).

#[cfg(windows)]
compile_error!("snippet_jail relies on Unix process and resource-limit semantics.");

mod config;
mod cwd_policy;
mod env_policy;
mod error;
mod extract;
mod interpreter;
mod limits;
mod output;
mod policy;
mod preamble;
mod prepared;
mod request;
mod result;
mod sandbox;
mod validator;

use std::sync::OnceLock;

// Public API
pub use config::{vars, SandboxConfig, DEFAULT_MAX_CONCURRENT};
pub use cwd_policy::CwdPolicy;
pub use env_policy::{EnvPolicy, ALWAYS_STRIP, ENCODING_VARS};
pub use error::{ConfigError, ExecError, Violation};
pub use extract::{extract_code, LANGUAGE_ALIASES};
pub use interpreter::{resolve_interpreter, DEFAULT_INTERPRETER, STARTUP_FLAGS};
pub use limits::{ResourceLimits, MIN_TIMEOUT};
pub use output::{Captured, Output};
pub use policy::{SnippetPolicy, SnippetPolicyBuilder, DEFAULT_MAX_CODE_LENGTH};
pub use prepared::PreparedSnippet;
pub use request::ExecutionRequest;
pub use result::{normalize, truncate_output, ExecutionResult, TRUNCATION_MARKER};
pub use sandbox::Sandbox;
pub use validator::{
    is_dunder, Validator, Verdict, DEFAULT_ALLOWED_MODULES, DEFAULT_BLOCKED_CALLS,
    MAX_NESTING_DEPTH,
};

/// Process-wide sandbox configured from the environment.
///
/// Falls back to defaults if the environment is invalid.
pub fn default_sandbox() -> &'static Sandbox {
    static SANDBOX: OnceLock<Sandbox> = OnceLock::new();
    SANDBOX.get_or_init(|| {
        Sandbox::from_env().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid sandbox configuration, using defaults");
            Sandbox::new(SnippetPolicy::default(), DEFAULT_MAX_CONCURRENT)
        })
    })
}

/// Evaluate a computation node with the process-wide sandbox.
pub async fn execute(content: &str, timeout_seconds: Option<f64>) -> ExecutionResult {
    default_sandbox().execute(content, timeout_seconds).await
}
