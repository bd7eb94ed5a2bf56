//! The execution entry point used by computation-node handlers.

use crate::config::SandboxConfig;
use crate::error::{ConfigError, ExecError};
use crate::extract::extract_code;
use crate::output::Output;
use crate::policy::SnippetPolicy;
use crate::prepared::block_on;
use crate::request::ExecutionRequest;
use crate::result::{normalize, ExecutionResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Validates and runs snippets under a policy.
///
/// Clones share the concurrency cap and the spawn counter. Every run
/// gets its own interpreter process; nothing else is shared between runs.
#[derive(Debug, Clone)]
pub struct Sandbox {
    policy: Arc<SnippetPolicy>,
    permits: Arc<Semaphore>,
    spawned: Arc<AtomicU64>,
}

impl Sandbox {
    /// Create a sandbox running at most `max_concurrent` snippets at once.
    pub fn new(policy: SnippetPolicy, max_concurrent: usize) -> Self {
        Self {
            policy: Arc::new(policy),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            spawned: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a sandbox from configuration.
    pub fn from_config(config: &SandboxConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.policy()?, config.max_concurrent))
    }

    /// Create a sandbox from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(&SandboxConfig::from_env()?)
    }

    /// Evaluate a computation node.
    ///
    /// Always returns a result: rejections, runtime errors, timeouts and
    /// infrastructure failures are all reported in its fields.
    pub async fn execute(&self, content: &str, timeout_seconds: Option<f64>) -> ExecutionResult {
        let code = extract_code(content);

        let prepared = match self.policy.prepare_code(code.clone(), timeout_seconds) {
            Ok(prepared) => prepared,
            Err(violation) => return ExecutionResult::rejected(code, &violation),
        };

        let max_output = self.policy.limits().max_output_chars;

        // Waiting for a slot doesn't count against the snippet's timeout.
        let output = match self.permits.acquire().await {
            Ok(_permit) => {
                let output = prepared.run().await;
                if output.pid.is_some() {
                    self.spawned.fetch_add(1, Ordering::Relaxed);
                }
                output
            }
            Err(_) => Output::failed(
                ExecError::SpawnFailed {
                    reason: "sandbox is shut down".to_string(),
                },
                Duration::ZERO,
            ),
        };

        let result = normalize(output, code, max_output);
        tracing::debug!(
            success = result.success,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "Snippet finished"
        );
        result
    }

    /// Evaluate a request.
    pub async fn execute_request(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute(&request.content, request.timeout_seconds).await
    }

    /// Evaluate a computation node synchronously.
    ///
    /// This is a convenience wrapper that creates a runtime if needed.
    pub fn execute_sync(&self, content: &str, timeout_seconds: Option<f64>) -> ExecutionResult {
        match block_on(self.execute(content, timeout_seconds)) {
            Ok(result) => result,
            Err(e) => normalize(
                Output::failed(e, Duration::ZERO),
                extract_code(content),
                self.policy.limits().max_output_chars,
            ),
        }
    }

    /// Number of interpreter processes this sandbox (and its clones) started.
    pub fn processes_spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Get the policy.
    pub fn policy(&self) -> &SnippetPolicy {
        &self.policy
    }
}
