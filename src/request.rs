//! Snippet execution request.

use serde::{Deserialize, Serialize};

/// A request to evaluate a computation node.
///
/// This struct represents what the caller hands over. It must be
/// validated by `SnippetPolicy::prepare()` before anything runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Raw node content, possibly containing a fenced snippet.
    pub content: String,

    /// Requested wall-clock timeout in seconds.
    ///
    /// Never trusted as-is: clamped by the policy's limits before use.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

impl ExecutionRequest {
    /// Create a request with the default timeout.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timeout_seconds: None,
        }
    }

    /// Set the requested timeout.
    pub fn with_timeout_seconds(mut self, secs: f64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }
}
