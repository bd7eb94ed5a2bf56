//! Python bindings for snippet_jail - sandboxed evaluation of computation nodes.
//!
//! This module wraps the Rust snippet_jail crate so Python graph runtimes
//! can validate and run snippets without managing subprocesses themselves.

#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::path::PathBuf;

use snippet_jail::{
    ConfigError, ExecutionResult as RustExecutionResult, Sandbox as RustSandbox, SandboxConfig,
    SnippetPolicy, Verdict,
};

// =============================================================================
// Error Conversion
// =============================================================================

/// Convert snippet_jail ConfigError to Python ValueError
fn config_error_to_py_err(e: ConfigError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

// =============================================================================
// ExecutionResult
// =============================================================================

/// Outcome of evaluating one computation node.
#[pyclass(frozen)]
pub struct ExecutionResult {
    inner: RustExecutionResult,
}

#[pymethods]
impl ExecutionResult {
    /// True only if the snippet ran and exited with code 0.
    #[getter]
    fn success(&self) -> bool {
        self.inner.success
    }

    #[getter]
    fn stdout(&self) -> &str {
        &self.inner.stdout
    }

    #[getter]
    fn stderr(&self) -> &str {
        &self.inner.stderr
    }

    /// Failure description, or None on success.
    #[getter]
    fn error(&self) -> Option<&str> {
        self.inner.error.as_deref()
    }

    /// Exit code; None if the snippet was rejected, timed out or never started.
    #[getter]
    fn exit_code(&self) -> Option<i32> {
        self.inner.exit_code
    }

    #[getter]
    fn duration_ms(&self) -> u64 {
        self.inner.duration_ms
    }

    /// The snippet that was validated and run.
    #[getter]
    fn executed_code(&self) -> &str {
        &self.inner.executed_code
    }

    /// Convert to a plain dict.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new_bound(py);
        dict.set_item("success", self.inner.success)?;
        dict.set_item("stdout", &self.inner.stdout)?;
        dict.set_item("stderr", &self.inner.stderr)?;
        dict.set_item("error", self.inner.error.as_deref())?;
        dict.set_item("exit_code", self.inner.exit_code)?;
        dict.set_item("duration_ms", self.inner.duration_ms)?;
        dict.set_item("executed_code", &self.inner.executed_code)?;
        Ok(dict)
    }

    fn __repr__(&self) -> String {
        format!(
            "ExecutionResult(success={}, exit_code={:?}, duration_ms={}, error={:?})",
            self.inner.success, self.inner.exit_code, self.inner.duration_ms, self.inner.error
        )
    }
}

impl From<RustExecutionResult> for ExecutionResult {
    fn from(inner: RustExecutionResult) -> Self {
        Self { inner }
    }
}

// =============================================================================
// Sandbox
// =============================================================================

/// Validates and runs snippets in isolated interpreter processes.
///
/// Unset options fall back to the SNIPPET_* environment variables, then
/// to built-in defaults.
///
/// Example:
///     >>> sandbox = Sandbox(max_output_length=2000, max_timeout=10.0)
///     >>> result = sandbox.execute("print(2 ** 10)", timeout_seconds=2.0)
///     >>> result.stdout
///     '1024\n'
#[pyclass(frozen)]
pub struct Sandbox {
    inner: RustSandbox,
}

#[pymethods]
impl Sandbox {
    #[new]
    #[pyo3(signature = (
        allowed_modules=None,
        max_code_length=None,
        max_output_length=None,
        default_timeout=None,
        max_timeout=None,
        memory_limit_mb=None,
        max_concurrent=None,
        python=None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        allowed_modules: Option<Vec<String>>,
        max_code_length: Option<usize>,
        max_output_length: Option<usize>,
        default_timeout: Option<f64>,
        max_timeout: Option<f64>,
        memory_limit_mb: Option<u64>,
        max_concurrent: Option<usize>,
        python: Option<PathBuf>,
    ) -> PyResult<Self> {
        let mut config = SandboxConfig::from_env().map_err(config_error_to_py_err)?;

        if let Some(v) = max_code_length {
            config.max_code_length = v;
        }
        if let Some(v) = max_output_length {
            config.max_output_length = v;
        }
        if let Some(v) = default_timeout {
            config.default_timeout_secs = checked_secs("default_timeout", v)?;
        }
        if let Some(v) = max_timeout {
            config.max_timeout_secs = checked_secs("max_timeout", v)?;
        }
        if let Some(v) = memory_limit_mb {
            config.memory_limit_mb = v;
        }
        if let Some(v) = max_concurrent {
            config.max_concurrent = v;
        }
        if let Some(v) = python {
            config.python = v;
        }

        let inner = match allowed_modules {
            None => RustSandbox::from_config(&config).map_err(config_error_to_py_err)?,
            Some(modules) => {
                let policy: SnippetPolicy = SnippetPolicy::builder()
                    .allowed_modules(modules)
                    .max_code_length(config.max_code_length)
                    .limits(config.limits())
                    .interpreter(&config.python)
                    .build()
                    .map_err(config_error_to_py_err)?;
                RustSandbox::new(policy, config.max_concurrent)
            }
        };

        Ok(Self { inner })
    }

    /// Evaluate a computation node.
    ///
    /// Never raises for snippet problems: rejections, errors and timeouts
    /// are reported on the returned ExecutionResult. The GIL is released
    /// while the snippet runs.
    #[pyo3(signature = (content, timeout_seconds=None))]
    fn execute(
        &self,
        py: Python<'_>,
        content: &str,
        timeout_seconds: Option<f64>,
    ) -> ExecutionResult {
        let sandbox = &self.inner;
        py.allow_threads(|| sandbox.execute_sync(content, timeout_seconds))
            .into()
    }

    /// Validate a snippet without running it.
    ///
    /// Returns None if accepted, else the rejection reason.
    fn validate(&self, code: &str) -> Option<String> {
        match self.inner.policy().verdict(code) {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }

    /// Number of interpreter processes this sandbox has started.
    #[getter]
    fn processes_spawned(&self) -> u64 {
        self.inner.processes_spawned()
    }

    fn __repr__(&self) -> String {
        let limits = self.inner.policy().limits();
        format!(
            "Sandbox(interpreter='{}', max_timeout={}s, max_output_length={})",
            self.inner.policy().interpreter().display(),
            limits.max_timeout.as_secs_f64(),
            limits.max_output_chars
        )
    }
}

fn checked_secs(name: &'static str, secs: f64) -> PyResult<f64> {
    if secs.is_finite() && secs > 0.0 && secs <= 86_400.0 {
        Ok(secs)
    } else {
        Err(PyValueError::new_err(format!(
            "{name} must be between 0 and 86400 seconds, got {secs}"
        )))
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the runnable snippet from a content blob.
#[pyfunction]
fn extract_code(content: &str) -> String {
    snippet_jail::extract_code(content)
}

/// Validate a snippet against the default policy.
///
/// Returns None if accepted, else the rejection reason.
#[pyfunction]
fn validate(code: &str) -> Option<String> {
    match snippet_jail::default_sandbox().policy().verdict(code) {
        Verdict::Accepted => None,
        Verdict::Rejected(reason) => Some(reason),
    }
}

/// Evaluate a computation node with the process-wide sandbox.
#[pyfunction]
#[pyo3(signature = (content, timeout_seconds=None))]
fn execute(py: Python<'_>, content: &str, timeout_seconds: Option<f64>) -> ExecutionResult {
    py.allow_threads(|| snippet_jail::default_sandbox().execute_sync(content, timeout_seconds))
        .into()
}

// =============================================================================
// Module
// =============================================================================

/// Sandboxed evaluation of computation nodes.
///
/// Example:
///     >>> from snippet_jail import execute
///     >>>
///     >>> result = execute("```python\nimport math\nprint(math.pi)\n```")
///     >>> result.success
///     True
///     >>> result.to_dict()["stdout"]
///     '3.141592653589793\n'
#[pymodule]
fn _snippet_jail(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ExecutionResult>()?;
    m.add_class::<Sandbox>()?;
    m.add_function(wrap_pyfunction!(extract_code, m)?)?;
    m.add_function(wrap_pyfunction!(validate, m)?)?;
    m.add_function(wrap_pyfunction!(execute, m)?)?;
    Ok(())
}
