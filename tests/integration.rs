//! Integration tests for snippet_jail.
//!
//! These tests run snippets in a real interpreter. They are skipped when
//! no interpreter is installed at the default path.

use snippet_jail::{
    ExecutionRequest, ExecutionResult, Sandbox, SnippetPolicy, DEFAULT_INTERPRETER,
    TRUNCATION_MARKER,
};
use std::path::Path;
use std::time::{Duration, Instant};

fn python_available() -> bool {
    let available = Path::new(DEFAULT_INTERPRETER).is_file();
    if !available {
        eprintln!("skipping: {DEFAULT_INTERPRETER} not found");
    }
    available
}

fn sandbox() -> Sandbox {
    Sandbox::new(SnippetPolicy::builder().build().expect("valid policy"), 4)
}

#[tokio::test]
async fn test_arithmetic_snippet() {
    if !python_available() {
        return;
    }
    let sandbox = sandbox();

    let result = sandbox
        .execute("import math\nprint(math.factorial(10))\nprint(2 ** 10)", Some(5.0))
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "3628800\n1024\n");
    assert_eq!(result.stderr, "");
    assert_eq!(result.error, None);
    assert_eq!(sandbox.processes_spawned(), 1);
}

#[tokio::test]
async fn test_fenced_block_is_extracted() {
    if !python_available() {
        return;
    }
    let content = "Compute the mean:\n\n```text\nnot code\n```\n\n```python\nimport statistics\nprint(statistics.mean([1, 2, 3, 4]))\n```\n";

    let result = sandbox().execute(content, None).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.stdout.trim(), "2.5");
    assert_eq!(
        result.executed_code,
        "import statistics\nprint(statistics.mean([1, 2, 3, 4]))"
    );
}

#[tokio::test]
async fn test_request_entry_point() {
    if !python_available() {
        return;
    }
    let request = ExecutionRequest::new("print(sum(range(101)))").with_timeout_seconds(3.0);

    let result = sandbox().execute_request(&request).await;

    assert!(result.success);
    assert_eq!(result.stdout, "5050\n");
}

#[tokio::test]
async fn test_infinite_loop_is_killed() {
    if !python_available() {
        return;
    }
    let policy = SnippetPolicy::builder().build().expect("valid policy");
    let prepared = policy
        .prepare(&ExecutionRequest::new("while True:\n    pass").with_timeout_seconds(1.0))
        .unwrap();
    assert_eq!(prepared.timeout(), Duration::from_secs(1));

    let start = Instant::now();
    let output = prepared.run().await;

    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(!output.success());
    assert_eq!(output.exit_code, None);
    assert!(output
        .failure
        .as_ref()
        .is_some_and(|e| e.to_string().contains("timed out")));

    // The child was reaped before run() returned.
    if cfg!(target_os = "linux") {
        let pid = output.pid.expect("process was spawned");
        assert!(!Path::new(&format!("/proc/{pid}")).exists());
    }
}

#[tokio::test]
async fn test_timeout_result() {
    if !python_available() {
        return;
    }
    let sandbox = sandbox();

    let start = Instant::now();
    let result = sandbox.execute("print('started')\nwhile True:\n    pass", Some(1.0)).await;

    assert!(start.elapsed() < Duration::from_secs(4));
    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.error.as_deref(), Some("execution timed out after 1s"));
    assert!(result.duration_ms >= 1000);
    assert_eq!(sandbox.processes_spawned(), 1);
}

#[tokio::test]
async fn test_output_truncated() {
    if !python_available() {
        return;
    }
    let policy = SnippetPolicy::builder()
        .max_output_length(100)
        .build()
        .expect("valid policy");
    let sandbox = Sandbox::new(policy, 1);

    let result = sandbox.execute("print('a' * 50000)", None).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.stdout, format!("{}{}", "a".repeat(100), TRUNCATION_MARKER));
}

#[tokio::test]
async fn test_runtime_error() {
    if !python_available() {
        return;
    }
    let result = sandbox().execute("x = 1\ny = x / 0\nprint(y)", None).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.stdout, "");

    let error = result.error.expect("error is set");
    assert!(error.contains("ZeroDivisionError"), "got: {error}");
    // Line numbers refer to the snippet, not the wrapped source.
    assert!(result.stderr.contains("File \"<string>\", line 2"), "got: {}", result.stderr);
}

#[tokio::test]
async fn test_explicit_nonzero_exit() {
    if !python_available() {
        return;
    }
    let result = sandbox().execute("raise SystemExit(3)", None).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.error.as_deref(), Some("process exited with code 3"));
}

#[tokio::test]
async fn test_memory_limit() {
    if !python_available() {
        return;
    }
    let policy = SnippetPolicy::builder()
        .memory_limit(256 * 1024 * 1024)
        .build()
        .expect("valid policy");
    let sandbox = Sandbox::new(policy, 1);

    let result = sandbox.execute("data = bytearray(2 * 1024 ** 3)\nprint(len(data))", Some(5.0)).await;

    assert!(!result.success);
    assert_eq!(result.stdout, "");
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    if !python_available() {
        return;
    }
    let sandbox = sandbox();

    let (a, b) = tokio::join!(
        sandbox.execute("total = 0\nfor i in range(10):\n    total += i\nprint(total)", None),
        sandbox.execute("print(total if 'total' in dir() else 'fresh')", None),
    );

    assert!(a.success);
    assert_eq!(a.stdout, "45\n");
    assert!(b.success);
    assert_eq!(b.stdout, "fresh\n");
    assert_eq!(sandbox.processes_spawned(), 2);
}

#[tokio::test]
async fn test_sequential_runs_share_nothing() {
    if !python_available() {
        return;
    }
    let sandbox = sandbox();

    let first = sandbox.execute("counter = 41\nprint(counter + 1)", None).await;
    let second = sandbox.execute("print(counter)", None).await;

    assert_eq!(first.stdout, "42\n");
    assert!(!second.success);
    assert!(second.error.unwrap().contains("NameError"));
}

#[test]
fn test_environment_is_minimal() {
    let policy = SnippetPolicy::builder().build().expect("valid policy");
    let prepared = policy.prepare(&ExecutionRequest::new("print(1)")).unwrap();

    let env = prepared.env();
    assert!(!env.contains_key("PATH"));
    assert!(!env.contains_key("HOME"));
    assert!(!env.keys().any(|k| k.starts_with("LD_")));
    assert_eq!(env.get("PYTHONIOENCODING").map(String::as_str), Some("utf-8"));
}

#[tokio::test]
async fn test_unicode_output() {
    if !python_available() {
        return;
    }
    let result = sandbox().execute("print('π ≈', round(3.14159, 2))", None).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.stdout, "π ≈ 3.14\n");
}

#[tokio::test]
async fn test_result_serializes() {
    if !python_available() {
        return;
    }
    let result = sandbox().execute("print('ok')", None).await;

    let json = serde_json::to_string(&result).unwrap();
    let back: ExecutionResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for key in [
        "success",
        "stdout",
        "stderr",
        "error",
        "exit_code",
        "duration_ms",
        "executed_code",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn test_execute_sync() {
    if !python_available() {
        return;
    }
    let result = sandbox().execute_sync("print(6 * 7)", None);

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.stdout, "42\n");
}

#[tokio::test]
async fn test_process_wide_entry_point() {
    if !python_available() {
        return;
    }
    let result = snippet_jail::execute("```py\nprint('hi')\n```", None).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(result.stdout, "hi\n");
}
