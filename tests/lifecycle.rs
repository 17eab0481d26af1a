//! Execution Lifecycle Tests
//!
//! Every invocation that reaches the sandbox ends in exactly one terminal
//! record, whether the guest succeeds, fails or runs out of time.

mod common;

use std::time::{Duration, Instant};

use common::{FakeHttp, Host};
use moonhost::functions::{ExecutionStatus, ExecutionStore, FileExecutionStore, LogLevel, Pagination};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Terminal Outcomes
// =============================================================================

#[tokio::test]
async fn test_success_record_fields() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_secs(5));
    let func = host.deploy(
        "adder",
        r#"
        function handler(ctx, event)
            log.debug("adding")
            return { sum = event.a + event.b, fn = ctx.functionId }
        end
        "#,
    );

    let result = host
        .invoker
        .invoke(&func.id, json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    let exec = result.execution;

    assert_eq!(exec.status, ExecutionStatus::Success);
    assert_eq!(exec.output, Some(json!({"sum": 5, "fn": func.id})));
    assert_eq!(exec.function_id, func.id);
    assert_eq!(exec.logs.len(), 1);
    assert_eq!(exec.logs[0].level, LogLevel::Debug);
    assert!(exec.duration_ms.is_some());
    assert!(exec.completed_at.unwrap() >= exec.created_at);
    assert!(exec.error.is_none());
}

#[tokio::test]
async fn test_handler_without_return_is_null_output() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_secs(5));
    let func = host.deploy("noop", "function handler() end");

    let result = host.invoker.invoke(&func.id, json!({})).await.unwrap();
    assert_eq!(result.status(), ExecutionStatus::Success);
    assert_eq!(result.output, Some(json!(null)));
}

#[tokio::test]
async fn test_missing_handler_is_failure() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_secs(5));
    let func = host.deploy("nohandler", "function main() return 1 end");

    let result = host.invoker.invoke(&func.id, json!({})).await.unwrap();
    assert_eq!(result.status(), ExecutionStatus::Failure);
    assert_eq!(
        result.execution.error.as_deref(),
        Some("handler function not defined")
    );
    let last = result.execution.logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Error);
}

#[tokio::test]
async fn test_timeout_during_sleep() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_millis(100));
    let func = host.deploy(
        "sleepy",
        r#"
        function handler()
            log.info("going to sleep")
            time.sleep(60000)
            log.info("woke up")
            return "late"
        end
        "#,
    );

    let started = Instant::now();
    let result = host.invoker.invoke(&func.id, json!({})).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.status(), ExecutionStatus::Timeout);
    assert!(result.output.is_none());
    assert!(result.execution.error.as_ref().unwrap().contains("timed out"));
    assert!(result
        .execution
        .logs
        .iter()
        .all(|l| l.message != "woke up"));
}

#[tokio::test]
async fn test_timeout_during_http_call() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_millis(100));
    let func = host.deploy(
        "slowcall",
        r#"
        function handler()
            time.sleep(200)
            return http.get("https://example.com")
        end
        "#,
    );

    let result = host.invoker.invoke(&func.id, json!({})).await.unwrap();
    assert_eq!(result.status(), ExecutionStatus::Timeout);
    assert!(host.http.requests().is_empty());
}

#[tokio::test]
async fn test_timeout_in_cpu_bound_loop() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_millis(10));
    let func = host.deploy(
        "spinner",
        r#"
        function handler()
            log.info("spinning")
            local n = 0
            while true do n = n + 1 end
            return n
        end
        "#,
    );

    let started = Instant::now();
    let result = host.invoker.invoke(&func.id, json!({})).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.status(), ExecutionStatus::Timeout);
    assert!(result.output.is_none());
    assert!(result.execution.output.is_none());
    assert_eq!(result.execution.logs[0].message, "spinning");
    assert_eq!(result.execution.logs.last().unwrap().level, LogLevel::Error);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_records_persist_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("functions.json");
    let id;
    {
        let host = Host::on_disk(&path, Duration::from_secs(5));
        let func = host.deploy("persisted", "function handler(ctx, e) return e end");
        id = func.id.clone();

        for n in 0..3 {
            let result = host.invoker.invoke(&id, json!({"n": n})).await.unwrap();
            assert_eq!(result.status(), ExecutionStatus::Success);
        }
    }

    let store = FileExecutionStore::new(&path);
    let (executions, total) = store.list_executions(&id, Pagination::new(2, 0)).unwrap();
    assert_eq!(total, 3);
    assert_eq!(executions.len(), 2);
    assert!(executions
        .iter()
        .all(|e| e.status == ExecutionStatus::Success && e.completed_at.is_some()));
}

#[tokio::test]
async fn test_new_version_is_used_by_next_invocation() {
    let host = Host::in_memory(FakeHttp::offline(), Duration::from_secs(5));
    let func = host.deploy("versioned", "function handler(ctx) return ctx.version end");

    let first = host.invoker.invoke(&func.id, json!({})).await.unwrap();
    host.store
        .create_version(&func.id, "function handler(ctx) return ctx.version * 10 end", None)
        .unwrap();
    let second = host.invoker.invoke(&func.id, json!({})).await.unwrap();

    assert_eq!(first.output, Some(json!(1)));
    assert_eq!(second.output, Some(json!(20)));
    assert_ne!(
        first.execution.function_version_id,
        second.execution.function_version_id
    );
}
