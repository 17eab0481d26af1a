//! Retention Sweep Tests
//!
//! Runs the housekeeper against the on-disk execution store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::Host;
use moonhost::functions::{
    Execution, ExecutionStore, FileExecutionStore, Function, RetentionDays, RetentionHousekeeper,
};
use serde_json::json;
use tempfile::TempDir;

const DAY: i64 = 24 * 60 * 60;

fn backdate(store: &dyn ExecutionStore, function: &Function, id: &str, created_at: i64) {
    let version = store.active_version(&function.id).unwrap();
    let mut exec = Execution::new(&function.id, &version.id, None);
    exec.id = id.to_string();
    exec.created_at = created_at;
    store.create_execution(exec).unwrap();
}

#[test]
fn test_sweep_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("functions.json");
    let now = 1_750_000_000;

    {
        let store = FileExecutionStore::new(&path);
        let func = store
            .create_function(Function::new("daily").with_retention(RetentionDays::HalfMonth))
            .unwrap();
        store.create_version(&func.id, "function handler() end", None).unwrap();
        backdate(&store, &func, "exec_old", now - 20 * DAY);
        backdate(&store, &func, "exec_mid", now - 10 * DAY);
        backdate(&store, &func, "exec_new", now - DAY);
    }

    let store = Arc::new(FileExecutionStore::new(&path));
    let deleted = RetentionHousekeeper::new(store.clone()).sweep(now).unwrap();
    assert_eq!(deleted, 1);

    let reopened = FileExecutionStore::new(&path);
    assert!(reopened.get_execution("exec_old").is_err());
    assert!(reopened.get_execution("exec_mid").is_ok());
    assert!(reopened.get_execution("exec_new").is_ok());
}

#[test]
fn test_short_retention_held_by_longest() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileExecutionStore::new(dir.path().join("functions.json")));
    let now = 1_750_000_000;

    let weekly = store
        .create_function(Function::new("weekly").with_retention(RetentionDays::Week))
        .unwrap();
    let yearly = store
        .create_function(Function::new("yearly").with_retention(RetentionDays::Year))
        .unwrap();
    for f in [&weekly, &yearly] {
        store.create_version(&f.id, "function handler() end", None).unwrap();
    }

    backdate(store.as_ref(), &weekly, "exec_weekly_old", now - 100 * DAY);
    backdate(store.as_ref(), &yearly, "exec_yearly_ancient", now - 400 * DAY);

    let housekeeper = RetentionHousekeeper::new(store.clone());
    assert_eq!(housekeeper.cutoff(now).unwrap(), now - 365 * DAY);
    assert_eq!(housekeeper.sweep(now).unwrap(), 1);

    // Well past its own 7 days, but inside the global cutoff
    assert!(store.get_execution("exec_weekly_old").is_ok());
    assert!(store.get_execution("exec_yearly_ancient").is_err());

    // Dropping the long retention releases it on the next sweep
    store.delete_function(&yearly.id).unwrap();
    assert_eq!(housekeeper.sweep(now).unwrap(), 1);
    assert!(store.get_execution("exec_weekly_old").is_err());
}

#[tokio::test]
async fn test_fresh_invocations_survive_sweep() {
    let dir = TempDir::new().unwrap();
    let host = Host::on_disk(&dir.path().join("functions.json"), Duration::from_secs(5));
    let func = host.deploy("ping", "function handler() return 'pong' end");

    for _ in 0..3 {
        host.invoker.invoke(&func.id, json!({})).await.unwrap();
    }

    let housekeeper = RetentionHousekeeper::new(host.store.clone());
    let now = chrono::Utc::now().timestamp();
    assert_eq!(housekeeper.sweep(now).unwrap(), 0);

    let (_, total) = host
        .invoker
        .list_executions(&func.id, Default::default())
        .unwrap();
    assert_eq!(total, 3);
}
