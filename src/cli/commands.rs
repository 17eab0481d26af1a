//! CLI command implementations
//!
//! Every command opens the file-backed stores under `data_dir`, performs one
//! operation and prints one JSON response line.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::info;

use crate::config::EngineConfig;
use crate::functions::{
    ExecutionStore, FileExecutionStore, Function, Invoker, LuaRuntime, Pagination,
    RetentionDays, RetentionHousekeeper,
};
use crate::kv::{FileStore, NamespacedStore};
use crate::masking::mask_json;
use crate::outbound::ReqwestClient;

use super::args::{Command, EnvAction, FunctionAction};
use super::errors::{CliError, CliResult};
use super::io::read_event;

/// The host components a command works with
pub struct Engine {
    pub config: EngineConfig,
    pub store: Arc<dyn ExecutionStore>,
    pub kv: Arc<dyn NamespacedStore>,
    pub env: Arc<dyn NamespacedStore>,
    pub invoker: Invoker,
}

impl Engine {
    /// Open the file-backed stores described by `config`
    pub fn open(config: EngineConfig) -> CliResult<Self> {
        let store: Arc<dyn ExecutionStore> =
            Arc::new(FileExecutionStore::new(config.functions_path()));
        let kv: Arc<dyn NamespacedStore> = Arc::new(FileStore::new(config.kv_path()));
        let env: Arc<dyn NamespacedStore> = Arc::new(FileStore::new(config.env_path()));
        let http = Arc::new(ReqwestClient::new(config.http_timeout())?);

        let runtime = LuaRuntime::new(Arc::clone(&kv), Arc::clone(&env), http);
        let invoker = Invoker::new(Arc::clone(&store), Arc::new(runtime), config.runtime());

        Ok(Self {
            config,
            store,
            kv,
            env,
            invoker,
        })
    }
}

/// Run a command and return its response payload
pub async fn run_command(engine: &Engine, command: Command) -> CliResult<Value> {
    match command {
        Command::Function { action } => function(engine, action),
        Command::Env { action } => env(engine, action),
        Command::Invoke { id } => {
            let event = read_event()?;
            invoke(engine, &id, event).await
        }
        Command::Executions { id, limit, offset } => executions(engine, &id, Pagination::new(limit, offset)),
        Command::Sweep => sweep(engine),
        Command::Housekeep => housekeep(engine).await,
    }
}

fn read_code(path: &Path) -> CliResult<String> {
    fs::read_to_string(path)
        .map_err(|e| CliError::io_error(format!("failed to read {}: {}", path.display(), e)))
}

fn to_value<T: serde::Serialize>(value: &T) -> CliResult<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn function(engine: &Engine, action: FunctionAction) -> CliResult<Value> {
    let store = &engine.store;

    match action {
        FunctionAction::Create {
            name,
            code,
            retention,
            description,
        } => {
            let source = read_code(&code)?;
            let mut func = Function::new(name);
            if let Some(days) = retention {
                func = func.with_retention(RetentionDays::try_from(days)?);
            }
            if let Some(description) = description {
                func = func.with_description(description);
            }

            let func = store.create_function(func)?;
            let version = store.create_version(&func.id, &source, None)?;
            info!(function_id = %func.id, version = version.version, "function created");
            Ok(json!({ "function": to_value(&func)?, "version": to_value(&version)? }))
        }
        FunctionAction::Deploy { id, code, message } => {
            let source = read_code(&code)?;
            let version = store.create_version(&id, &source, message)?;
            info!(function_id = %id, version = version.version, "version deployed");
            to_value(&version)
        }
        FunctionAction::List { limit, offset } => {
            let (functions, total) = store.list_functions(Pagination::new(limit, offset))?;
            Ok(json!({ "functions": to_value(&functions)?, "total": total }))
        }
        FunctionAction::Versions { id } => to_value(&store.list_versions(&id)?),
        FunctionAction::Rename { id, name } => {
            let mut func = store.get_function(&id)?;
            func.rename(name);
            to_value(&store.update_function(func)?)
        }
        FunctionAction::Retention { id, days } => {
            let mut func = store.get_function(&id)?;
            func.retention_days = Some(RetentionDays::try_from(days)?);
            func.updated_at = Utc::now().timestamp();
            to_value(&store.update_function(func)?)
        }
        FunctionAction::Delete { id } => {
            store.delete_function(&id)?;
            let kv_keys = engine.kv.clear(&id)?;
            let env_vars = engine.env.clear(&id)?;
            info!(function_id = %id, kv_keys, env_vars, "function deleted");
            Ok(json!({ "deleted": id }))
        }
    }
}

pub fn env(engine: &Engine, action: EnvAction) -> CliResult<Value> {
    match action {
        EnvAction::Set { id, key, value } => {
            let mut func = engine.store.get_function(&id)?;
            engine.env.set(&id, &key, &value)?;
            if func.track_env_var(key.as_str()) {
                engine.store.update_function(func)?;
            }
            Ok(json!({ "set": key }))
        }
        EnvAction::Unset { id, key } => {
            let mut func = engine.store.get_function(&id)?;
            engine.env.delete(&id, &key)?;
            if func.untrack_env_var(&key) {
                engine.store.update_function(func)?;
            }
            Ok(json!({ "unset": key }))
        }
        EnvAction::List { id } => {
            engine.store.get_function(&id)?;
            let vars: Map<String, Value> = engine
                .env
                .list(&id)?
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            Ok(mask_json(&Value::Object(vars)))
        }
    }
}

pub async fn invoke(engine: &Engine, function_id: &str, event: Value) -> CliResult<Value> {
    let result = engine.invoker.invoke(function_id, event).await?;
    to_value(&result.execution)
}

pub fn executions(engine: &Engine, function_id: &str, page: Pagination) -> CliResult<Value> {
    engine.store.get_function(function_id)?;
    let (executions, total) = engine.invoker.list_executions(function_id, page)?;
    Ok(json!({ "executions": to_value(&executions)?, "total": total }))
}

pub fn sweep(engine: &Engine) -> CliResult<Value> {
    let housekeeper = RetentionHousekeeper::new(Arc::clone(&engine.store));
    let now = Utc::now().timestamp();
    let cutoff = housekeeper.cutoff(now)?;
    let deleted = housekeeper.sweep(now)?;
    Ok(json!({ "deleted": deleted, "cutoff": cutoff }))
}

async fn housekeep(engine: &Engine) -> CliResult<Value> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let housekeeper = RetentionHousekeeper::new(Arc::clone(&engine.store));
    let schedule = engine.config.housekeeping_schedule.clone();

    let handle = tokio::spawn(async move { housekeeper.run(&schedule, shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping housekeeping");
    let _ = shutdown_tx.send(true);

    handle
        .await
        .map_err(|e| CliError::boot_failed(format!("housekeeping task failed: {}", e)))??;
    Ok(json!({ "stopped": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Engine {
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            execution_timeout_secs: 5,
            ..EngineConfig::default()
        };
        Engine::open(config).unwrap()
    }

    fn write_code(dir: &TempDir, name: &str, code: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, code).unwrap();
        path
    }

    fn create(engine: &Engine, dir: &TempDir, name: &str, code: &str) -> String {
        let path = write_code(dir, &format!("{}.lua", name), code);
        let created = function(
            engine,
            FunctionAction::Create {
                name: name.to_string(),
                code: path,
                retention: None,
                description: None,
            },
        )
        .unwrap();
        created["function"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_invoke_and_list() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let id = create(
            &engine,
            &dir,
            "greet",
            "function handler(ctx, e) return 'hi ' .. e.name end",
        );

        let exec = invoke(&engine, &id, json!({"name": "ada"})).await.unwrap();
        assert_eq!(exec["status"], "success");
        assert_eq!(exec["output"], "hi ada");

        let listed = executions(&engine, &id, Pagination::default()).unwrap();
        assert_eq!(listed["total"], 1);
        assert!(dir.path().join("functions.json").exists());
    }

    #[tokio::test]
    async fn test_deploy_switches_active_code() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let id = create(&engine, &dir, "v", "function handler() return 1 end");

        let v2 = write_code(&dir, "v2.lua", "function handler() return 2 end");
        let deployed = function(
            &engine,
            FunctionAction::Deploy {
                id: id.clone(),
                code: v2,
                message: Some("bump".into()),
            },
        )
        .unwrap();
        assert_eq!(deployed["version"], 2);

        let exec = invoke(&engine, &id, json!({})).await.unwrap();
        assert_eq!(exec["output"], 2);
    }

    #[tokio::test]
    async fn test_env_set_is_visible_to_guest_and_masked_in_listing() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let id = create(
            &engine,
            &dir,
            "envy",
            "function handler() return env.get('REGION') end",
        );

        for (key, value) in [("REGION", "eu-west-1"), ("API_KEY", "sk-live-123")] {
            env(
                &engine,
                EnvAction::Set {
                    id: id.clone(),
                    key: key.into(),
                    value: value.into(),
                },
            )
            .unwrap();
        }

        let exec = invoke(&engine, &id, json!({})).await.unwrap();
        assert_eq!(exec["output"], "eu-west-1");

        let listed = env(&engine, EnvAction::List { id: id.clone() }).unwrap();
        assert_eq!(listed["REGION"], "eu-west-1");
        assert_eq!(listed["API_KEY"], crate::masking::REDACTED);
    }

    #[test]
    fn test_env_names_follow_set_and_unset() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let id = create(&engine, &dir, "named", "function handler() end");

        let set = |key: &str| {
            env(
                &engine,
                EnvAction::Set {
                    id: id.clone(),
                    key: key.into(),
                    value: "v".into(),
                },
            )
            .unwrap();
        };
        set("REGION");
        set("TOKEN");
        set("REGION");

        let names = |engine: &Engine| {
            engine
                .store
                .get_function(&id)
                .unwrap()
                .env_vars
                .into_iter()
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&engine), vec!["REGION", "TOKEN"]);

        env(
            &engine,
            EnvAction::Unset {
                id: id.clone(),
                key: "REGION".into(),
            },
        )
        .unwrap();
        assert_eq!(names(&engine), vec!["TOKEN"]);

        // Values never reach the function record
        let raw = fs::read_to_string(dir.path().join("functions.json")).unwrap();
        assert!(raw.contains("TOKEN"));
        assert!(!raw.contains("\"v\""));
    }

    #[tokio::test]
    async fn test_delete_clears_env_and_kv() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let id = create(
            &engine,
            &dir,
            "doomed",
            "function handler() kv.set('count', 1) end",
        );
        let other = create(&engine, &dir, "bystander", "function handler() end");

        env(
            &engine,
            EnvAction::Set {
                id: id.clone(),
                key: "API_KEY".into(),
                value: "sk-live-1".into(),
            },
        )
        .unwrap();
        engine.kv.set(&other, "count", "7").unwrap();
        invoke(&engine, &id, json!({})).await.unwrap();
        assert_eq!(engine.kv.get(&id, "count").unwrap(), "1");

        function(&engine, FunctionAction::Delete { id: id.clone() }).unwrap();

        assert!(engine.kv.list(&id).unwrap().is_empty());
        assert!(engine.env.list(&id).unwrap().is_empty());
        assert_eq!(engine.kv.get(&other, "count").unwrap(), "7");

        // A new function reusing the name starts from a clean slate
        let reborn = create(&engine, &dir, "doomed", "function handler() end");
        assert!(engine.env.list(&reborn).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_retention_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let path = write_code(&dir, "r.lua", "function handler() end");

        let err = function(
            &engine,
            FunctionAction::Create {
                name: "r".into(),
                code: path,
                retention: Some(10),
                description: None,
            },
        )
        .unwrap_err();
        assert!(err.message().contains("10"));
    }

    #[test]
    fn test_unknown_function_errors() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        assert!(executions(&engine, "fn_nope", Pagination::default()).is_err());
        assert!(env(&engine, EnvAction::List { id: "fn_nope".into() }).is_err());
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let out = sweep(&engine).unwrap();
        assert_eq!(out["deleted"], 0);
    }
}
