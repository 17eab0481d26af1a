//! # Lua Runtime
//!
//! Sandbox host for guest functions. Every invocation gets a brand-new Lua
//! state with only the safe standard libraries, the capability modules
//! bound to that invocation, and a deadline.
//!
//! The deadline is enforced at await points (module calls that do I/O or
//! sleep) and by an instruction-count hook, so a handler spinning in pure
//! Lua is interrupted as well.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use mlua::{
    FromLuaMulti, Function as LuaFunction, HookTriggers, IntoLuaMulti, Lua, LuaOptions,
    MultiValue, StdLib, Table, Value as LuaValue, VmState,
};
use serde_json::Value;
use uuid::Uuid;

use super::cancel::{CancelToken, CancellationController, Cancelled};
use super::execution::{ExecutionOutcome, ExecutionStatus};
use super::function::{Function, FunctionVersion};
use super::marshal::{json_to_lua, lua_to_json};
use crate::capabilities::{register_all, LogSink, ModuleEnv};
use crate::kv::NamespacedStore;
use crate::outbound::HttpClient;

/// Libraries opened in every sandbox, on top of the always-present base library
pub fn safe_libs() -> StdLib {
    StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE
}

/// Base-library globals removed from every sandbox
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile"];

/// VM instructions between deadline checks
const DEADLINE_CHECK_INTERVAL: u32 = 10_000;

/// Re-raises an expired deadline after protected calls return
const PROTECTED_CALL_GUARD: &str = r#"
local guard = ...
local raw_pcall, raw_xpcall, raw_resume = pcall, xpcall, coroutine.resume
pcall = function(...) return guard(raw_pcall(...)) end
xpcall = function(...) return guard(raw_xpcall(...)) end
coroutine.resume = function(...) return guard(raw_resume(...)) end
"#;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Wall-clock limit for one invocation
    pub timeout: Duration,

    /// Exposed to guests as `ctx.baseUrl`
    pub base_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// The `ctx` table handed to `handler(ctx, event)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub function_id: String,
    pub function_name: String,
    pub version: u32,
    pub request_id: String,
    /// Unix seconds
    pub started_at: i64,
    pub base_url: String,
}

impl ExecutionContext {
    pub fn new(
        execution_id: impl Into<String>,
        function: &Function,
        version: &FunctionVersion,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            function_id: function.id.clone(),
            function_name: function.name.clone(),
            version: version.version,
            request_id: Uuid::new_v4().to_string(),
            started_at: Utc::now().timestamp(),
            base_url: base_url.into(),
        }
    }

    fn to_table(&self, lua: &Lua) -> mlua::Result<Table> {
        let ctx = lua.create_table()?;
        ctx.set("executionId", self.execution_id.as_str())?;
        ctx.set("functionId", self.function_id.as_str())?;
        ctx.set("functionName", self.function_name.as_str())?;
        ctx.set("version", self.version)?;
        ctx.set("requestId", self.request_id.as_str())?;
        ctx.set("startedAt", self.started_at)?;
        ctx.set("baseUrl", self.base_url.as_str())?;
        Ok(ctx)
    }
}

/// One sandbox invocation
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Namespace for kv/env access
    pub function_id: String,
    pub code: String,
    /// Original, unmasked event
    pub event: Value,
    pub timeout: Duration,
    pub context: ExecutionContext,
}

/// Trait for guest runtimes
#[async_trait]
pub trait FunctionRuntime: Send + Sync {
    /// Run one invocation to a terminal outcome; never returns a host error
    async fn invoke(&self, request: InvocationRequest) -> ExecutionOutcome;

    /// Runtime name for logging
    fn name(&self) -> &'static str;
}

/// Lua 5.4 runtime
#[derive(Clone)]
pub struct LuaRuntime {
    kv: Arc<dyn NamespacedStore>,
    env: Arc<dyn NamespacedStore>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for LuaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaRuntime").finish_non_exhaustive()
    }
}

impl LuaRuntime {
    pub fn new(
        kv: Arc<dyn NamespacedStore>,
        env: Arc<dyn NamespacedStore>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self { kv, env, http }
    }

    /// Fresh state with safe libraries and the invocation's modules
    fn sandbox(module_env: &ModuleEnv) -> mlua::Result<Lua> {
        let lua = Lua::new_with(safe_libs(), LuaOptions::default())?;

        let token = module_env.cancel.clone();
        let guard = lua.create_function(move |_, results: MultiValue| {
            if token.is_cancelled() {
                Err(mlua::Error::RuntimeError(Cancelled.to_string()))
            } else {
                Ok(results)
            }
        })?;
        lua.load(PROTECTED_CALL_GUARD)
            .set_name("=sandbox")
            .call::<()>(guard)?;

        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals.set(*name, LuaValue::Nil)?;
        }
        register_all(&lua, module_env)?;

        Ok(lua)
    }

    async fn run_guest(module_env: &ModuleEnv, request: &InvocationRequest) -> Result<Value, String> {
        let lua = Self::sandbox(module_env).map_err(|e| e.to_string())?;

        let cancel = &module_env.cancel;

        let chunk = lua
            .load(request.code.as_str())
            .set_name(format!("={}", request.context.function_name))
            .into_function()
            .map_err(|e| e.to_string())?;
        run_watched::<_, ()>(&lua, chunk, (), cancel)
            .await
            .map_err(|e| e.to_string())?;

        let handler = match lua.globals().get::<LuaValue>("handler") {
            Ok(LuaValue::Function(f)) => f,
            _ => return Err("handler function not defined".to_string()),
        };

        let ctx = request.context.to_table(&lua).map_err(|e| e.to_string())?;
        let event = json_to_lua(&lua, &request.event).map_err(|e| e.to_string())?;

        run_watched::<_, LuaValue>(&lua, handler, (ctx, event), cancel)
            .await
            .map(|ret| lua_to_json(&ret))
            .map_err(|e| e.to_string())
    }
}

/// Run `func` on its own coroutine, raising once `cancel` fires
///
/// mlua keeps one hook per state, bound to a single thread. Coroutines the
/// guest creates itself only observe the deadline at module calls.
async fn run_watched<A, R>(
    lua: &Lua,
    func: LuaFunction,
    args: A,
    cancel: &CancelToken,
) -> mlua::Result<R>
where
    A: IntoLuaMulti,
    R: FromLuaMulti,
{
    let thread = lua.create_thread(func)?;
    let token = cancel.clone();
    thread.set_hook(
        HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
        move |_, _| {
            if token.is_cancelled() {
                Err(mlua::Error::RuntimeError(Cancelled.to_string()))
            } else {
                Ok(VmState::Continue)
            }
        },
    );
    thread.into_async::<R>(args).await
}

#[async_trait]
impl FunctionRuntime for LuaRuntime {
    async fn invoke(&self, request: InvocationRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let controller = CancellationController::with_timeout(request.timeout);
        let logs = LogSink::new();

        let module_env = ModuleEnv {
            function_id: request.function_id.clone(),
            kv: Arc::clone(&self.kv),
            env: Arc::clone(&self.env),
            http: Arc::clone(&self.http),
            cancel: controller.token(),
            logs: logs.clone(),
        };

        let result = tokio::time::timeout_at(
            controller.deadline(),
            Self::run_guest(&module_env, &request),
        )
        .await;
        let timed_out = result.is_err() || controller.token().is_cancelled();

        let duration_ms = started.elapsed().as_millis() as u64;
        let logs = logs.take();

        let (status, output, error) = match result {
            Ok(Ok(output)) if !timed_out => (ExecutionStatus::Success, Some(output), None),
            Ok(Err(error)) if !timed_out => (ExecutionStatus::Failure, None, Some(error)),
            _ => (
                ExecutionStatus::Timeout,
                None,
                Some(format!(
                    "execution timed out after {}ms",
                    request.timeout.as_millis()
                )),
            ),
        };

        ExecutionOutcome {
            status,
            output,
            error,
            logs,
            duration_ms,
        }
    }

    fn name(&self) -> &'static str {
        "lua54"
    }
}
