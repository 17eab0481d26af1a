//! # Capability Modules
//!
//! Host functionality exposed to guest code as global tables (`crypto`,
//! `time`, `url`, `ai`, `http`, `kv`, `env`, `log`, `json`, `strings`,
//! `random`, `base64`).
//!
//! Every binding is built for one invocation from a [`ModuleEnv`] and
//! dropped with that invocation's Lua state. Store-backed modules always
//! pass the invocation's function ID as namespace; guests cannot choose it.
//!
//! Calling convention: fallible functions return `(value, nil)` or
//! `(nil, message)`. Only cancellation and host faults raise.

pub mod ai;
pub mod base64;
pub mod crypto;
pub mod env;
pub mod http;
pub mod json;
pub mod kv;
pub mod log;
pub mod random;
pub mod strings;
pub mod time;
pub mod url;

use std::fmt::Display;
use std::sync::{Arc, Mutex};

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use crate::functions::{CancelToken, Cancelled, LogEntry, LogLevel};
use crate::kv::{NamespacedStore, StoreResult};
use crate::outbound::{HttpClient, HttpRequest, HttpResponse};

/// Two-value return of a fallible guest function
pub type Fallible<T> = (Option<T>, Option<String>);

pub(crate) fn ok<T>(value: T) -> Fallible<T> {
    (Some(value), None)
}

pub(crate) fn fail<T>(message: impl Display) -> Fallible<T> {
    (None, Some(message.to_string()))
}

/// Raised into the guest when the invocation is cancelled
pub(crate) fn cancelled_error(c: Cancelled) -> mlua::Error {
    mlua::Error::RuntimeError(c.to_string())
}

/// Log lines captured during one invocation, in emission order
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    /// Drain everything captured so far
    pub fn take(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Everything the modules of one invocation are bound to
#[derive(Clone)]
pub struct ModuleEnv {
    /// Namespace for every kv/env access
    pub function_id: String,
    pub kv: Arc<dyn NamespacedStore>,
    pub env: Arc<dyn NamespacedStore>,
    pub http: Arc<dyn HttpClient>,
    pub cancel: CancelToken,
    pub logs: LogSink,
}

impl std::fmt::Debug for ModuleEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEnv")
            .field("function_id", &self.function_id)
            .finish_non_exhaustive()
    }
}

impl ModuleEnv {
    /// Send a request through the outbound client, racing cancellation
    ///
    /// The outer error is cancellation and must be raised; the inner one is
    /// a transport failure reported to the guest.
    pub(crate) async fn send(
        &self,
        request: HttpRequest,
    ) -> Result<Result<HttpResponse, String>, Cancelled> {
        let http = Arc::clone(&self.http);
        self.cancel
            .race(async move { http.send(request).await.map_err(|e| e.to_string()) })
            .await
    }

    /// Read a value from this function's environment
    ///
    /// Absent and empty values are `None`; only a failing store is an error.
    pub(crate) fn env_var(&self, key: &str) -> StoreResult<Option<String>> {
        match self.env.get(&self.function_id, key) {
            Ok(value) => Ok(Some(value).filter(|v| !v.is_empty())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Install every module as a global table
pub fn register_all(lua: &Lua, env: &ModuleEnv) -> LuaResult<()> {
    let globals = lua.globals();

    globals.set("crypto", crypto::module(lua)?)?;
    globals.set("time", time::module(lua, env)?)?;
    globals.set("url", url::module(lua)?)?;
    globals.set("ai", ai::module(lua, env)?)?;
    globals.set("http", http::module(lua, env)?)?;
    globals.set("kv", kv::module(lua, env)?)?;
    globals.set("env", env::module(lua, env)?)?;
    globals.set("log", log::module(lua, env)?)?;
    globals.set("json", json::module(lua)?)?;
    globals.set("strings", strings::module(lua)?)?;
    globals.set("random", random::module(lua)?)?;
    globals.set("base64", base64::module(lua)?)?;

    Ok(())
}

/// String form of a guest argument; absent or non-scalar values read as ""
pub(crate) fn lua_string(value: &LuaValue) -> String {
    match value {
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => (*n as i64).to_string(),
        LuaValue::Number(n) => n.to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Raw field of an options table; missing or unreadable fields are nil
pub(crate) fn field(table: &Table, key: &str) -> LuaValue {
    table.raw_get(key).unwrap_or(LuaValue::Nil)
}

/// Raw bytes of a guest argument
pub(crate) fn lua_bytes(value: &LuaValue) -> Vec<u8> {
    match value {
        LuaValue::String(s) => s.as_bytes().to_vec(),
        other => lua_string(other).into_bytes(),
    }
}

/// Numeric form of a guest argument; absent values read as 0
pub(crate) fn lua_number(value: &LuaValue) -> f64 {
    match value {
        LuaValue::Integer(i) => *i as f64,
        LuaValue::Number(n) => *n,
        LuaValue::String(s) => s.to_string_lossy().trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::fixture;
    use super::*;

    #[test]
    fn test_all_modules_registered() {
        let fx = fixture();
        for name in [
            "crypto", "time", "url", "ai", "http", "kv", "env", "log", "json", "strings",
            "random", "base64",
        ] {
            let value: LuaValue = fx.lua.globals().get(name).unwrap();
            assert!(value.is_table(), "{} missing", name);
        }
    }

    #[test]
    fn test_argument_coercion() {
        let lua = Lua::new();
        assert_eq!(lua_string(&LuaValue::Nil), "");
        assert_eq!(lua_string(&LuaValue::Number(3.0)), "3");
        assert_eq!(lua_string(&LuaValue::Integer(-2)), "-2");
        assert_eq!(lua_number(&LuaValue::Nil), 0.0);
        let s = LuaValue::String(lua.create_string(" 12.5 ").unwrap());
        assert_eq!(lua_number(&s), 12.5);
    }

    #[test]
    fn test_log_sink_take_drains() {
        let sink = LogSink::new();
        sink.push(LogLevel::Info, "a");
        sink.push(LogLevel::Error, "b");

        let logs = sink.take();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].level, LogLevel::Error);
        assert!(sink.take().is_empty());
    }
}
