//! `env` module: the function's environment variables
//!
//! Same contract and namespace rules as `kv`, backed by the environment
//! store that also holds provider API keys.

use std::sync::Arc;

use mlua::{Lua, Result as LuaResult, Table};

use super::kv::store_module;
use super::ModuleEnv;

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    store_module(lua, Arc::clone(&env.env), &env.function_id)
}
