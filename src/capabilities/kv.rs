//! `kv` module: per-function key-value storage
//!
//! The namespace is fixed to the invoking function's ID when the module is
//! built; nothing the guest passes can change it.

use std::sync::Arc;

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{fail, lua_string, ok, Fallible, ModuleEnv};
use crate::functions::marshal::lua_to_json;
use crate::kv::NamespacedStore;

/// Stored form of a guest value; tables are kept as JSON text
fn stored_value(value: &LuaValue) -> String {
    match value {
        LuaValue::Table(_) => lua_to_json(value).to_string(),
        other => lua_string(other),
    }
}

/// `get`/`set`/`delete` bound to one store and one namespace
pub(crate) fn store_module(
    lua: &Lua,
    store: Arc<dyn NamespacedStore>,
    namespace: &str,
) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let (s, ns) = (Arc::clone(&store), namespace.to_string());
    table.set(
        "get",
        lua.create_function(move |_, key: LuaValue| {
            let result: Fallible<String> = match s.get(&ns, &lua_string(&key)) {
                Ok(value) => ok(value),
                Err(e) => fail(e),
            };
            Ok(result)
        })?,
    )?;

    let (s, ns) = (Arc::clone(&store), namespace.to_string());
    table.set(
        "set",
        lua.create_function(move |_, (key, value): (LuaValue, LuaValue)| {
            let key = lua_string(&key);
            if key.is_empty() {
                return Ok(fail::<bool>("key is required"));
            }
            Ok(match s.set(&ns, &key, &stored_value(&value)) {
                Ok(()) => ok(true),
                Err(e) => fail(e),
            })
        })?,
    )?;

    let (s, ns) = (store, namespace.to_string());
    table.set(
        "delete",
        lua.create_function(move |_, key: LuaValue| {
            let result: Fallible<bool> = match s.delete(&ns, &lua_string(&key)) {
                Ok(()) => ok(true),
                Err(e) => fail(e),
            };
            Ok(result)
        })?,
    )?;

    Ok(table)
}

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    store_module(lua, Arc::clone(&env.kv), &env.function_id)
}
