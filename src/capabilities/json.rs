//! `json` module

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{fail, lua_string, ok, Fallible};
use crate::functions::marshal::{json_to_lua, lua_to_json};

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    table.set(
        "encode",
        lua.create_function(|_, value: LuaValue| {
            let result: Fallible<String> = match value {
                LuaValue::Function(_) | LuaValue::Thread(_) | LuaValue::UserData(_) => {
                    fail(format!("cannot encode value of type {}", value.type_name()))
                }
                other => ok(lua_to_json(&other).to_string()),
            };
            Ok(result)
        })?,
    )?;

    table.set(
        "decode",
        lua.create_function(|lua, input: LuaValue| {
            Ok(match serde_json::from_str::<serde_json::Value>(&lua_string(&input)) {
                Ok(value) => ok(json_to_lua(lua, &value)?),
                Err(e) => fail::<LuaValue>(format!("failed to decode json: {}", e)),
            })
        })?,
    )?;

    Ok(table)
}
