//! `base64` module (standard alphabet, padded)

use base64::{engine::general_purpose, Engine as _};
use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{fail, lua_bytes, lua_string, ok, Fallible};

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    table.set(
        "encode",
        lua.create_function(|_, input: LuaValue| {
            Ok(general_purpose::STANDARD.encode(lua_bytes(&input)))
        })?,
    )?;

    table.set(
        "decode",
        lua.create_function(|lua, input: LuaValue| {
            let result: Fallible<mlua::String> =
                match general_purpose::STANDARD.decode(lua_string(&input).trim()) {
                    Ok(bytes) => ok(lua.create_string(bytes)?),
                    Err(e) => fail(format!("invalid base64: {}", e)),
                };
            Ok(result)
        })?,
    )?;

    Ok(table)
}
