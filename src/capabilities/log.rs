//! `log` module: guest log lines captured into the execution record

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{lua_string, ModuleEnv};
use crate::functions::marshal::lua_to_json;
use crate::functions::LogLevel;

/// Text of a logged value; tables are rendered as JSON
fn message(value: &LuaValue) -> String {
    match value {
        LuaValue::Table(_) => lua_to_json(value).to_string(),
        LuaValue::Nil => "nil".to_string(),
        other => lua_string(other),
    }
}

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    let table = lua.create_table()?;

    for (name, level) in [
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ] {
        let sink = env.logs.clone();
        table.set(
            name,
            lua.create_function(move |_, value: LuaValue| {
                sink.push(level, message(&value));
                Ok(())
            })?,
        )?;
    }

    Ok(table)
}
