//! `strings` module

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::lua_string;

/// Split on `sep`; an empty separator splits into characters
pub fn split(input: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return input.chars().map(String::from).collect();
    }
    input.split(sep).map(String::from).collect()
}

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let unary: [(&str, fn(&str) -> String); 3] = [
        ("trim", |s: &str| s.trim().to_string()),
        ("toLower", |s: &str| s.to_lowercase()),
        ("toUpper", |s: &str| s.to_uppercase()),
    ];
    for (name, f) in unary {
        table.set(
            name,
            lua.create_function(move |_, s: LuaValue| Ok(f(&lua_string(&s))))?,
        )?;
    }

    let predicates: [(&str, fn(&str, &str) -> bool); 3] = [
        ("contains", |s: &str, sub: &str| s.contains(sub)),
        ("hasPrefix", |s: &str, prefix: &str| s.starts_with(prefix)),
        ("hasSuffix", |s: &str, suffix: &str| s.ends_with(suffix)),
    ];
    for (name, f) in predicates {
        table.set(
            name,
            lua.create_function(move |_, (s, arg): (LuaValue, LuaValue)| {
                Ok(f(&lua_string(&s), &lua_string(&arg)))
            })?,
        )?;
    }

    table.set(
        "split",
        lua.create_function(|lua, (s, sep): (LuaValue, LuaValue)| {
            lua.create_sequence_from(split(&lua_string(&s), &lua_string(&sep)))
        })?,
    )?;

    table.set(
        "join",
        lua.create_function(|_, (items, sep): (LuaValue, LuaValue)| {
            let parts: Vec<String> = match items {
                LuaValue::Table(t) => t
                    .sequence_values::<LuaValue>()
                    .filter_map(Result::ok)
                    .map(|v| lua_string(&v))
                    .collect(),
                _ => Vec::new(),
            };
            Ok(parts.join(&lua_string(&sep)))
        })?,
    )?;

    table.set(
        "replace",
        lua.create_function(|_, (s, old, new): (LuaValue, LuaValue, LuaValue)| {
            let (s, old) = (lua_string(&s), lua_string(&old));
            if old.is_empty() {
                return Ok(s);
            }
            Ok(s.replace(&old, &lua_string(&new)))
        })?,
    )?;

    Ok(table)
}
