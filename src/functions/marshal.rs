//! # Value Marshaling
//!
//! Conversion between host JSON values and Lua values.
//!
//! - Tables with exactly the keys `1..n` leave Lua as arrays, the empty
//!   table as `[]`, everything else as an object with integer keys
//!   rendered as strings.
//! - Host numbers enter Lua as floats. Lua floats without a fractional part
//!   leave as JSON integers; NaN and infinities leave as `null`.
//! - `null` enters Lua as `nil`. Functions, userdata and threads leave as
//!   `null`.
//! - Nesting is capped at [`MAX_DEPTH`]; anything deeper becomes `null`/`nil`,
//!   which also stops cyclic tables.

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use serde_json::{Map, Number, Value as JsonValue};

/// Deepest nesting level converted in either direction
pub const MAX_DEPTH: usize = 64;

/// Convert a host value into a Lua value
pub fn json_to_lua(lua: &Lua, value: &JsonValue) -> LuaResult<LuaValue> {
    json_to_lua_at(lua, value, 0)
}

fn json_to_lua_at(lua: &Lua, value: &JsonValue, depth: usize) -> LuaResult<LuaValue> {
    if depth > MAX_DEPTH {
        return Ok(LuaValue::Nil);
    }

    Ok(match value {
        JsonValue::Null => LuaValue::Nil,
        JsonValue::Bool(b) => LuaValue::Boolean(*b),
        JsonValue::Number(n) => LuaValue::Number(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => LuaValue::String(lua.create_string(s)?),
        JsonValue::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua_at(lua, item, depth + 1)?)?;
            }
            LuaValue::Table(table)
        }
        JsonValue::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua_at(lua, item, depth + 1)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Convert a Lua value into a host value; never fails
pub fn lua_to_json(value: &LuaValue) -> JsonValue {
    lua_to_json_at(value, 0)
}

fn lua_to_json_at(value: &LuaValue, depth: usize) -> JsonValue {
    if depth > MAX_DEPTH {
        return JsonValue::Null;
    }

    match value {
        LuaValue::Nil => JsonValue::Null,
        LuaValue::Boolean(b) => JsonValue::Bool(*b),
        LuaValue::Integer(i) => JsonValue::from(*i),
        LuaValue::Number(n) => number_to_json(*n),
        LuaValue::String(s) => JsonValue::String(s.to_string_lossy().to_string()),
        LuaValue::Table(t) => table_to_json(t, depth),
        _ => JsonValue::Null,
    }
}

fn number_to_json(n: f64) -> JsonValue {
    if !n.is_finite() {
        return JsonValue::Null;
    }
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        return JsonValue::from(n as i64);
    }
    Number::from_f64(n)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Integer key of a sequence slot, accepting integral floats
fn sequence_index(key: &LuaValue) -> Option<i64> {
    match key {
        LuaValue::Integer(i) => Some(*i),
        LuaValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
        _ => None,
    }
}

fn key_to_string(key: &LuaValue) -> Option<String> {
    match key {
        LuaValue::String(s) => Some(s.to_string_lossy().to_string()),
        LuaValue::Integer(i) => Some(i.to_string()),
        LuaValue::Number(n) => Some(match number_to_json(*n) {
            JsonValue::Number(num) => num.to_string(),
            _ => n.to_string(),
        }),
        LuaValue::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn table_to_json(table: &Table, depth: usize) -> JsonValue {
    let entries: Vec<(LuaValue, LuaValue)> = table
        .clone()
        .pairs::<LuaValue, LuaValue>()
        .filter_map(Result::ok)
        .collect();

    if entries.is_empty() {
        return JsonValue::Array(Vec::new());
    }

    let len = entries.len() as i64;
    let is_sequence = entries
        .iter()
        .all(|(k, _)| matches!(sequence_index(k), Some(i) if i >= 1 && i <= len));

    if is_sequence {
        let mut items = vec![JsonValue::Null; entries.len()];
        for (key, value) in &entries {
            if let Some(i) = sequence_index(key) {
                items[(i - 1) as usize] = lua_to_json_at(value, depth + 1);
            }
        }
        return JsonValue::Array(items);
    }

    let mut map = Map::new();
    for (key, value) in &entries {
        if let Some(name) = key_to_string(key) {
            map.insert(name, lua_to_json_at(value, depth + 1));
        }
    }
    JsonValue::Object(map)
}
