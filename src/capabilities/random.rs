//! `random` module

use chrono::Utc;
use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

use super::{fail, lua_number, ok, Fallible};

/// Uniform integer in `[min, max]`
pub fn int_between(min: i64, max: i64) -> Result<i64, String> {
    if min > max {
        return Err(format!("min ({}) must not be greater than max ({})", min, max));
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

pub fn alphanumeric(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

/// Time-ordered identifier: 12 hex digits of unix millis, then 8 random characters
pub fn sortable_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0);
    format!("{:012x}{}", millis, alphanumeric(8).to_lowercase())
}

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    table.set(
        "int",
        lua.create_function(|_, (min, max): (LuaValue, LuaValue)| {
            let result: Fallible<i64> =
                match int_between(lua_number(&min) as i64, lua_number(&max) as i64) {
                    Ok(n) => ok(n),
                    Err(e) => fail(e),
                };
            Ok(result)
        })?,
    )?;

    table.set(
        "float",
        lua.create_function(|_, ()| Ok(rand::thread_rng().gen::<f64>()))?,
    )?;

    table.set(
        "string",
        lua.create_function(|_, len: LuaValue| {
            let len = lua_number(&len).max(0.0) as usize;
            Ok(alphanumeric(len.min(1 << 20)))
        })?,
    )?;

    table.set("id", lua.create_function(|_, ()| Ok(sortable_id()))?)?;

    Ok(table)
}
