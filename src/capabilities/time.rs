//! `time` module
//!
//! Layouts are strftime patterns (`%Y-%m-%d %H:%M:%S`). An empty layout
//! means RFC 3339. All timestamps are unix seconds in UTC.

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};

use super::{cancelled_error, fail, lua_number, lua_string, ok, Fallible, ModuleEnv};

/// Format unix seconds with a strftime layout
pub fn format_timestamp(ts: i64, layout: &str) -> Result<String, String> {
    let dt = DateTime::<Utc>::from_timestamp(ts, 0)
        .ok_or_else(|| format!("timestamp out of range: {}", ts))?;

    if layout.is_empty() {
        return Ok(dt.to_rfc3339());
    }

    let mut out = String::new();
    write!(out, "{}", dt.format(layout)).map_err(|_| format!("invalid layout: {}", layout))?;
    Ok(out)
}

/// Parse a time string into unix seconds
///
/// Layouts with an offset are honoured; layouts without one are read as UTC,
/// and date-only layouts as midnight UTC.
pub fn parse_timestamp(input: &str, layout: &str) -> Result<i64, String> {
    if layout.is_empty() {
        return DateTime::parse_from_rfc3339(input)
            .map(|dt| dt.timestamp())
            .map_err(|e| format!("failed to parse time {:?}: {}", input, e));
    }

    if let Ok(dt) = DateTime::parse_from_str(input, layout) {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, layout) {
        return Ok(naive.and_utc().timestamp());
    }
    match NaiveDate::parse_from_str(input, layout) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp())
            .ok_or_else(|| format!("failed to parse time {:?}", input)),
        Err(e) => Err(format!(
            "failed to parse time {:?} with layout {:?}: {}",
            input, layout, e
        )),
    }
}

pub fn module(lua: &Lua, env: &ModuleEnv) -> LuaResult<Table> {
    let table = lua.create_table()?;

    table.set(
        "now",
        lua.create_function(|_, ()| Ok(Utc::now().timestamp()))?,
    )?;

    table.set(
        "format",
        lua.create_function(|_, (ts, layout): (LuaValue, LuaValue)| {
            let result: Fallible<String> =
                match format_timestamp(lua_number(&ts) as i64, &lua_string(&layout)) {
                    Ok(s) => ok(s),
                    Err(e) => fail(e),
                };
            Ok(result)
        })?,
    )?;

    table.set(
        "parse",
        lua.create_function(|_, (input, layout): (LuaValue, LuaValue)| {
            let result: Fallible<i64> =
                match parse_timestamp(&lua_string(&input), &lua_string(&layout)) {
                    Ok(ts) => ok(ts),
                    Err(e) => fail(e),
                };
            Ok(result)
        })?,
    )?;

    let cancel = env.cancel.clone();
    table.set(
        "sleep",
        lua.create_async_function(move |_, ms: LuaValue| {
            let cancel = cancel.clone();
            async move {
                let ms = lua_number(&ms);
                if ms > 0.0 {
                    cancel
                        .sleep(Duration::from_millis(ms as u64))
                        .await
                        .map_err(cancelled_error)?;
                }
                Ok(())
            }
        })?,
    )?;

    Ok(table)
}
