//! `url` module: parsing and form-style escaping

use std::collections::BTreeMap;

use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use url::{form_urlencoded, ParseError, Url};

use super::{fail, lua_string, ok, Fallible};

/// Base used to resolve relative references; never reported to the guest
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Components of a parsed URL; relative references have empty scheme and host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    /// Host with `:port` when an explicit non-default port is given
    pub host: String,
    pub path: String,
    pub fragment: String,
    /// Values per key in order of appearance
    pub query: BTreeMap<String, Vec<String>>,
    pub username: Option<String>,
    pub password: Option<String>,
}

pub fn parse_url(input: &str) -> Result<ParsedUrl, String> {
    let parse_error = |e: ParseError| format!("parse {:?}: {}", input, e);

    let (parsed, relative) = match Url::parse(input) {
        Ok(url) => (url, false),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(RELATIVE_BASE).map_err(parse_error)?;
            (base.join(input).map_err(parse_error)?, true)
        }
        Err(e) => return Err(parse_error(e)),
    };

    let host = match (parsed.host_str(), parsed.port()) {
        // Scheme-relative references ("//cdn/x") still name a host
        _ if relative && !input.starts_with("//") => String::new(),
        (Some(h), Some(port)) => format!("{}:{}", h, port),
        (Some(h), None) => h.to_string(),
        (None, _) => String::new(),
    };

    // Joining always yields an absolute path; keep a bare relative one as written
    let path = if relative && !input.starts_with('/') {
        input
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        parsed.path().to_string()
    };

    let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in parsed.query_pairs() {
        query
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    let username = match parsed.username() {
        "" => None,
        name => Some(unescape(name, false)?),
    };
    let password = parsed.password().map(|p| unescape(p, false)).transpose()?;

    Ok(ParsedUrl {
        scheme: if relative {
            String::new()
        } else {
            parsed.scheme().to_string()
        },
        host,
        path: unescape(&path, false)?,
        fragment: parsed
            .fragment()
            .map(|f| unescape(f, false))
            .transpose()?
            .unwrap_or_default(),
        query,
        username,
        password,
    })
}

/// Query-component escaping; spaces become `+`
pub fn encode(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes()).collect()
}

/// Reverse of [`encode`]; malformed `%` escapes are an error
pub fn decode(input: &str) -> Result<String, String> {
    unescape(input, true)
}

fn unescape(input: &str, plus_as_space: bool) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        let end = (i + 3).min(bytes.len());
                        return Err(format!(
                            "invalid URL escape {:?}",
                            String::from_utf8_lossy(&bytes[i..end])
                        ));
                    }
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn to_table(lua: &Lua, parsed: ParsedUrl) -> LuaResult<Table> {
    let table = lua.create_table()?;
    table.set("scheme", parsed.scheme)?;
    table.set("host", parsed.host)?;
    table.set("path", parsed.path)?;
    table.set("fragment", parsed.fragment)?;

    let query = lua.create_table()?;
    for (key, mut values) in parsed.query {
        if values.len() == 1 {
            query.set(key, values.remove(0))?;
        } else {
            query.set(key, lua.create_sequence_from(values)?)?;
        }
    }
    table.set("query", query)?;

    if let Some(username) = parsed.username {
        table.set("username", username)?;
    }
    if let Some(password) = parsed.password {
        table.set("password", password)?;
    }
    Ok(table)
}

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    table.set(
        "parse",
        lua.create_function(|lua, input: LuaValue| {
            let result: Fallible<Table> = match parse_url(&lua_string(&input)) {
                Ok(parsed) => ok(to_table(lua, parsed)?),
                Err(e) => fail(e),
            };
            Ok(result)
        })?,
    )?;

    table.set(
        "encode",
        lua.create_function(|_, input: LuaValue| Ok(encode(&lua_string(&input))))?,
    )?;

    table.set(
        "decode",
        lua.create_function(|_, input: LuaValue| {
            let result: Fallible<String> = match decode(&lua_string(&input)) {
                Ok(s) => ok(s),
                Err(e) => fail(e),
            };
            Ok(result)
        })?,
    )?;

    Ok(table)
}
