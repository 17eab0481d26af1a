//! `crypto` module: digests, HMACs and UUIDs, all hex encoded

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use mlua::{Lua, Result as LuaResult, Table, Value as LuaValue};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

use super::lua_bytes;

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

pub fn sha1_hex(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn sha512_hex(data: &[u8]) -> String {
    format!("{:x}", Sha512::digest(data))
}

/// HMAC over `message` with `key`; any key length is accepted
fn hmac_hex<M: Mac + KeyInit>(message: &[u8], key: &[u8]) -> String {
    match <M as KeyInit>::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(message);
            to_hex(&mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn hmac_sha1_hex(message: &[u8], key: &[u8]) -> String {
    hmac_hex::<Hmac<Sha1>>(message, key)
}

pub fn hmac_sha256_hex(message: &[u8], key: &[u8]) -> String {
    hmac_hex::<Hmac<Sha256>>(message, key)
}

pub fn hmac_sha512_hex(message: &[u8], key: &[u8]) -> String {
    hmac_hex::<Hmac<Sha512>>(message, key)
}

pub fn module(lua: &Lua) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let digests: [(&str, fn(&[u8]) -> String); 4] = [
        ("md5", md5_hex),
        ("sha1", sha1_hex),
        ("sha256", sha256_hex),
        ("sha512", sha512_hex),
    ];
    for (name, digest) in digests {
        table.set(
            name,
            lua.create_function(move |_, data: LuaValue| Ok(digest(&lua_bytes(&data))))?,
        )?;
    }

    let macs: [(&str, fn(&[u8], &[u8]) -> String); 3] = [
        ("hmac_sha1", hmac_sha1_hex),
        ("hmac_sha256", hmac_sha256_hex),
        ("hmac_sha512", hmac_sha512_hex),
    ];
    for (name, mac) in macs {
        table.set(
            name,
            lua.create_function(move |_, (message, key): (LuaValue, LuaValue)| {
                Ok(mac(&lua_bytes(&message), &lua_bytes(&key)))
            })?,
        )?;
    }

    table.set(
        "uuid",
        lua.create_function(|_, ()| Ok(Uuid::new_v4().to_string()))?,
    )?;

    Ok(table)
}
