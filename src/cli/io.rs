//! JSON I/O handling for CLI
//!
//! - Input: one JSON document on stdin (the invocation event)
//! - Output: one JSON object per line on stdout
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::errors::{CliError, CliResult};

/// Read the invocation event from stdin
pub fn read_event() -> CliResult<Value> {
    read_event_from(io::stdin().lock())
}

/// Parse an event document; blank input is an empty object
pub fn read_event_from<R: Read>(mut reader: R) -> CliResult<Value> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;

    if input.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_str(&input)?)
}

/// Write a success response to stdout
pub fn write_response<T: Serialize>(data: &T) -> CliResult<()> {
    write_response_to(&mut io::stdout().lock(), data)
}

pub fn write_response_to<W: Write, T: Serialize>(out: &mut W, data: &T) -> CliResult<()> {
    let response = json!({
        "status": "ok",
        "data": data,
    });
    write_line(out, &response)
}

/// Write an error response to stdout
pub fn write_error(error: &CliError) -> CliResult<()> {
    write_error_to(&mut io::stdout().lock(), error)
}

pub fn write_error_to<W: Write>(out: &mut W, error: &CliError) -> CliResult<()> {
    let response = json!({
        "status": "error",
        "code": error.code_str(),
        "message": error.message(),
    });
    write_line(out, &response)
}

fn write_line<W: Write>(out: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
