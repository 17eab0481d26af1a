//! # Sensitive Data Masking
//!
//! Applied only on the way to persistence: the guest always sees the
//! original event, while the stored execution gets a redacted copy of the
//! event and of every log message.
//!
//! Masking is total and idempotent. Structure is preserved; only values
//! are replaced with [`REDACTED`].

mod patterns;

pub use patterns::{is_sensitive_field, redact_text};

use serde_json::Value;

use crate::functions::LogEntry;

/// Replacement for every redacted value
pub const REDACTED: &str = "[REDACTED]";

/// Return a masked copy of a JSON value
pub fn mask_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let masked = if is_sensitive_field(key) && !v.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        mask_json(v)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_json).collect()),
        Value::String(s) => Value::String(mask_text(s)),
        other => other.clone(),
    }
}

/// Mask free text
///
/// Text holding a JSON object or array is masked structurally and only
/// re-serialized when something was redacted, so unchanged documents keep
/// their original formatting.
pub fn mask_text(text: &str) -> String {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            let masked = mask_json(&parsed);
            if masked == parsed {
                return text.to_string();
            }
            return serde_json::to_string(&masked).unwrap_or_else(|_| REDACTED.to_string());
        }
    }
    redact_text(text)
}

/// Mask every message of a captured log stream
pub fn mask_logs(logs: Vec<LogEntry>) -> Vec<LogEntry> {
    logs.into_iter()
        .map(|mut entry| {
            entry.message = mask_text(&entry.message);
            entry
        })
        .collect()
}
