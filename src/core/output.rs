//! Output helpers for CLI surfaces.
//!
//! Machine-facing commands print one JSON command envelope on stdout.

use crate::core::error::LedgerError;
use crate::core::time;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Wrap `payload` under `key` in an `ok` envelope.
pub fn ok_envelope<T: Serialize>(cmd: &str, key: &str, payload: &T) -> Result<JsonValue, LedgerError> {
    let mut extra = serde_json::Map::new();
    extra.insert(key.to_string(), serde_json::to_value(payload)?);
    Ok(time::command_envelope(cmd, "ok", JsonValue::Object(extra)))
}

pub fn print_json(value: &JsonValue) -> Result<(), LedgerError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an `ok` envelope carrying `payload` under `key`.
pub fn emit<T: Serialize>(cmd: &str, key: &str, payload: &T) -> Result<(), LedgerError> {
    print_json(&ok_envelope(cmd, key, payload)?)
}

/// Parse a JSON command-line argument.
pub fn parse_json_arg(field: &str, raw: &str) -> Result<JsonValue, LedgerError> {
    serde_json::from_str(raw)
        .map_err(|e| LedgerError::ValidationError(format!("--{} is not valid JSON: {}", field, e)))
}
