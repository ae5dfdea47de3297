//! Shared timestamp/event helpers for deterministic envelopes.
//!
//! The ledger stores every timestamp as INTEGER unix-epoch seconds. Library
//! entry points take "now" as an argument; only the CLI reads the wall clock.

use serde_json::Value as JsonValue;
use ulid::Ulid;

pub const DAY_SECS: i64 = 24 * 60 * 60;

/// Current unix-epoch seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    epoch_z(now_secs())
}

pub fn epoch_z(secs: i64) -> String {
    format!("{}Z", secs)
}

pub fn parse_epoch_z(ts: &str) -> Option<i64> {
    ts.trim_end_matches('Z').parse::<i64>().ok()
}

/// The instant `days` whole days before `now`.
pub fn days_before(now: i64, days: i64) -> i64 {
    now.saturating_sub(days.saturating_mul(DAY_SECS))
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}
