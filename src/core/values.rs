//! Value helpers for stored documents

use crate::core::Document;
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;

/// Replace extended-JSON wrappers with plain strings
///
/// Stores may hand back identifiers as `{"$oid": "..."}` and dates as
/// `{"$date": ...}`. Schemas validate those fields as strings, so a stored
/// document is flattened before it is re-validated during an update.
pub fn stringify_values(doc: &Document) -> Document {
    doc.iter()
        .map(|(k, v)| (k.clone(), stringify_value(v)))
        .collect()
}

fn stringify_value(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            if let Some(oid) = map.get("$oid").and_then(Value::as_str) {
                return Value::String(oid.to_string());
            }
            if let Some(date) = map.get("$date") {
                if let Some(s) = date_to_string(date) {
                    return Value::String(s);
                }
            }
            Value::Object(stringify_values(map))
        }
        Value::Object(map) => Value::Object(stringify_values(map)),
        Value::Array(items) => Value::Array(items.iter().map(stringify_value).collect()),
        other => other.clone(),
    }
}

fn date_to_string(date: &Value) -> Option<String> {
    match date {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        // canonical form: {"$date": {"$numberLong": "..."}}
        Value::Object(inner) => inner
            .get("$numberLong")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}
