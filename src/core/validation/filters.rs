//! Reusable field filters
//!
//! These filters coerce incoming values before validation. Query strings only
//! carry text, so `?count=5` must become a number before it can match a
//! numeric property.

use anyhow::{Result, anyhow};
use serde_json::{Number, Value};

/// Filter: coerce a string into the JSON type named by the schema
pub fn coerce_to(expected: String) -> impl Fn(&str, Value) -> Result<Value> + Send + Sync + Clone {
    move |field: &str, value: Value| {
        let Some(s) = value.as_str() else {
            return Ok(value);
        };
        match expected.as_str() {
            "integer" => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| anyhow!("'{}' must be of type integer", field)),
            "number" => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| anyhow!("'{}' must be of type number", field)),
            "boolean" => match s {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(anyhow!("'{}' must be of type boolean", field)),
            },
            _ => Ok(value),
        }
    }
}
