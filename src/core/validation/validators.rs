//! Reusable field validators
//!
//! Used by [`BasicSchema`](super::BasicSchema) to check individual properties

use serde_json::Value;

/// Validator: field is required (present and not null)
pub fn required() -> impl Fn(&str, Option<&Value>) -> Result<(), String> + Send + Sync + Clone {
    |field: &str, value: Option<&Value>| match value {
        None | Some(Value::Null) => Err(format!("'{}' is required", field)),
        Some(_) => Ok(()),
    }
}

/// Validator: value matches a JSON-Schema primitive type name
pub fn json_type(
    expected: String,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        let ok = match expected.as_str() {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "object" => value.is_object(),
            "array" => value.is_array(),
            "null" => value.is_null(),
            // unknown type keywords are not enforced
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' must be of type {}", field, expected))
        }
    }
}

/// Validator: value must be in allowed list
pub fn in_list(
    allowed: Vec<Value>,
) -> impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + Clone {
    move |field: &str, value: &Value| {
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(format!(
                "'{}' must be one of {} (got {})",
                field,
                Value::Array(allowed.clone()),
                value
            ))
        }
    }
}
