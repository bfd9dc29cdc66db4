//! Query matching, sorting and update application for in-memory documents
//!
//! Supports the operator subset produced by the query engine:
//! `$and $or $nor $eq $ne $gt $gte $lt $lte $in $nin $exists $regex`
//! for filters, and `$set $unset $inc $push` for updates.
//!
//! Malformed client input surfaces as a [`QueryError`] wrapped in the
//! returned `anyhow::Error`, so callers can tell it apart from store faults.

use crate::core::{Document, Query};
use anyhow::{Result, bail};
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

/// A filter, sort or update document the store cannot interpret
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("{op} expects {expected}")]
    Malformed { op: String, expected: &'static str },

    #[error("Invalid $regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Field '_id' is immutable")]
    ImmutableId,
}

fn malformed(op: &str, expected: &'static str) -> anyhow::Error {
    QueryError::Malformed {
        op: op.to_string(),
        expected,
    }
    .into()
}

/// Check whether a document matches a query
pub fn matches(doc: &Document, query: &Query) -> Result<bool> {
    for (key, condition) in query {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_queries(key, condition)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_queries(key, condition)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_queries(key, condition)? {
                    if matches(doc, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            k if k.starts_with('$') => bail!(QueryError::UnknownOperator(k.to_string())),
            field => matches_field(get_path(doc, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_queries<'a>(op: &str, condition: &'a Value) -> Result<Vec<&'a Query>> {
    condition
        .as_array()
        .ok_or_else(|| malformed(op, "an array"))?
        .iter()
        .map(|v| v.as_object().ok_or_else(|| malformed(op, "an array of objects")))
        .collect()
}

fn is_operator_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
}

fn matches_field(actual: Option<&Value>, condition: &Value) -> Result<bool> {
    let Some(ops) = condition.as_object().filter(|_| is_operator_object(condition)) else {
        return Ok(equals(actual, condition));
    };

    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compare(actual, operand).is_some_and(Ordering::is_gt),
            "$gte" => compare(actual, operand).is_some_and(Ordering::is_ge),
            "$lt" => compare(actual, operand).is_some_and(Ordering::is_lt),
            "$lte" => compare(actual, operand).is_some_and(Ordering::is_le),
            "$in" => operand
                .as_array()
                .ok_or_else(|| malformed("$in", "an array"))?
                .iter()
                .any(|v| equals(actual, v)),
            "$nin" => !operand
                .as_array()
                .ok_or_else(|| malformed("$nin", "an array"))?
                .iter()
                .any(|v| equals(actual, v)),
            "$exists" => actual.is_some() == truthy(operand),
            "$regex" => {
                let flags = ops.get("$options").and_then(Value::as_str).unwrap_or("");
                regex_matches(actual, operand, flags)?
            }
            "$options" => true,
            other => bail!(QueryError::UnknownOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with array-membership semantics
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    }
}

/// Compare two JSON values for ordering; mixed types don't compare
fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn regex_matches(actual: Option<&Value>, pattern: &Value, flags: &str) -> Result<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| malformed("$regex", "a string"))?;
    let re = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(QueryError::from)?;
    Ok(match actual {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).any(|s| re.is_match(s)),
        _ => false,
    })
}

/// Resolve a dotted path such as `meta.author`
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Apply an update document (`$set`, `$unset`, `$inc`, `$push`)
pub fn apply_update(doc: &Document, update: &Document) -> Result<Document> {
    let mut out = doc.clone();
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| malformed(op, "an object"))?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    if path == "_id" {
                        if doc.get("_id") != Some(value) {
                            bail!(QueryError::ImmutableId);
                        }
                        continue;
                    }
                    set_path(&mut out, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    if path == "_id" {
                        bail!(QueryError::ImmutableId);
                    }
                    remove_path(&mut out, path);
                }
            }
            "$inc" => {
                for (path, by) in fields {
                    let current = get_path(&out, path).cloned().unwrap_or(Value::from(0));
                    let next = match (current.as_i64(), by.as_i64()) {
                        (Some(a), Some(b)) => Value::from(a + b),
                        _ => {
                            let a = current
                                .as_f64()
                                .ok_or_else(|| malformed("$inc", "a numeric field"))?;
                            let b = by
                                .as_f64()
                                .ok_or_else(|| malformed("$inc", "a numeric value"))?;
                            Value::from(a + b)
                        }
                    };
                    set_path(&mut out, path, next);
                }
            }
            "$push" => {
                for (path, value) in fields {
                    let mut items = match get_path(&out, path) {
                        Some(Value::Array(items)) => items.clone(),
                        None => Vec::new(),
                        Some(_) => return Err(malformed("$push", "an array field")),
                    };
                    items.push(value.clone());
                    set_path(&mut out, path, Value::Array(items));
                }
            }
            other => bail!(QueryError::UnknownOperator(other.to_string())),
        }
    }
    Ok(out)
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| compare(a, b.unwrap_or(&Value::Null)).unwrap_or(Ordering::Equal))
}

/// Sort documents by a `{field: 1 | -1}` specification
pub fn sort_documents(docs: &mut [Document], sort: &Value) -> Result<()> {
    let spec = sort
        .as_object()
        .ok_or_else(|| malformed("sort", "an object"))?
        .iter()
        .map(|(field, dir)| {
            let descending = match dir {
                Value::Number(n) => n.as_i64() == Some(-1),
                Value::String(s) => matches!(s.as_str(), "desc" | "descending"),
                _ => false,
            };
            (field.clone(), descending)
        })
        .collect::<Vec<_>>();

    docs.sort_by(|a, b| {
        spec.iter().fold(Ordering::Equal, |acc, (field, descending)| {
            acc.then_with(|| {
                let ord = sort_cmp(get_path(a, field), get_path(b, field));
                if *descending { ord.reverse() } else { ord }
            })
        })
    });
    Ok(())
}
