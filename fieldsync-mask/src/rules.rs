//! Single-value masking transforms.
//!
//! | Rule              | Input            | Output                          |
//! |-------------------|------------------|---------------------------------|
//! | `category_prefix` | string           | text before the separator       |
//! | `year_only`       | date string/year | four-digit year as a string     |
//! | `keep_keys`       | object           | object with the named keys only |
//! | `redact`          | anything         | `"[redacted]"`                  |
//!
//! Every rule maps `null` to `null`, and every rule is idempotent: masking an
//! already-masked value returns it unchanged.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use fieldsync_core::MaskRule;

use crate::error::MaskError;

/// Replacement for redacted values.
pub const REDACTED: &str = "[redacted]";

/// Apply `rule` to `value`.
pub fn apply_rule(rule: &MaskRule, value: &Value) -> Result<Value, MaskError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match rule {
        MaskRule::CategoryPrefix { separator } => category_prefix(value, separator),
        MaskRule::YearOnly => year_only(value),
        MaskRule::KeepKeys { keys } => keep_keys(value, keys),
        MaskRule::Redact => Ok(Value::String(REDACTED.to_string())),
    }
}

fn category_prefix(value: &Value, separator: &str) -> Result<Value, MaskError> {
    let Value::String(text) = value else {
        return Err(mismatch("category_prefix", "a string", value));
    };
    let prefix = if separator.is_empty() {
        text.as_str()
    } else {
        text.split(separator).next().unwrap_or_default()
    };
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(MaskError::EmptyCategory);
    }
    Ok(Value::String(prefix.to_string()))
}

fn year_only(value: &Value) -> Result<Value, MaskError> {
    let year = match value {
        Value::String(text) => parse_year(text.trim()).ok_or(MaskError::InvalidDate)?,
        Value::Number(n) => n
            .as_i64()
            .filter(|y| (0..=9999).contains(y))
            .ok_or(MaskError::InvalidDate)? as i32,
        other => return Err(mismatch("year_only", "a date string", other)),
    };
    Ok(Value::String(format!("{year:04}")))
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.year());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.year());
    }
    ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|d| d.year())
}

fn keep_keys(value: &Value, keys: &[String]) -> Result<Value, MaskError> {
    let Value::Object(object) = value else {
        return Err(mismatch("keep_keys", "an object", value));
    };
    let kept: Map<String, Value> = object
        .iter()
        .filter(|(k, _)| keys.iter().any(|keep| keep == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(Value::Object(kept))
}

fn mismatch(rule: &'static str, expected: &'static str, found: &Value) -> MaskError {
    MaskError::TypeMismatch {
        rule,
        expected,
        found: kind_of(found),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
