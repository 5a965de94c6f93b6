//! Loose value coercions shared by field comparisons.

use serde_json::Value;

/// True when a field counts as unset: null or the empty string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// String form used for equality checks. Booleans render as `"true"` / `"false"`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Numeric form used for ordering checks.
///
/// Null and blank strings read as zero; other non-numeric values yield `None`.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Compare a field value against an expected textual value.
///
/// Numbers compare numerically so that `"50"` matches `50.0`; everything else
/// compares by its string form.
pub fn loosely_equals(actual: &Value, expected: &str) -> bool {
    if let Value::Number(n) = actual {
        if let (Some(a), Ok(e)) = (n.as_f64(), expected.trim().parse::<f64>()) {
            return a == e;
        }
    }
    as_text(actual).is_some_and(|text| text == expected)
}
