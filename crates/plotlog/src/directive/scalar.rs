//! Loose scalar coercions shared by the grammars and the applier.
//!
//! Directive text reaches the engine as strings; these helpers apply the
//! permissive number/boolean reading the grammars rely on.

use serde_json::Value;

/// Renders a value the way loose string conversion does: arrays join their
/// elements with commas, objects collapse to a placeholder, null spells
/// itself out.
pub fn loose_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                other => loose_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Loose numeric reading of a string: blank is zero, anything that is not a
/// plain decimal number is `None`.
pub fn loose_number_str(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    if !t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    t.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Loose numeric reading of any value (via its loose string form).
pub fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => loose_number_str(&loose_string(value)),
    }
}

/// Reads a bump delta: leading `+` is stripped, non-numeric input is `None`.
pub fn bump_delta(value: &Value) -> Option<f64> {
    let s = loose_string(value);
    let s = s.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    loose_number_str(s).filter(|n| n.is_finite())
}

/// Builds a JSON number, preferring integer representation when exact.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::Number(serde_json::Number::from(n as i64))
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn is_int_literal(s: &str) -> bool {
    let t = s.strip_prefix('-').unwrap_or(s);
    !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit())
}

fn is_float_literal(s: &str) -> bool {
    let t = s.strip_prefix('-').unwrap_or(s);
    match t.split_once('.') {
        Some((a, b)) => {
            !a.is_empty()
                && !b.is_empty()
                && a.bytes().all(|c| c.is_ascii_digit())
                && b.bytes().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Interprets a scalar string for a `set` payload: booleans, null, numbers
/// and embedded JSON structures become typed values; everything else stays a
/// string.
pub fn coerce_scalar_str(s: &str) -> Value {
    let t = s.trim();
    match t {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if is_int_literal(t) {
        if let Ok(i) = t.parse::<i64>() {
            return Value::Number(serde_json::Number::from(i));
        }
    }
    if is_float_literal(t) {
        if let Ok(f) = t.parse::<f64>() {
            if f.is_finite() {
                return number_value(f);
            }
        }
    }
    if t.starts_with('{') || t.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Value>(t) {
            return v;
        }
    }
    Value::String(s.to_string())
}

/// Prepares a parsed payload for a `set`: strings are coerced, array elements
/// recursively so, structured values pass through.
pub fn parse_value_for_set(value: &Value) -> Value {
    match value {
        Value::String(s) => coerce_scalar_str(s),
        Value::Array(items) => Value::Array(items.iter().map(parse_value_for_set).collect()),
        other => other.clone(),
    }
}

/// Renders a value for scalar string storage (strings stay bare, null is
/// empty).
pub fn scalar_store_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => loose_string(other),
    }
}
