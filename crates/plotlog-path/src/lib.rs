//! Dotted+bracketed path utilities.
//!
//! Paths address values inside nested JSON containers using dot notation with
//! optional bracket indices, e.g. `root.a.b[2].c`. The canonical form uses
//! dots only (`root.a.b.2.c`); all-digit segments address array elements.
//!
//! # Example
//!
//! ```
//! use plotlog_path::{normalize_path, set_deep, get_deep};
//! use serde_json::json;
//!
//! assert_eq!(normalize_path("a[0].b[12]"), "a.0.b.12");
//!
//! let mut doc = json!({});
//! assert!(set_deep(&mut doc, "stats.hp", json!(10)));
//! assert_eq!(get_deep(&doc, "stats.hp"), Some(&json!(10)));
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

pub mod types;
pub use types::{Path, Segment, Slot};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("EMPTY_PATH")]
    EmptyPath,
    #[error("TYPE_CONFLICT")]
    TypeConflict,
}

/// Canonicalizes bracket index notation to dot notation.
///
/// Only all-digit brackets are rewritten; anything else is left untouched.
/// The function is idempotent.
///
/// # Example
///
/// ```
/// use plotlog_path::normalize_path;
///
/// assert_eq!(normalize_path("a[0].b[12]"), "a.0.b.12");
/// assert_eq!(normalize_path("a.0.b.12"), "a.0.b.12");
/// assert_eq!(normalize_path("a[x]"), "a[x]");
/// ```
pub fn normalize_path(path: &str) -> String {
    let src = path.trim();
    if !src.contains('[') {
        return src.to_string();
    }
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let digits = tail[1..].bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 && tail.as_bytes().get(1 + digits) == Some(&b']') {
            out.push('.');
            out.push_str(&tail[1..1 + digits]);
            rest = &tail[digits + 2..];
        } else {
            out.push('[');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Returns true if the string is a non-empty run of ASCII digits.
pub fn is_index_str(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Splits a path into segments, normalizing brackets first.
///
/// Empty components are dropped; all-digit components become
/// [`Segment::Index`].
///
/// # Example
///
/// ```
/// use plotlog_path::{split_segments, Segment};
///
/// assert_eq!(
///     split_segments("a[0].b"),
///     vec![
///         Segment::Key("a".to_string()),
///         Segment::Index(0),
///         Segment::Key("b".to_string()),
///     ]
/// );
/// ```
pub fn split_segments(path: &str) -> Path {
    normalize_path(path)
        .split('.')
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(i) if is_index_str(s) => Segment::Index(i),
            _ => Segment::Key(s.to_string()),
        })
        .collect()
}

/// Splits a path into its root variable name and the remaining sub-path.
///
/// # Example
///
/// ```
/// use plotlog_path::root_and_rest;
///
/// assert_eq!(root_and_rest("hero.stats.hp"), ("hero".to_string(), "stats.hp".to_string()));
/// assert_eq!(root_and_rest("hero"), ("hero".to_string(), String::new()));
/// ```
pub fn root_and_rest(path: &str) -> (String, String) {
    let norm = normalize_path(path);
    let mut parts = norm.split('.').filter(|s| !s.is_empty());
    let root = parts.next().unwrap_or("").to_string();
    let rest = parts.collect::<Vec<_>>().join(".");
    (root, rest)
}

/// Joins two path fragments with a dot, skipping empty sides.
///
/// # Example
///
/// ```
/// use plotlog_path::join_path;
///
/// assert_eq!(join_path("a.b", "c"), "a.b.c");
/// assert_eq!(join_path("", "c"), "c");
/// assert_eq!(join_path("a", ""), "a");
/// ```
pub fn join_path(base: &str, rest: &str) -> String {
    let base = base.trim();
    let rest = rest.trim();
    if base.is_empty() {
        return rest.to_string();
    }
    if rest.is_empty() {
        return base.to_string();
    }
    format!("{base}.{rest}")
}

/// The parent of a normalized path, or `None` for a root-level path.
pub fn parent_path(path: &str) -> Option<String> {
    let segs = split_segments(path);
    if segs.len() <= 1 {
        return None;
    }
    Some(
        segs[..segs.len() - 1]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// The final segment of a path, if any.
pub fn last_segment(path: &str) -> Option<Segment> {
    split_segments(path).pop()
}

fn new_container(index_next: bool) -> Value {
    if index_next {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn descend_or_create<'a>(
    cur: &'a mut Value,
    seg: &Segment,
    index_next: bool,
) -> Result<&'a mut Value, PathError> {
    if cur.is_null() {
        *cur = new_container(matches!(seg, Segment::Index(_)));
    }
    match cur {
        Value::Object(map) => {
            let entry = map.entry(seg.as_key()).or_insert(Value::Null);
            if entry.is_null() {
                *entry = new_container(index_next);
            }
            match entry {
                Value::Object(_) | Value::Array(_) => Ok(entry),
                _ => Err(PathError::TypeConflict),
            }
        }
        Value::Array(arr) => {
            let idx = seg.as_index().ok_or(PathError::TypeConflict)?;
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            let entry = &mut arr[idx];
            if entry.is_null() {
                *entry = new_container(index_next);
            }
            match entry {
                Value::Object(_) | Value::Array(_) => Ok(entry),
                _ => Err(PathError::TypeConflict),
            }
        }
        _ => Err(PathError::TypeConflict),
    }
}

/// Walks (and creates) intermediate containers so that `parent[last]` is a
/// valid assignment target.
///
/// Intermediate containers are created as arrays when the following segment
/// is numeric and objects otherwise. Existing non-container values are never
/// overwritten; the walk stops with [`PathError::TypeConflict`] instead and
/// the caller aborts that one assignment.
///
/// # Errors
///
/// - [`PathError::EmptyPath`] when `segments` is empty
/// - [`PathError::TypeConflict`] when a scalar blocks the walk, or when a
///   string key addresses into an array
pub fn ensure_container<'a>(
    root: &'a mut Value,
    segments: &[Segment],
) -> Result<Slot<'a>, PathError> {
    let (last, walk) = segments.split_last().ok_or(PathError::EmptyPath)?;
    let mut cur = root;
    for (i, seg) in walk.iter().enumerate() {
        let index_next = matches!(segments[i + 1], Segment::Index(_));
        cur = descend_or_create(cur, seg, index_next)?;
    }
    if cur.is_null() {
        *cur = new_container(matches!(last, Segment::Index(_)));
    }
    Ok(Slot {
        parent: cur,
        last: last.clone(),
    })
}

/// Sets the value at `path`, creating intermediate containers as needed.
///
/// Returns whether the document changed (used for dirty-tracking). A type
/// conflict along the walk leaves the document untouched and returns `false`.
///
/// # Example
///
/// ```
/// use plotlog_path::set_deep;
/// use serde_json::json;
///
/// let mut doc = json!({});
/// assert!(set_deep(&mut doc, "a.b.0", json!("x")));
/// assert_eq!(doc, json!({"a": {"b": ["x"]}}));
///
/// // Same value again: no change.
/// assert!(!set_deep(&mut doc, "a.b.0", json!("x")));
/// ```
pub fn set_deep(root: &mut Value, path: &str, value: Value) -> bool {
    let segs = split_segments(path);
    let Ok(slot) = ensure_container(root, &segs) else {
        return false;
    };
    match slot.parent {
        Value::Object(map) => {
            let key = slot.last.as_key();
            if map.get(&key) == Some(&value) {
                return false;
            }
            map.insert(key, value);
            true
        }
        Value::Array(arr) => {
            let Some(idx) = slot.last.as_index() else {
                return false;
            };
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            if arr[idx] == value {
                return false;
            }
            arr[idx] = value;
            true
        }
        _ => false,
    }
}

/// Appends values to the array at `path`, creating it if absent.
///
/// An existing non-array target is left untouched. Returns whether anything
/// was appended.
///
/// # Example
///
/// ```
/// use plotlog_path::push_deep;
/// use serde_json::json;
///
/// let mut doc = json!({"log": ["a"]});
/// assert!(push_deep(&mut doc, "log", &[json!("b"), json!("c")]));
/// assert_eq!(doc, json!({"log": ["a", "b", "c"]}));
/// ```
pub fn push_deep(root: &mut Value, path: &str, values: &[Value]) -> bool {
    if values.is_empty() {
        return false;
    }
    let segs = split_segments(path);
    let Ok(slot) = ensure_container(root, &segs) else {
        return false;
    };
    let target = match slot.parent {
        Value::Object(map) => map.entry(slot.last.as_key()).or_insert(Value::Null),
        Value::Array(arr) => {
            let Some(idx) = slot.last.as_index() else {
                return false;
            };
            if idx >= arr.len() {
                arr.resize(idx + 1, Value::Null);
            }
            &mut arr[idx]
        }
        _ => return false,
    };
    match target {
        Value::Null => {
            *target = Value::Array(values.to_vec());
            true
        }
        Value::Array(arr) => {
            arr.extend(values.iter().cloned());
            true
        }
        _ => false,
    }
}

/// Removes the key or array index addressed by `path`.
///
/// Array removal shifts later elements down. Missing intermediate paths are a
/// no-op, not a failure. Returns whether anything was removed.
///
/// # Example
///
/// ```
/// use plotlog_path::delete_deep;
/// use serde_json::json;
///
/// let mut doc = json!({"a": {"b": [1, 2, 3]}});
/// assert!(delete_deep(&mut doc, "a.b.1"));
/// assert_eq!(doc, json!({"a": {"b": [1, 3]}}));
/// assert!(!delete_deep(&mut doc, "a.missing.x"));
/// ```
pub fn delete_deep(root: &mut Value, path: &str) -> bool {
    let segs = split_segments(path);
    let Some((last, walk)) = segs.split_last() else {
        return false;
    };
    let mut cur = root;
    for seg in walk {
        cur = match cur {
            Value::Object(map) => match map.get_mut(&seg.as_key()) {
                Some(v) => v,
                None => return false,
            },
            Value::Array(arr) => match seg.as_index().and_then(|i| arr.get_mut(i)) {
                Some(v) => v,
                None => return false,
            },
            _ => return false,
        };
    }
    match cur {
        Value::Object(map) => map.shift_remove(&last.as_key()).is_some(),
        Value::Array(arr) => match last.as_index() {
            Some(i) if i < arr.len() => {
                arr.remove(i);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Reads the value at `path` without mutating anything.
///
/// # Example
///
/// ```
/// use plotlog_path::get_deep;
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": [10, 20]}});
/// assert_eq!(get_deep(&doc, "a.b[1]"), Some(&json!(20)));
/// assert_eq!(get_deep(&doc, "a.c"), None);
/// ```
pub fn get_deep<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in split_segments(path) {
        cur = match cur {
            Value::Object(map) => map.get(&seg.as_key())?,
            Value::Array(arr) => arr.get(seg.as_index()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Decodes a stored string into a structured value, if it looks like one.
///
/// Host variables are stored as strings; structured data is JSON-encoded at
/// the boundary. Returns `Some` only for text that parses to a JSON object
/// or array.
///
/// # Example
///
/// ```
/// use plotlog_path::maybe_parse_object;
/// use serde_json::json;
///
/// assert_eq!(maybe_parse_object(r#"{"hp": 10}"#), Some(json!({"hp": 10})));
/// assert_eq!(maybe_parse_object("plain text"), None);
/// assert_eq!(maybe_parse_object("42"), None);
/// ```
pub fn maybe_parse_object(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if !s.starts_with('{') && !s.starts_with('[') {
        return None;
    }
    match serde_json::from_str::<Value>(s) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

/// JSON-encodes a value for string storage, falling back to an empty string.
pub fn encode_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
