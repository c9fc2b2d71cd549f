//! Variable reads and writes over the host boundary.
//!
//! Stored values are strings; structured data is JSON at the boundary. Every
//! write goes through here so the metadata mirror stays consistent with the
//! host store (the snapshot manager reads the mirror).

use indexmap::IndexMap;
use plotlog_path::{encode_value, get_deep, maybe_parse_object, root_and_rest};
use serde_json::Value;

use crate::guard::Guardian;
use crate::host::{Host, VariableStore};
use crate::keys::VARS_KEY;

/// The decoded value of a root variable: structured when the stored string
/// parses as a JSON object/array, the bare string otherwise.
pub fn root_value<S: VariableStore + ?Sized>(store: &S, name: &str) -> Option<Value> {
    let raw = store.get(name)?;
    Some(maybe_parse_object(&raw).unwrap_or(Value::String(raw)))
}

/// Resolves an absolute path (`root.sub.path`) against the store.
pub fn value_at<S: VariableStore + ?Sized>(store: &S, path: &str) -> Option<Value> {
    let (root, rest) = root_and_rest(path);
    if root.is_empty() {
        return None;
    }
    let root_val = root_value(store, &root)?;
    if rest.is_empty() {
        return Some(root_val);
    }
    match &root_val {
        Value::Object(_) | Value::Array(_) => get_deep(&root_val, &rest).cloned(),
        _ => None,
    }
}

/// Writes one variable to the host store and the metadata mirror.
pub fn set_var<H: Host>(host: &mut H, name: &str, value: &str) {
    host.set(name, value);
    let mut dict = host
        .meta_get(VARS_KEY)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    dict.insert(name.to_string(), Value::String(value.to_string()));
    host.meta_set(VARS_KEY, Value::Object(dict));
    host.save_metadata_debounced();
}

/// Removes one variable from the host store and the metadata mirror.
pub fn delete_var<H: Host>(host: &mut H, name: &str) {
    host.delete(name);
    if let Some(Value::Object(mut dict)) = host.meta_get(VARS_KEY) {
        dict.shift_remove(name);
        host.meta_set(VARS_KEY, Value::Object(dict));
    }
    host.save_metadata_debounced();
}

/// A copy of the full variable dictionary (from the metadata mirror).
pub fn var_dict<H: Host>(host: &H) -> IndexMap<String, Value> {
    host.meta_get(VARS_KEY)
        .and_then(|v| v.as_object().cloned())
        .map(|m| m.into_iter().collect())
        .unwrap_or_default()
}

/// Replaces the entire variable dictionary.
///
/// Host keys absent from `dict` are cleared; the rest are overwritten
/// (structured values JSON-encoded). Runs under guardian bypass so a wrapped
/// store cannot reject the engine's own restore writes.
pub fn set_var_dict<H: Host>(host: &mut H, guardian: &mut Guardian, dict: &IndexMap<String, Value>) {
    guardian.with_bypass(|| {
        let current = var_dict(host);
        for name in current.keys() {
            if !dict.contains_key(name) {
                host.delete(name);
            }
        }
        for (name, value) in dict {
            let stored = match value {
                Value::String(s) => s.clone(),
                Value::Object(_) | Value::Array(_) => encode_value(value),
                other => other.to_string(),
            };
            host.set(name, &stored);
        }
    });

    let mirror: serde_json::Map<String, Value> =
        dict.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    host.meta_set(VARS_KEY, Value::Object(mirror));
    host.save_metadata_debounced();
}
