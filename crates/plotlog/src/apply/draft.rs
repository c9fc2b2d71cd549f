//! Per-root in-memory drafts.
//!
//! A draft is loaded from the stored string in either scalar mode (opaque
//! string) or object mode (the string parsed as a JSON container). All of a
//! message's operations against one root mutate the draft; only drafts whose
//! `changed` flag is set get written back.

use plotlog_path::{
    delete_deep, encode_value, ensure_container, maybe_parse_object, push_deep, set_deep,
    split_segments,
};
use serde_json::{Map, Value};

use crate::directive::scalar::{loose_number, loose_number_str, number_value, scalar_store_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Scalar,
    Object,
}

#[derive(Debug)]
pub struct Draft {
    pub mode: DraftMode,
    pub scalar: String,
    pub base: Value,
    pub next: Value,
    pub changed: bool,
}

impl Draft {
    /// Loads a draft from the stored string (absent stores load as an empty
    /// scalar). A string that parses to a JSON container opens in object
    /// mode; a corrupt or scalar string opens in scalar mode.
    pub fn load(raw: Option<String>) -> Self {
        if let Some(obj) = raw.as_deref().and_then(maybe_parse_object) {
            Draft {
                mode: DraftMode::Object,
                scalar: String::new(),
                base: obj.clone(),
                next: obj,
                changed: false,
            }
        } else {
            Draft {
                mode: DraftMode::Scalar,
                scalar: raw.unwrap_or_default(),
                base: Value::Null,
                next: Value::Null,
                changed: false,
            }
        }
    }

    /// Coerces the draft to object mode; a scalar draft restarts from `{}`.
    pub fn ensure_object(&mut self) {
        if self.mode != DraftMode::Object {
            self.mode = DraftMode::Object;
            self.base = Value::Object(Map::new());
            self.next = Value::Object(Map::new());
            self.scalar.clear();
            self.changed = true;
        }
        if !self.next.is_object() && !self.next.is_array() {
            self.next = Value::Object(Map::new());
            self.changed = true;
        }
    }

    /// Replaces the whole root: containers switch to object mode, scalars to
    /// scalar mode.
    pub fn replace_root(&mut self, value: &Value) {
        match value {
            Value::Object(_) | Value::Array(_) => {
                self.mode = DraftMode::Object;
                self.next = value.clone();
            }
            other => {
                self.mode = DraftMode::Scalar;
                self.scalar = scalar_store_string(other);
                self.next = Value::Null;
            }
        }
        self.changed = true;
    }

    /// Clears the root: scalars to the empty string, containers to their
    /// empty shape. Only flags a change when something was there.
    pub fn clear_root(&mut self) {
        match self.mode {
            DraftMode::Scalar => {
                if !self.scalar.is_empty() {
                    self.scalar.clear();
                    self.changed = true;
                }
            }
            DraftMode::Object => {
                let emptied = match &self.next {
                    Value::Array(arr) if !arr.is_empty() => Some(Value::Array(Vec::new())),
                    Value::Object(map) if !map.is_empty() => Some(Value::Object(Map::new())),
                    _ => None,
                };
                if let Some(empty) = emptied {
                    self.next = empty;
                    self.changed = true;
                }
            }
        }
    }

    /// Sets a deep value; flags the change.
    pub fn set_at(&mut self, path: &str, value: Value) {
        self.ensure_object();
        if set_deep(&mut self.next, path, value) {
            self.changed = true;
        }
    }

    /// Deletes a deep path; flags the change.
    pub fn delete_at(&mut self, path: &str) {
        self.ensure_object();
        if delete_deep(&mut self.next, path) {
            self.changed = true;
        }
    }

    /// Appends values at a deep path; flags the change.
    pub fn push_at(&mut self, path: &str, values: &[Value]) {
        self.ensure_object();
        if push_deep(&mut self.next, path, values) {
            self.changed = true;
        }
    }

    /// The draft's numeric reading at a path, for delta recomputation.
    /// A non-empty path coerces the draft to object mode first.
    pub fn current_number_at(&mut self, path: &str) -> Option<f64> {
        if path.is_empty() {
            return match self.mode {
                DraftMode::Scalar => loose_number_str(&self.scalar),
                DraftMode::Object => None,
            };
        }
        self.ensure_object();
        let segs = split_segments(path);
        let slot = ensure_container(&mut self.next, &segs).ok()?;
        let prev = match slot.parent {
            Value::Object(map) => map.get(&slot.last.as_key()),
            Value::Array(arr) => slot.last.as_index().and_then(|i| arr.get(i)),
            _ => None,
        };
        prev.and_then(loose_number)
    }

    /// Adds a numeric delta at a path.
    ///
    /// An empty path bumps a scalar draft in place. An array target bumps
    /// its first element (or receives the delta when empty); an object
    /// target is left alone; anything else is read as a number (0 when not
    /// numeric) and replaced.
    pub fn bump_at(&mut self, path: &str, delta: f64) -> bool {
        if !delta.is_finite() {
            return false;
        }
        if path.is_empty() {
            if self.mode == DraftMode::Scalar {
                let base = loose_number_str(&self.scalar).unwrap_or(0.0);
                let next = scalar_store_string(&number_value(base + delta));
                if self.scalar != next {
                    self.scalar = next;
                    self.changed = true;
                    return true;
                }
            }
            return false;
        }

        self.ensure_object();
        let segs = split_segments(path);
        let Ok(slot) = ensure_container(&mut self.next, &segs) else {
            return false;
        };
        let changed = match slot.parent {
            Value::Object(map) => {
                // A missing leaf enters as null and bumps from zero.
                let entry = map.entry(slot.last.as_key()).or_insert(Value::Null);
                match entry {
                    Value::Array(arr) => bump_first(arr, delta),
                    Value::Object(_) => false,
                    prev => bump_scalar(prev, delta),
                }
            }
            Value::Array(arr) => match slot.last.as_index() {
                Some(i) => {
                    if i >= arr.len() {
                        arr.resize(i + 1, Value::Null);
                    }
                    match &mut arr[i] {
                        Value::Array(inner) => bump_first(inner, delta),
                        Value::Object(_) => false,
                        prev => bump_scalar(prev, delta),
                    }
                }
                None => false,
            },
            _ => false,
        };
        if changed {
            self.changed = true;
        }
        changed
    }

    /// Appends values to the root itself, coercing the draft to an array.
    ///
    /// Scalar drafts re-open a stored JSON array when the string parses as
    /// one; object drafts keep an existing array, empty objects become
    /// arrays, and a base-loaded array is restarted from its loaded state.
    /// Values already present are skipped.
    pub fn root_push(&mut self, values: Vec<Value>) {
        match self.mode {
            DraftMode::Object => {
                let replace = match &self.next {
                    Value::Array(_) => None,
                    Value::Object(map) if map.is_empty() => Some(Value::Array(Vec::new())),
                    _ => match &self.base {
                        Value::Array(_) => Some(self.base.clone()),
                        _ => Some(Value::Array(Vec::new())),
                    },
                };
                if let Some(next) = replace {
                    self.next = next;
                }
            }
            DraftMode::Scalar => {
                let parsed = serde_json::from_str::<Value>(&self.scalar)
                    .ok()
                    .filter(Value::is_array);
                self.mode = DraftMode::Object;
                self.next = parsed.unwrap_or_else(|| Value::Array(Vec::new()));
            }
        }
        if let Value::Array(arr) = &mut self.next {
            let mut changed = false;
            for v in values {
                if !arr.contains(&v) {
                    arr.push(v);
                    changed = true;
                }
            }
            if changed {
                self.changed = true;
            }
        }
    }

    /// The string to store for this draft.
    pub fn encoded(&self) -> String {
        match self.mode {
            DraftMode::Scalar => self.scalar.clone(),
            DraftMode::Object => encode_value(&self.next),
        }
    }
}

fn bump_first(arr: &mut Vec<Value>, delta: f64) -> bool {
    if arr.is_empty() {
        arr.push(number_value(delta));
        return true;
    }
    let base = loose_number(&arr[0]).unwrap_or(0.0);
    let next = number_value(base + delta);
    if arr[0] != next {
        arr[0] = next;
        true
    } else {
        false
    }
}

fn bump_scalar(prev: &mut Value, delta: f64) -> bool {
    let base = loose_number(prev).unwrap_or(0.0);
    let next = number_value(base + delta);
    if *prev != next {
        *prev = next;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_detects_mode() {
        let d = Draft::load(Some(r#"{"a": 1}"#.to_string()));
        assert_eq!(d.mode, DraftMode::Object);
        assert_eq!(d.next, json!({"a": 1}));

        let d = Draft::load(Some("plain".to_string()));
        assert_eq!(d.mode, DraftMode::Scalar);
        assert_eq!(d.scalar, "plain");

        let d = Draft::load(None);
        assert_eq!(d.mode, DraftMode::Scalar);
        assert!(d.scalar.is_empty());
        assert!(!d.changed);
    }

    #[test]
    fn corrupt_json_loads_as_scalar() {
        let d = Draft::load(Some("{broken".to_string()));
        assert_eq!(d.mode, DraftMode::Scalar);
    }

    #[test]
    fn scalar_bump_at_root() {
        let mut d = Draft::load(Some("10".to_string()));
        assert!(d.bump_at("", 5.0));
        assert_eq!(d.scalar, "15");
        assert!(d.changed);

        // Bumping to the same value is not a change.
        let mut d = Draft::load(Some("10".to_string()));
        assert!(!d.bump_at("", 0.0));
        assert!(!d.changed);
    }

    #[test]
    fn deep_bump_creates_missing_leaves() {
        let mut d = Draft::load(Some(r#"{"stats": {}}"#.to_string()));
        assert!(d.bump_at("stats.hp", 3.0));
        assert_eq!(d.next, json!({"stats": {"hp": 3}}));
    }

    #[test]
    fn bump_on_array_targets_first_element() {
        let mut d = Draft::load(Some(r#"{"hp": [10, 99]}"#.to_string()));
        assert!(d.bump_at("hp", 5.0));
        assert_eq!(d.next, json!({"hp": [15, 99]}));

        let mut d = Draft::load(Some(r#"{"hp": []}"#.to_string()));
        assert!(d.bump_at("hp", 5.0));
        assert_eq!(d.next, json!({"hp": [5]}));
    }

    #[test]
    fn bump_on_object_is_a_noop() {
        let mut d = Draft::load(Some(r#"{"hp": {"cur": 1}}"#.to_string()));
        assert!(!d.bump_at("hp", 5.0));
        assert_eq!(d.next, json!({"hp": {"cur": 1}}));
    }

    #[test]
    fn root_push_reuses_encoded_scalar_arrays() {
        let mut d = Draft::load(Some("[1,2]".to_string()));
        // A stored JSON array loads in object mode already.
        assert_eq!(d.mode, DraftMode::Object);
        d.root_push(vec![json!(3)]);
        assert_eq!(d.next, json!([1, 2, 3]));
        assert!(d.changed);
    }

    #[test]
    fn root_push_coerces_plain_scalars_to_empty_array() {
        let mut d = Draft::load(Some("words".to_string()));
        d.root_push(vec![json!("x")]);
        assert_eq!(d.next, json!(["x"]));
    }

    #[test]
    fn root_push_skips_values_already_present() {
        let mut d = Draft::load(Some(r#"["x"]"#.to_string()));
        d.root_push(vec![json!("x")]);
        assert!(!d.changed);
        assert_eq!(d.next, json!(["x"]));
    }

    #[test]
    fn clear_root_tracks_change() {
        let mut d = Draft::load(Some("text".to_string()));
        d.clear_root();
        assert!(d.changed);
        assert_eq!(d.encoded(), "");

        let mut d = Draft::load(Some("[]".to_string()));
        d.clear_root();
        assert!(!d.changed);
    }

    #[test]
    fn replace_root_switches_modes() {
        let mut d = Draft::load(Some("scalar".to_string()));
        d.replace_root(&json!({"a": 1}));
        assert_eq!(d.mode, DraftMode::Object);
        assert_eq!(d.encoded(), r#"{"a":1}"#);

        d.replace_root(&json!(7));
        assert_eq!(d.mode, DraftMode::Scalar);
        assert_eq!(d.encoded(), "7");
    }
}
