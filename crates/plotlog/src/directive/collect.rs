//! The operation accumulator shared by the three grammars.

use indexmap::IndexMap;
use plotlog_path::normalize_path;
use serde_json::Value;

use super::ops::extract_directives;
use super::scalar::bump_delta;
use super::types::{GuardEntry, ParsedOp};

/// Collects mutations per root variable while a block is being parsed, then
/// flattens into the ordered [`ParsedOp`] list: all `set` batches first, then
/// `push`, `bump`, `del`, and finally a single aggregated guard entry.
#[derive(Debug, Default)]
pub struct OpCollector {
    set: IndexMap<String, IndexMap<String, Value>>,
    push: IndexMap<String, IndexMap<String, Vec<Value>>>,
    bump: IndexMap<String, IndexMap<String, f64>>,
    del: IndexMap<String, Vec<String>>,
    guards: IndexMap<String, Vec<String>>,
}

impl OpCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_set(&mut self, root: &str, rel: &str, value: Value) {
        if root.is_empty() {
            return;
        }
        self.set
            .entry(root.to_string())
            .or_default()
            .insert(rel.to_string(), value);
    }

    /// Returns the currently recorded `set` value for a path, if any. Used by
    /// the YAML grammar to merge repeated list items into one array.
    pub fn set_entry_mut(&mut self, root: &str, rel: &str) -> Option<&mut Value> {
        self.set.get_mut(root)?.get_mut(rel)
    }

    pub fn put_push(&mut self, root: &str, rel: &str, value: Value) {
        if root.is_empty() {
            return;
        }
        let bucket = self
            .push
            .entry(root.to_string())
            .or_default()
            .entry(rel.to_string())
            .or_default();
        match value {
            Value::Array(items) => bucket.extend(items),
            other => bucket.push(other),
        }
    }

    pub fn put_bump(&mut self, root: &str, rel: &str, delta: &Value) {
        if root.is_empty() {
            return;
        }
        let Some(n) = bump_delta(delta) else {
            return;
        };
        let slot = self
            .bump
            .entry(root.to_string())
            .or_default()
            .entry(rel.to_string())
            .or_insert(0.0);
        *slot += n;
    }

    pub fn put_del(&mut self, root: &str, rel: &str) {
        if root.is_empty() {
            return;
        }
        self.del
            .entry(root.to_string())
            .or_default()
            .push(rel.to_string());
    }

    /// Records guard tokens against a normalized path, de-duplicating while
    /// keeping first-seen order.
    pub fn record_guard(&mut self, path: &str, tokens: &[String]) {
        let tokens: Vec<&String> = tokens.iter().filter(|t| !t.trim().is_empty()).collect();
        if tokens.is_empty() {
            return;
        }
        let norm = normalize_path(path);
        if norm.is_empty() {
            return;
        }
        let bag = self.guards.entry(norm).or_default();
        for tok in tokens {
            if !bag.contains(tok) {
                bag.push(tok.clone());
            }
        }
    }

    /// Splits directive tokens off a raw key, records them against the bare
    /// key segment, and returns the data key.
    pub fn decode_key(&mut self, raw_key: &str) -> String {
        let original = raw_key.trim().trim_end_matches(':').trim().to_string();
        let (directives, rest) = extract_directives(raw_key);
        let path = if rest.is_empty() {
            original
        } else {
            rest
        };
        if !directives.is_empty() {
            self.record_guard(&path, &directives);
        }
        path
    }

    /// Whether any operation or guard was recorded.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.push.is_empty()
            && self.bump.is_empty()
            && self.del.is_empty()
            && self.guards.is_empty()
    }

    pub fn finalize(self) -> Vec<ParsedOp> {
        let mut out = Vec::new();
        for (root, entries) in self.set {
            if !entries.is_empty() {
                out.push(ParsedOp::Set { root, entries });
            }
        }
        for (root, entries) in self.push {
            let entries: IndexMap<String, Vec<Value>> = entries
                .into_iter()
                .filter(|(_, vals)| !vals.is_empty())
                .collect();
            if !entries.is_empty() {
                out.push(ParsedOp::Push { root, entries });
            }
        }
        for (root, entries) in self.bump {
            if !entries.is_empty() {
                out.push(ParsedOp::Bump { root, entries });
            }
        }
        for (root, paths) in self.del {
            if !paths.is_empty() {
                out.push(ParsedOp::Del { root, paths });
            }
        }
        if !self.guards.is_empty() {
            let entries = self
                .guards
                .into_iter()
                .map(|(path, directives)| GuardEntry { path, directives })
                .collect();
            out.push(ParsedOp::Guard { entries });
        }
        out
    }
}
