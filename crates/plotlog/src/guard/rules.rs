//! Rule nodes and the path-keyed rule table.
//!
//! The table mirrors into chat metadata verbatim (camelCase field names,
//! lowercase enum values); the compiled-regex cache is never serialized and
//! is rebuilt on every load.

use std::collections::HashMap;

use indexmap::IndexMap;
use plotlog_path::normalize_path;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A type lock: the first successful write of an untyped node fixes its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypeLock {
    #[default]
    Unknown,
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl TypeLock {
    /// The lock a value would establish.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeLock::Null,
            Value::Bool(_) => TypeLock::Boolean,
            Value::Number(_) => TypeLock::Number,
            Value::String(_) => TypeLock::String,
            Value::Array(_) => TypeLock::Array,
            Value::Object(_) => TypeLock::Object,
        }
    }
}

/// Growth policy for object-keyed children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectPolicy {
    #[default]
    None,
    Ext,
    Prune,
    Free,
}

impl ObjectPolicy {
    pub fn allows_extend(self) -> bool {
        matches!(self, ObjectPolicy::Ext | ObjectPolicy::Free)
    }

    pub fn allows_prune(self) -> bool {
        matches!(self, ObjectPolicy::Prune | ObjectPolicy::Free)
    }
}

/// Growth policy for array elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArrayPolicy {
    #[default]
    Lock,
    Grow,
    Shrink,
    List,
}

impl ArrayPolicy {
    pub fn allows_grow(self) -> bool {
        matches!(self, ArrayPolicy::Grow | ArrayPolicy::List)
    }

    pub fn allows_shrink(self) -> bool {
        matches!(self, ArrayPolicy::Shrink | ArrayPolicy::List)
    }
}

/// A stored regex constraint: pattern source plus flags (`i` is honored).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegexConstraint {
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flags: String,
}

impl RegexConstraint {
    pub fn compile(&self) -> Option<Regex> {
        RegexBuilder::new(&self.source)
            .case_insensitive(self.flags.contains('i'))
            .build()
            .map_err(|err| {
                debug!(source = %self.source, %err, "constraint regex failed to compile");
                err
            })
            .ok()
    }
}

/// Numeric and string constraints attached to one rule node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "enum")]
    pub one_of: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexConstraint>,
}

/// The policy record for one normalized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleNode {
    pub type_lock: TypeLock,
    pub ro: bool,
    pub object_policy: ObjectPolicy,
    pub array_policy: ArrayPolicy,
    pub constraints: Constraints,
}

impl RuleNode {
    /// Whether this node grants anything beyond the locked-down default.
    pub fn has_growth_policy(&self) -> bool {
        self.object_policy != ObjectPolicy::None || self.array_policy != ArrayPolicy::Lock
    }
}

/// The mapping from normalized path to rule node, plus the compiled-regex
/// cache.
#[derive(Debug, Default)]
pub struct RuleTable {
    nodes: IndexMap<String, RuleNode>,
    regex_cache: HashMap<String, Regex>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, path: &str) -> Option<&RuleNode> {
        self.nodes.get(&normalize_path(path))
    }

    /// The node for a path, created lazily with locked-down defaults.
    pub fn ensure(&mut self, path: &str) -> &mut RuleNode {
        self.nodes.entry(normalize_path(path)).or_default()
    }

    pub fn remove(&mut self, path: &str) {
        let p = normalize_path(path);
        self.nodes.shift_remove(&p);
        self.regex_cache.remove(&p);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.regex_cache.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RuleNode)> {
        self.nodes.iter()
    }

    /// The compiled regex for a path's constraint, compiling and caching on
    /// first use.
    pub fn compiled_regex(&mut self, path: &str) -> Option<&Regex> {
        let p = normalize_path(path);
        if !self.regex_cache.contains_key(&p) {
            let constraint = self.nodes.get(&p)?.constraints.regex.clone()?;
            let re = constraint.compile()?;
            self.regex_cache.insert(p.clone(), re);
        }
        self.regex_cache.get(&p)
    }

    /// Serializes the table for the metadata mirror.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.nodes).unwrap_or_else(|_| Value::Object(Default::default()))
    }

    /// Replaces the table from a metadata mirror value, rebuilding the regex
    /// cache. Anything that does not deserialize loads as an empty table.
    pub fn load_value(&mut self, value: &Value) {
        self.nodes = serde_json::from_value(value.clone()).unwrap_or_default();
        self.rebuild_regex_cache();
    }

    pub fn rebuild_regex_cache(&mut self) {
        self.regex_cache.clear();
        for (path, node) in &self.nodes {
            if let Some(constraint) = &node.constraints.regex {
                if let Some(re) = constraint.compile() {
                    self.regex_cache.insert(path.clone(), re);
                }
            }
        }
    }
}
