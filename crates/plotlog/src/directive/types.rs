//! The normalized operation model produced by block parsing.

use indexmap::IndexMap;
use serde_json::Value;

/// The four mutation kinds a directive block can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Set,
    Push,
    Bump,
    Del,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Set => "set",
            OpKind::Push => "push",
            OpKind::Bump => "bump",
            OpKind::Del => "del",
        }
    }
}

/// A rule declaration discovered while parsing: `$…` tokens recorded against
/// a normalized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardEntry {
    pub path: String,
    pub directives: Vec<String>,
}

/// One parsed operation: a mutation batch for a single root variable, or the
/// block's aggregated guard declarations.
///
/// Relative paths are normalized (dot notation); an empty relative path
/// addresses the root variable itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOp {
    /// Batch set of leaf values under one root.
    Set {
        root: String,
        entries: IndexMap<String, Value>,
    },
    /// Values to append to arrays under one root.
    Push {
        root: String,
        entries: IndexMap<String, Vec<Value>>,
    },
    /// Numeric deltas, accumulated per path.
    Bump {
        root: String,
        entries: IndexMap<String, f64>,
    },
    /// Relative paths to remove under one root.
    Del { root: String, paths: Vec<String> },
    /// All guard declarations found in the block.
    Guard { entries: Vec<GuardEntry> },
}

impl ParsedOp {
    /// The root variable this operation touches, if it is a data operation.
    pub fn root(&self) -> Option<&str> {
        match self {
            ParsedOp::Set { root, .. }
            | ParsedOp::Push { root, .. }
            | ParsedOp::Bump { root, .. }
            | ParsedOp::Del { root, .. } => Some(root),
            ParsedOp::Guard { .. } => None,
        }
    }
}
