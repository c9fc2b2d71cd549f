//! The guardian: per-mutation validation against the rule table.
//!
//! Every proposed mutation is checked before it is applied; the verdict may
//! clamp the value instead of rejecting it outright. Denials are silent at
//! the data layer — the operation is skipped and a debug log records the
//! path and reason.

use plotlog_path::{last_segment, normalize_path, parent_path, Segment};
use serde_json::Value;
use tracing::debug;

use crate::directive::scalar::{loose_number, number_value};

use super::rules::{RuleNode, RuleTable, TypeLock};
use super::tokens::{self, RuleDelta};

/// The mutation kinds the guardian distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOp {
    Set,
    Push,
    Bump,
    DelNode,
}

impl GuardOp {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardOp::Set => "set",
            GuardOp::Push => "push",
            GuardOp::Bump => "bump",
            GuardOp::DelNode => "delNode",
        }
    }
}

/// The guardian's answer: allow (possibly with a clamped replacement value)
/// or deny with a reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub allow: bool,
    pub value: Option<Value>,
    pub reason: Option<&'static str>,
}

impl Verdict {
    fn allowed(value: Option<Value>) -> Self {
        Verdict {
            allow: true,
            value,
            reason: None,
        }
    }
}

/// Owns the rule table and the bypass flag; validates every mutation.
#[derive(Debug, Default)]
pub struct Guardian {
    pub table: RuleTable,
    bypass: bool,
    dirty: bool,
}

impl Guardian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Runs `f` with validation bypassed. The flag is restored even if `f`
    /// panics, so an internal write can never leave the guardian disabled.
    pub fn with_bypass<R>(&mut self, f: impl FnOnce() -> R) -> R {
        struct Reset<'a> {
            flag: &'a mut bool,
            prev: bool,
        }
        impl Drop for Reset<'_> {
            fn drop(&mut self) {
                *self.flag = self.prev;
            }
        }
        let prev = self.bypass;
        self.bypass = true;
        let _reset = Reset {
            flag: &mut self.bypass,
            prev,
        };
        f()
    }

    /// Whether rule state changed since the last mirror sync; reading resets
    /// the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Merges a directive-derived delta into the table.
    pub fn apply_delta(&mut self, path: &str, delta: &RuleDelta) {
        tokens::apply_delta(&mut self.table, path, delta);
        self.dirty = true;
    }

    fn deny(&self, op: GuardOp, path: &str, reason: &'static str) -> Verdict {
        debug!(op = op.as_str(), path, reason, "guard denied");
        Verdict {
            allow: false,
            value: None,
            reason: Some(reason),
        }
    }

    /// Nearest ancestor carrying any growth policy.
    fn effective_parent(&self, path: &str) -> Option<RuleNode> {
        let mut cur = parent_path(path);
        while let Some(pp) = cur {
            if let Some(node) = self.table.node(&pp) {
                if node.has_growth_policy() {
                    return Some(node.clone());
                }
            }
            cur = parent_path(&pp);
        }
        None
    }

    fn lock_type_if_unknown(&mut self, path: &str, value: &Value) {
        let node = self.table.ensure(path);
        if node.type_lock == TypeLock::Unknown {
            node.type_lock = TypeLock::of(value);
            self.dirty = true;
        }
    }

    /// Validates one proposed mutation.
    ///
    /// `current` resolves the present committed value at an absolute path;
    /// the guardian never reads in-progress drafts.
    pub fn validate(
        &mut self,
        op: GuardOp,
        abs_path: &str,
        payload: Option<&Value>,
        current: &dyn Fn(&str) -> Option<Value>,
    ) -> Verdict {
        if self.bypass {
            return Verdict::allowed(payload.cloned());
        }

        let p = normalize_path(abs_path);
        let node = self.table.node(&p).cloned().unwrap_or_default();
        if node.ro {
            return self.deny(op, &p, "ro");
        }

        let parent = parent_path(&p);
        // When a parent path exists but no ancestor declares a policy, the
        // effective parent is the locked-down default.
        let parent_node: Option<RuleNode> = parent
            .as_ref()
            .map(|_| self.effective_parent(&p).unwrap_or_default());
        let is_index_tail = matches!(last_segment(&p), Some(Segment::Index(_)));
        let current_value = current(&p);

        match op {
            GuardOp::DelNode => {
                let Some(parent) = parent else {
                    return self.deny(op, &p, "no-parent");
                };
                let parent_value = current(&parent);
                let parent_is_array = matches!(parent_value, Some(Value::Array(_)));
                let pp = self.table.node(&parent).cloned().unwrap_or_default();
                if parent_is_array || is_index_tail {
                    if !pp.array_policy.allows_shrink() {
                        return self.deny(op, &p, "array-no-shrink");
                    }
                } else if !pp.object_policy.allows_prune() {
                    return self.deny(op, &p, "object-no-prune");
                }
                Verdict::allowed(None)
            }

            GuardOp::Push => {
                match current_value {
                    None => {
                        if parent.is_some() {
                            let pp = parent_node.unwrap_or_default();
                            if is_index_tail {
                                let parent_val = parent.as_deref().and_then(current);
                                if !matches!(parent_val, Some(Value::Array(_))) {
                                    return self.deny(op, &p, "parent-not-array");
                                }
                                if !pp.array_policy.allows_grow() {
                                    return self.deny(op, &p, "array-no-grow");
                                }
                            } else if !pp.object_policy.allows_extend() {
                                return self.deny(op, &p, "object-no-ext");
                            }
                        }
                        // First push creates the array and locks the type.
                        let node = self.table.ensure(&p);
                        node.type_lock = TypeLock::Array;
                        self.dirty = true;
                        Verdict::allowed(payload.cloned())
                    }
                    Some(Value::Array(_)) => {
                        if !node.array_policy.allows_grow() {
                            return self.deny(op, &p, "array-no-grow");
                        }
                        Verdict::allowed(payload.cloned())
                    }
                    Some(_) => {
                        if node.type_lock != TypeLock::Unknown && node.type_lock != TypeLock::Array
                        {
                            self.deny(op, &p, "type-locked-not-array")
                        } else {
                            self.deny(op, &p, "not-array")
                        }
                    }
                }
            }

            GuardOp::Bump => {
                let Some(mut delta) = payload.and_then(loose_number) else {
                    return self.deny(op, &p, "delta-nan");
                };

                if current_value.is_none() && parent.is_some() {
                    let pp = parent_node.unwrap_or_default();
                    if is_index_tail {
                        if !pp.array_policy.allows_grow() {
                            return self.deny(op, &p, "array-no-grow");
                        }
                    } else if !pp.object_policy.allows_extend() {
                        return self.deny(op, &p, "object-no-ext");
                    }
                }

                if let Some(step) = node.constraints.step {
                    let step = step.abs();
                    delta = delta.clamp(-step, step);
                }

                let cur = current_value.as_ref().and_then(loose_number);
                let next = cur.unwrap_or(0.0) + delta;
                let clamped = clamp_to_constraints(next, &node);
                if cur.is_none() {
                    self.lock_type_if_unknown(&p, &number_value(clamped));
                }
                Verdict::allowed(Some(number_value(clamped)))
            }

            GuardOp::Set => {
                let Some(payload) = payload else {
                    return self.deny(op, &p, "no-value");
                };

                if current_value.is_none() {
                    if let Some(pp) = parent_node {
                        if is_index_tail {
                            if !pp.array_policy.allows_grow() {
                                return self.deny(op, &p, "array-no-grow");
                            }
                        } else if !pp.object_policy.allows_extend() {
                            return self.deny(op, &p, "object-no-ext");
                        }
                    }
                }

                let incoming_type = TypeLock::of(payload);
                if node.type_lock != TypeLock::Unknown && node.type_lock != incoming_type {
                    return self.deny(op, &p, "type-locked-mismatch");
                }

                match payload {
                    Value::Number(_) => {
                        let Some(mut incoming) = loose_number(payload) else {
                            return self.deny(op, &p, "number-constraint");
                        };
                        if let Some(step) = node.constraints.step {
                            let step = step.abs();
                            let base = current_value
                                .as_ref()
                                .and_then(loose_number)
                                .unwrap_or(0.0);
                            let diff = (incoming - base).clamp(-step, step);
                            incoming = base + diff;
                        }
                        let clamped = clamp_to_constraints(incoming, &node);
                        self.lock_type_if_unknown(&p, &number_value(clamped));
                        Verdict::allowed(Some(number_value(clamped)))
                    }
                    Value::String(s) => {
                        if let Some(one_of) = &node.constraints.one_of {
                            if !one_of.is_empty() && !one_of.contains(s) {
                                return self.deny(op, &p, "string-constraint");
                            }
                        }
                        if node.constraints.regex.is_some() {
                            // An uncompilable pattern does not gate writes.
                            let matched = self
                                .table
                                .compiled_regex(&p)
                                .map_or(true, |re| re.is_match(s));
                            if !matched {
                                return self.deny(op, &p, "string-constraint");
                            }
                        }
                        self.lock_type_if_unknown(&p, payload);
                        Verdict::allowed(Some(payload.clone()))
                    }
                    other => {
                        self.lock_type_if_unknown(&p, other);
                        Verdict::allowed(Some(other.clone()))
                    }
                }
            }
        }
    }
}

fn clamp_to_constraints(mut v: f64, node: &RuleNode) -> f64 {
    if let Some(min) = node.constraints.min {
        v = v.max(min);
    }
    if let Some(max) = node.constraints.max {
        v = v.min(max);
    }
    v
}
