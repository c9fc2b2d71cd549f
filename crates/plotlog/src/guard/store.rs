//! A validating wrapper around any [`VariableStore`].
//!
//! Interposes the guardian on the host's own variable API without patching
//! anything: every `set`/`delete` routes through [`Guardian::validate`]
//! before delegating. Structured values may carry `$…` rule keys, which are
//! split into rule deltas and stripped before storage.

use plotlog_path::{encode_value, normalize_path};
use serde_json::Value;

use crate::directive::scalar::{coerce_scalar_str, number_value, scalar_store_string};
use crate::host::VariableStore;
use crate::vars::value_at;

use super::tokens::rules_from_tree;
use super::validate::{GuardOp, Guardian};

/// Wraps a store and a guardian for the lifetime of one call site.
pub struct GuardedVariableStore<'a, S: VariableStore> {
    inner: &'a mut S,
    guardian: &'a mut Guardian,
}

impl<'a, S: VariableStore> GuardedVariableStore<'a, S> {
    pub fn new(inner: &'a mut S, guardian: &'a mut Guardian) -> Self {
        Self { inner, guardian }
    }

    /// Sets a typed value through validation.
    ///
    /// An object payload with `$…` keys first contributes its rule deltas
    /// and is stored stripped of them.
    pub fn set_value(&mut self, name: &str, value: &Value) {
        let Self { inner, guardian } = self;
        if guardian.is_bypassed() {
            write_raw(&mut **inner, name, value);
            return;
        }

        let mut payload = value.clone();
        if let Some(map) = value.as_object() {
            if map.keys().any(|k| k.trim().starts_with('$')) {
                let (clean, deltas) = rules_from_tree(value, &normalize_path(name));
                payload = clean;
                for (path, delta) in &deltas {
                    guardian.apply_delta(path, delta);
                }
            }
        }

        let verdict = {
            let read: &S = &**inner;
            guardian.validate(
                GuardOp::Set,
                &normalize_path(name),
                Some(&payload),
                &|p| value_at(read, p),
            )
        };
        if !verdict.allow {
            return;
        }
        write_raw(&mut **inner, name, &verdict.value.unwrap_or(payload));
    }

    /// Adds a numeric delta through validation; the clamped result is
    /// written back whole.
    pub fn bump(&mut self, name: &str, delta: f64) {
        let Self { inner, guardian } = self;
        if guardian.is_bypassed() {
            let base = value_at(&**inner, name)
                .as_ref()
                .and_then(crate::directive::scalar::loose_number)
                .unwrap_or(0.0);
            write_raw(&mut **inner, name, &number_value(base + delta));
            return;
        }
        let verdict = {
            let read: &S = &**inner;
            guardian.validate(
                GuardOp::Bump,
                &normalize_path(name),
                Some(&number_value(delta)),
                &|p| value_at(read, p),
            )
        };
        if !verdict.allow {
            return;
        }
        if let Some(value) = verdict.value {
            write_raw(&mut **inner, name, &value);
        }
    }

    pub fn increment(&mut self, name: &str) {
        self.bump(name, 1.0);
    }

    pub fn decrement(&mut self, name: &str) {
        self.bump(name, -1.0);
    }
}

fn write_raw<S: VariableStore>(store: &mut S, name: &str, value: &Value) {
    let stored = match value {
        Value::Object(_) | Value::Array(_) => encode_value(value),
        other => scalar_store_string(other),
    };
    store.set(name, &stored);
}

impl<S: VariableStore> VariableStore for GuardedVariableStore<'_, S> {
    fn get(&self, name: &str) -> Option<String> {
        self.inner.get(name)
    }

    fn set(&mut self, name: &str, value: &str) {
        if self.guardian.is_bypassed() {
            self.inner.set(name, value);
            return;
        }
        let payload = plotlog_path::maybe_parse_object(value)
            .unwrap_or_else(|| coerce_scalar_str(value));
        self.set_value(name, &payload);
    }

    fn delete(&mut self, name: &str) {
        let Self { inner, guardian } = self;
        if guardian.is_bypassed() {
            inner.delete(name);
            return;
        }
        let verdict = {
            let read: &S = &**inner;
            guardian.validate(GuardOp::DelNode, &normalize_path(name), None, &|p| {
                value_at(read, p)
            })
        };
        if verdict.allow {
            inner.delete(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::rules::TypeLock;
    use crate::host::MemoryHost;
    use serde_json::json;

    #[test]
    fn readonly_paths_reject_wrapped_writes() {
        let mut host = MemoryHost::new();
        host.set("hp", "10");
        let mut guardian = Guardian::new();
        guardian.table.ensure("hp").ro = true;

        let mut store = GuardedVariableStore::new(&mut host, &mut guardian);
        store.set("hp", "20");
        assert_eq!(host.get("hp").as_deref(), Some("10"));
    }

    #[test]
    fn writes_lock_types_and_clamp() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        {
            let c = &mut guardian.table.ensure("hp").constraints;
            c.min = Some(0.0);
            c.max = Some(100.0);
        }

        let mut store = GuardedVariableStore::new(&mut host, &mut guardian);
        store.set("hp", "250");
        assert_eq!(host.get("hp").as_deref(), Some("100"));
        assert_eq!(guardian.table.node("hp").unwrap().type_lock, TypeLock::Number);
    }

    #[test]
    fn dollar_keys_become_rules_and_are_stripped() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();

        let mut store = GuardedVariableStore::new(&mut host, &mut guardian);
        store.set_value("hero", &json!({"stats": {"hp": 10}, "$ro stats.hp": null}));

        let stored: Value = serde_json::from_str(&host.get("hero").unwrap()).unwrap();
        assert_eq!(stored, json!({"stats": {"hp": 10}}));
        assert!(guardian.table.node("hero.stats.hp").unwrap().ro);
    }

    #[test]
    fn bump_routes_through_validation() {
        let mut host = MemoryHost::new();
        host.set("gold", "50");
        let mut guardian = Guardian::new();
        guardian.table.ensure("gold").constraints.max = Some(100.0);

        let mut store = GuardedVariableStore::new(&mut host, &mut guardian);
        store.bump("gold", 1000.0);
        assert_eq!(host.get("gold").as_deref(), Some("100"));
    }

    #[test]
    fn root_delete_is_denied_without_bypass() {
        let mut host = MemoryHost::new();
        host.set("x", "1");
        let mut guardian = Guardian::new();

        let mut store = GuardedVariableStore::new(&mut host, &mut guardian);
        store.delete("x");
        assert!(host.get("x").is_some());
    }
}
