//! Snapshot/rollback of variables and rules, keyed by message index.
//!
//! A snapshot captures the resulting state *as of* a message: the full
//! variable dictionary plus the rule table. Editing, swiping, or deleting a
//! message restores the snapshot of the floor before it; deleting also
//! purges snapshots and applied fingerprints at and after the deletion
//! point.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::apply::{apply_variables_for_message, clear_applied_from};
use crate::guard::persist::save_rules;
use crate::guard::Guardian;
use crate::host::Host;
use crate::keys::SNAP_KEY;
use crate::vars::{set_var_dict, var_dict};

/// One captured state: variables plus rules.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub vars: IndexMap<String, Value>,
    pub rules: Value,
}

impl SnapshotRecord {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "vars".to_string(),
            Value::Object(self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        map.insert("rules".to_string(), self.rules.clone());
        Value::Object(map)
    }

    /// Reads a stored record. A bare dictionary (no `vars`/`rules` keys) is
    /// treated as variables-only.
    fn from_value(raw: &Value) -> Self {
        let Some(map) = raw.as_object() else {
            return SnapshotRecord {
                vars: IndexMap::new(),
                rules: Value::Object(Map::new()),
            };
        };
        if map.contains_key("vars") || map.contains_key("rules") {
            let vars = map
                .get("vars")
                .and_then(|v| v.as_object())
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let rules = map
                .get("rules")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));
            SnapshotRecord { vars, rules }
        } else {
            SnapshotRecord {
                vars: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                rules: Value::Object(Map::new()),
            }
        }
    }
}

fn snap_map<H: Host>(host: &H) -> Map<String, Value> {
    host.meta_get(SNAP_KEY)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// Stores a snapshot for a message index.
pub fn set_snapshot<H: Host>(host: &mut H, message_id: usize, record: &SnapshotRecord) {
    let mut map = snap_map(host);
    map.insert(message_id.to_string(), record.to_value());
    host.meta_set(SNAP_KEY, Value::Object(map));
    host.save_metadata_debounced();
}

/// Reads the snapshot for a message index.
pub fn get_snapshot<H: Host>(host: &H, message_id: usize) -> Option<SnapshotRecord> {
    snap_map(host)
        .get(&message_id.to_string())
        .map(SnapshotRecord::from_value)
}

/// Removes every snapshot at or after an index.
pub fn clear_snapshots_from<H: Host>(host: &mut H, start_id: usize) {
    let map = snap_map(host);
    let kept: Map<String, Value> = map
        .into_iter()
        .filter(|(k, _)| match k.parse::<usize>() {
            Ok(id) => id < start_id,
            Err(_) => true,
        })
        .collect();
    host.meta_set(SNAP_KEY, Value::Object(kept));
    host.save_metadata_debounced();
}

/// Captures the state as of the chat's last message.
pub fn snapshot_current_last<H: Host>(host: &mut H, guardian: &Guardian) {
    let Some(last) = host.last_index() else {
        return;
    };
    snapshot_for_message(host, guardian, last);
}

/// Captures the current state against a specific message index.
pub fn snapshot_for_message<H: Host>(host: &mut H, guardian: &Guardian, message_id: usize) {
    let record = SnapshotRecord {
        vars: var_dict(host),
        rules: guardian.table.to_value(),
    };
    set_snapshot(host, message_id, &record);
}

/// Restores the snapshot of the floor before `message_id`.
///
/// Variables are written under guardian bypass; the rule table (and its
/// regex cache) is restored and re-mirrored. Returns whether a snapshot was
/// found and restored.
pub fn rollback_to_previous_of<H: Host>(
    host: &mut H,
    guardian: &mut Guardian,
    message_id: usize,
) -> bool {
    let Some(prev_id) = message_id.checked_sub(1) else {
        return false;
    };
    let Some(record) = get_snapshot(host, prev_id) else {
        return false;
    };
    debug!(message_id, prev_id, "restoring snapshot");
    set_var_dict(host, guardian, &record.vars);
    guardian.table.load_value(&record.rules);
    save_rules(host, guardian);
    true
}

/// Restores state after messages at `deleted_id` and later were removed.
///
/// The highest surviving snapshot below the deletion point wins; when none
/// survives, variables and rules return to the initial empty state.
pub fn rollback_for_deletion<H: Host>(host: &mut H, guardian: &mut Guardian, deleted_id: usize) {
    let mut cursor = deleted_id;
    while cursor > 0 {
        cursor -= 1;
        if let Some(record) = get_snapshot(host, cursor) {
            debug!(deleted_id, restored = cursor, "restoring surviving snapshot");
            set_var_dict(host, guardian, &record.vars);
            guardian.table.load_value(&record.rules);
            save_rules(host, guardian);
            return;
        }
    }
    debug!(deleted_id, "no surviving snapshot; restoring initial state");
    set_var_dict(host, guardian, &IndexMap::new());
    guardian.table.clear();
    save_rules(host, guardian);
}

/// Last-resort recovery: clear all variables, then reapply every message
/// from index 0 forward in order.
pub fn rebuild_from_scratch<H: Host>(host: &mut H, guardian: &mut Guardian) {
    set_var_dict(host, guardian, &IndexMap::new());
    clear_applied_from(host, 0);
    let len = host.chat_len();
    for id in 0..len {
        apply_variables_for_message(host, guardian, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MemoryHost, VariableStore};
    use crate::vars::set_var;
    use serde_json::json;

    #[test]
    fn snapshots_roundtrip() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        guardian.table.ensure("gold").ro = true;
        set_var(&mut host, "gold", "10");

        host.push_message("hi", true);
        snapshot_current_last(&mut host, &guardian);

        let record = get_snapshot(&host, 0).unwrap();
        assert_eq!(record.vars.get("gold"), Some(&json!("10")));
        assert_eq!(record.rules["gold"]["ro"], json!(true));
    }

    #[test]
    fn legacy_bare_records_are_variables_only() {
        let record = SnapshotRecord::from_value(&json!({"gold": "5"}));
        assert_eq!(record.vars.get("gold"), Some(&json!("5")));
        assert_eq!(record.rules, json!({}));
    }

    #[test]
    fn rollback_restores_vars_and_rules() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        set_var(&mut host, "gold", "10");
        host.push_message("m0", true);
        snapshot_for_message(&mut host, &guardian, 0);

        set_var(&mut host, "gold", "15");
        set_var(&mut host, "extra", "1");
        guardian.table.ensure("gold").ro = true;
        host.push_message("m1", false);

        assert!(rollback_to_previous_of(&mut host, &mut guardian, 1));
        assert_eq!(host.get("gold").as_deref(), Some("10"));
        assert!(host.get("extra").is_none());
        assert!(guardian.table.node("gold").is_none());
        assert!(!guardian.is_bypassed());
    }

    #[test]
    fn rollback_of_floor_zero_is_a_noop() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        assert!(!rollback_to_previous_of(&mut host, &mut guardian, 0));
    }

    #[test]
    fn deletion_rollback_scans_down_to_a_surviving_snapshot() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        set_var(&mut host, "gold", "10");
        host.push_message("m0", true);
        snapshot_for_message(&mut host, &guardian, 0);

        // Floor 1 left no snapshot of its own; deleting floor 2 still finds
        // floor 0's.
        set_var(&mut host, "gold", "25");
        host.push_message("m1", false);
        host.push_message("m2", false);
        host.truncate_chat(2);
        rollback_for_deletion(&mut host, &mut guardian, 2);
        assert_eq!(host.get("gold").as_deref(), Some("10"));
    }

    #[test]
    fn deletion_rollback_without_survivors_restores_the_initial_state() {
        let mut host = MemoryHost::new();
        let mut guardian = Guardian::new();
        set_var(&mut host, "gold", "10");
        guardian.table.ensure("gold").ro = true;
        host.push_message("m0", true);
        snapshot_for_message(&mut host, &guardian, 0);

        host.truncate_chat(0);
        rollback_for_deletion(&mut host, &mut guardian, 0);
        assert!(host.get("gold").is_none());
        assert!(guardian.table.is_empty());
    }

    #[test]
    fn purge_drops_snapshots_at_and_after() {
        let mut host = MemoryHost::new();
        let guardian = Guardian::new();
        for i in 0..3 {
            host.push_message(&format!("m{i}"), false);
            snapshot_for_message(&mut host, &guardian, i);
        }
        clear_snapshots_from(&mut host, 1);
        assert!(get_snapshot(&host, 0).is_some());
        assert!(get_snapshot(&host, 1).is_none());
        assert!(get_snapshot(&host, 2).is_none());
    }
}
