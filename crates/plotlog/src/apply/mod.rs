//! The mutation applier: one message in, guarded variable writes out.
//!
//! For exactly one message index: fingerprint the directive blocks, skip if
//! unchanged, parse into operations, apply each through the guardian against
//! per-root drafts, write back only roots that changed, and record the new
//! fingerprint. Nothing in here returns an error to the message pipeline;
//! per-operation failures are counted and skipped.

pub mod draft;

pub use draft::{Draft, DraftMode};

use indexmap::IndexMap;
use plotlog_path::{join_path, normalize_path, root_and_rest, split_segments, Segment};
use serde_json::Value;
use tracing::debug;

use crate::directive::scalar::{loose_number, number_value, parse_value_for_set};
use crate::directive::{extract_blocks, parse_block, signature_of, GuardEntry, ParsedOp};
use crate::guard::{parse_directive_tokens, GuardOp, Guardian};
use crate::host::Host;
use crate::keys::APPLIED_KEY;
use crate::vars::{set_var, value_at};

/// One denied operation, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedSample {
    pub op: &'static str,
    pub path: String,
}

/// What one application pass did.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Any root variable was written.
    pub applied: bool,
    /// The message fingerprint matched and nothing ran.
    pub skipped_unchanged: bool,
    /// Operations parsed out of all blocks.
    pub op_count: usize,
    /// Blocks that produced zero operations.
    pub empty_blocks: usize,
    /// Operations the guardian denied.
    pub guard_denied: usize,
    /// Up to eight denied (op, path) pairs.
    pub denied_samples: Vec<DeniedSample>,
    /// Roots whose drafts were written back.
    pub changed_roots: Vec<String>,
}

impl ApplyOutcome {
    fn deny(&mut self, op: &'static str, path: &str) {
        self.guard_denied += 1;
        if self.denied_samples.len() < 8 {
            self.denied_samples.push(DeniedSample {
                op,
                path: path.to_string(),
            });
        }
    }
}

// ── Applied-fingerprint map ───────────────────────────────────────────────

fn applied_map<H: Host>(host: &H) -> serde_json::Map<String, Value> {
    host.meta_get(APPLIED_KEY)
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

/// The fingerprint last applied for a message, if any.
pub fn applied_signature<H: Host>(host: &H, message_id: usize) -> Option<String> {
    applied_map(host)
        .get(&message_id.to_string())
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Records (or clears, with `None`) a message's applied fingerprint.
pub fn set_applied_signature<H: Host>(host: &mut H, message_id: usize, sig: Option<&str>) {
    let mut map = applied_map(host);
    match sig {
        Some(sig) => {
            map.insert(message_id.to_string(), Value::String(sig.to_string()));
        }
        None => {
            map.shift_remove(&message_id.to_string());
        }
    }
    host.meta_set(APPLIED_KEY, Value::Object(map));
    host.save_metadata_debounced();
}

pub fn clear_applied_for<H: Host>(host: &mut H, message_id: usize) {
    set_applied_signature(host, message_id, None);
}

/// Drops every fingerprint at or after an index.
pub fn clear_applied_from<H: Host>(host: &mut H, message_id: usize) {
    let map = applied_map(host);
    let kept: serde_json::Map<String, Value> = map
        .into_iter()
        .filter(|(k, _)| match k.parse::<usize>() {
            Ok(id) => id < message_id,
            Err(_) => true,
        })
        .collect();
    host.meta_set(APPLIED_KEY, Value::Object(kept));
    host.save_metadata_debounced();
}

// ── The applier ───────────────────────────────────────────────────────────

/// Applies one message's directive blocks to the variable store.
///
/// Idempotent per content: an unchanged fingerprint short-circuits, and a
/// fingerprint is recorded even when the blocks parse to nothing so an
/// unparseable block is not reprocessed forever.
pub fn apply_variables_for_message<H: Host>(
    host: &mut H,
    guardian: &mut Guardian,
    message_id: usize,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    let Some(msg) = host.message(message_id) else {
        return outcome;
    };

    let sig = signature_of(&msg.text);
    if sig.is_empty() {
        clear_applied_for(host, message_id);
        return outcome;
    }
    if applied_signature(host, message_id).as_deref() == Some(sig.as_str()) {
        outcome.skipped_unchanged = true;
        return outcome;
    }

    let blocks = extract_blocks(&msg.text);
    if blocks.is_empty() {
        clear_applied_for(host, message_id);
        return outcome;
    }

    let mut ops: Vec<ParsedOp> = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        let parts = parse_block(block);
        if parts.is_empty() {
            outcome.empty_blocks += 1;
            debug!(message_id, block = idx + 1, "block produced no operations");
            continue;
        }
        ops.extend(parts);
    }
    outcome.op_count = ops.len();

    if ops.is_empty() {
        debug!(
            message_id,
            blocks = blocks.len(),
            "no executable operations; fingerprint recorded"
        );
        set_applied_signature(host, message_id, Some(&sig));
        return outcome;
    }

    // Load a draft per touched root.
    let mut drafts: IndexMap<String, Draft> = IndexMap::new();
    for op in &ops {
        if let Some(name) = op.root() {
            let (root, _) = root_and_rest(name);
            if !root.is_empty() && !drafts.contains_key(&root) {
                drafts.insert(root.clone(), Draft::load(host.get(&root)));
            }
        }
    }

    for op in &ops {
        match op {
            ParsedOp::Guard { entries } => apply_guard_entries(guardian, entries),
            ParsedOp::Set { root, entries } => {
                apply_set(host, guardian, &mut drafts, &mut outcome, root, entries);
            }
            ParsedOp::Del { root, paths } => {
                apply_del(host, guardian, &mut drafts, &mut outcome, root, paths);
            }
            ParsedOp::Push { root, entries } => {
                apply_push(host, guardian, &mut drafts, &mut outcome, root, entries);
            }
            ParsedOp::Bump { root, entries } => {
                apply_bump(host, guardian, &mut drafts, &mut outcome, root, entries);
            }
        }
    }

    if !drafts.values().any(|d| d.changed) {
        debug!(
            message_id,
            ops = outcome.op_count,
            denied = outcome.guard_denied,
            "operations produced no changes"
        );
        set_applied_signature(host, message_id, Some(&sig));
        return outcome;
    }

    for (name, d) in &drafts {
        if d.changed {
            set_var(host, name, &d.encoded());
            outcome.changed_roots.push(name.clone());
        }
    }
    outcome.applied = true;
    set_applied_signature(host, message_id, Some(&sig));
    outcome
}

fn apply_guard_entries(guardian: &mut Guardian, entries: &[GuardEntry]) {
    for entry in entries {
        let path = entry.path.trim();
        if path.is_empty() || entry.directives.is_empty() {
            continue;
        }
        let delta = parse_directive_tokens(&entry.directives);
        if !delta.is_empty() {
            guardian.apply_delta(&normalize_path(path), &delta);
        }
    }
}

fn abs_path(root: &str, local: &str) -> String {
    if local.is_empty() {
        root.to_string()
    } else {
        format!("{root}.{local}")
    }
}

fn apply_set<H: Host>(
    host: &H,
    guardian: &mut Guardian,
    drafts: &mut IndexMap<String, Draft>,
    outcome: &mut ApplyOutcome,
    name: &str,
    entries: &IndexMap<String, Value>,
) {
    let (root, sub) = root_and_rest(name);
    let Some(d) = drafts.get_mut(&root) else {
        return;
    };
    for (k, v) in entries {
        let local = join_path(&sub, k);
        let std = normalize_path(&abs_path(&root, &local));
        let new_val = parse_value_for_set(v);
        let verdict = guardian.validate(GuardOp::Set, &std, Some(&new_val), &|p| {
            value_at(host, p)
        });
        if !verdict.allow {
            outcome.deny("set", &std);
            continue;
        }
        let value = verdict.value.unwrap_or(new_val);
        if local.is_empty() {
            d.replace_root(&value);
        } else {
            d.set_at(&normalize_path(&local), value);
        }
    }
}

fn apply_del<H: Host>(
    host: &H,
    guardian: &mut Guardian,
    drafts: &mut IndexMap<String, Draft>,
    outcome: &mut ApplyOutcome,
    name: &str,
    paths: &[String],
) {
    let (root, sub) = root_and_rest(name);
    let Some(d) = drafts.get_mut(&root) else {
        return;
    };

    struct Pending {
        norm_local: String,
        parent_key: String,
        index: Option<usize>,
    }
    let mut pending: Vec<Pending> = Vec::new();

    for key in paths {
        let local = join_path(&sub, key);
        if local.is_empty() {
            let std = normalize_path(&root);
            let verdict =
                guardian.validate(GuardOp::DelNode, &std, None, &|p| value_at(host, p));
            if !verdict.allow {
                outcome.deny("delNode", &std);
                continue;
            }
            d.clear_root();
            continue;
        }

        let std = normalize_path(&abs_path(&root, &local));
        let verdict = guardian.validate(GuardOp::DelNode, &std, None, &|p| value_at(host, p));
        if !verdict.allow {
            outcome.deny("delNode", &std);
            continue;
        }

        let norm_local = normalize_path(&local);
        let segs = split_segments(&norm_local);
        let (parent_key, index) = match segs.last() {
            Some(Segment::Index(i)) => (
                segs[..segs.len() - 1]
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("."),
                Some(*i),
            ),
            _ => (String::new(), None),
        };
        pending.push(Pending {
            norm_local,
            parent_key,
            index,
        });
    }

    if pending.is_empty() {
        return;
    }

    // Index deletions run per parent in descending order so earlier removals
    // cannot shift later targets.
    let mut array_groups: IndexMap<String, Vec<Pending>> = IndexMap::new();
    let mut object_deletes: Vec<Pending> = Vec::new();
    for p in pending {
        if p.index.is_some() {
            array_groups.entry(p.parent_key.clone()).or_default().push(p);
        } else {
            object_deletes.push(p);
        }
    }

    for (_, mut group) in array_groups {
        group.sort_by(|a, b| b.index.cmp(&a.index));
        for p in group {
            d.delete_at(&p.norm_local);
        }
    }
    for p in object_deletes {
        d.delete_at(&p.norm_local);
    }
}

fn apply_push<H: Host>(
    host: &H,
    guardian: &mut Guardian,
    drafts: &mut IndexMap<String, Draft>,
    outcome: &mut ApplyOutcome,
    name: &str,
    entries: &IndexMap<String, Vec<Value>>,
) {
    let (root, sub) = root_and_rest(name);
    let Some(d) = drafts.get_mut(&root) else {
        return;
    };
    for (k, vals) in entries {
        let local = join_path(&sub, k);
        let std = normalize_path(&abs_path(&root, &local));

        let mut filtered: Vec<Value> = Vec::new();
        for v in vals {
            let verdict =
                guardian.validate(GuardOp::Push, &std, Some(v), &|p| value_at(host, p));
            if !verdict.allow {
                outcome.deny("push", &std);
                continue;
            }
            filtered.push(verdict.value.unwrap_or_else(|| v.clone()));
        }
        if filtered.is_empty() {
            continue;
        }

        if local.is_empty() {
            // Root pushes de-duplicate against the existing array.
            d.root_push(filtered);
        } else {
            d.push_at(&normalize_path(&local), &filtered);
        }
    }
}

fn apply_bump<H: Host>(
    host: &H,
    guardian: &mut Guardian,
    drafts: &mut IndexMap<String, Draft>,
    outcome: &mut ApplyOutcome,
    name: &str,
    entries: &IndexMap<String, f64>,
) {
    let (root, sub) = root_and_rest(name);
    let Some(d) = drafts.get_mut(&root) else {
        return;
    };
    for (k, delta) in entries {
        if !delta.is_finite() {
            continue;
        }
        let local = join_path(&sub, k);
        let std = normalize_path(&abs_path(&root, &local));
        let verdict = guardian.validate(GuardOp::Bump, &std, Some(&number_value(*delta)), &|p| {
            value_at(host, p)
        });
        if !verdict.allow {
            outcome.deny("bump", &std);
            continue;
        }

        // The guardian clamps against the committed store; re-derive the
        // delta against the draft so the clamped target value is what lands.
        let mut use_delta = *delta;
        if let Some(target) = verdict.value.as_ref().and_then(loose_number) {
            let local_norm = normalize_path(&local);
            let curr = d.current_number_at(&local_norm).unwrap_or(0.0);
            use_delta = target - curr;
        }
        d.bump_at(&normalize_path(&local), use_delta);
    }
}
