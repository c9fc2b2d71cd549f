//! The `$…` directive-token grammar and rule deltas.
//!
//! Tokens appear ahead of keys in directive blocks (`$ro $min=0 hp: 10`) or
//! as `$`-prefixed keys inside structured values written through the guarded
//! store. Each token list folds into a [`RuleDelta`] merged onto the target
//! path's rule node.
//!
//! | token | effect |
//! |---|---|
//! | `$ro` | read-only |
//! | `$ext` / `$prune` / `$free` | object growth policy |
//! | `$grow` / `$shrink` / `$list` | array growth policy |
//! | `$min=N` / `$max=N` / `$step=N` | numeric constraints |
//! | `$enum=a\|b\|c` | string enumeration |
//! | `$re=/pat/flags` (or `$re=pat`, `$regex=pat`) | string pattern |
//! | `$clear` | drop the node before applying the rest |

use plotlog_path::normalize_path;
use serde_json::{Map, Value};
use tracing::debug;

use super::rules::{ArrayPolicy, ObjectPolicy, RegexConstraint, RuleTable};

/// A pending change to one rule node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleDelta {
    pub clear: bool,
    pub ro: bool,
    pub object_policy: Option<ObjectPolicy>,
    pub array_policy: Option<ArrayPolicy>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub one_of: Option<Vec<String>>,
    pub regex: Option<RegexConstraint>,
}

impl RuleDelta {
    pub fn is_empty(&self) -> bool {
        *self == RuleDelta::default()
    }

    /// Overlays `other` on `self`; set fields in `other` win.
    pub fn merge(&mut self, other: RuleDelta) {
        self.clear |= other.clear;
        self.ro |= other.ro;
        if other.object_policy.is_some() {
            self.object_policy = other.object_policy;
        }
        if other.array_policy.is_some() {
            self.array_policy = other.array_policy;
        }
        if other.min.is_some() {
            self.min = other.min;
        }
        if other.max.is_some() {
            self.max = other.max;
        }
        if other.step.is_some() {
            self.step = other.step;
        }
        if other.one_of.is_some() {
            self.one_of = other.one_of;
        }
        if other.regex.is_some() {
            self.regex = other.regex;
        }
    }
}

/// Parses `$…` tokens into a delta. Unknown tokens are ignored with a debug
/// log; a delta may come out empty.
pub fn parse_directive_tokens(tokens: &[String]) -> RuleDelta {
    let mut delta = RuleDelta::default();
    for raw in tokens {
        let tok = raw.trim();
        let Some(body) = tok.strip_prefix('$') else {
            continue;
        };
        let (name, arg) = match body.split_once('=') {
            Some((n, a)) => (n, Some(a)),
            None => (body, None),
        };
        match (name.to_lowercase().as_str(), arg) {
            ("ro", _) => delta.ro = true,
            ("clear", _) => delta.clear = true,
            ("ext", _) => delta.object_policy = Some(ObjectPolicy::Ext),
            ("prune", _) => delta.object_policy = Some(ObjectPolicy::Prune),
            ("free", _) => delta.object_policy = Some(ObjectPolicy::Free),
            ("grow", _) => delta.array_policy = Some(ArrayPolicy::Grow),
            ("shrink", _) => delta.array_policy = Some(ArrayPolicy::Shrink),
            ("list", _) => delta.array_policy = Some(ArrayPolicy::List),
            ("min", Some(a)) => delta.min = a.parse().ok(),
            ("max", Some(a)) => delta.max = a.parse().ok(),
            ("step", Some(a)) => delta.step = a.parse().ok(),
            ("enum", Some(a)) => {
                let values: Vec<String> = a
                    .split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !values.is_empty() {
                    delta.one_of = Some(values);
                }
            }
            ("re" | "regex", Some(a)) => delta.regex = Some(parse_regex_arg(a)),
            _ => debug!(token = tok, "unknown guard directive token"),
        }
    }
    delta
}

/// `/pat/flags` form or a bare pattern.
fn parse_regex_arg(arg: &str) -> RegexConstraint {
    if let Some(rest) = arg.strip_prefix('/') {
        if let Some(slash) = rest.rfind('/') {
            return RegexConstraint {
                source: rest[..slash].to_string(),
                flags: rest[slash + 1..].to_string(),
            };
        }
    }
    RegexConstraint {
        source: arg.to_string(),
        flags: String::new(),
    }
}

/// Merges a delta into the table, creating the node as needed. `$clear`
/// drops the node first; a clear-only delta just deletes it.
pub fn apply_delta(table: &mut RuleTable, path: &str, delta: &RuleDelta) {
    let p = normalize_path(path);
    if delta.clear {
        table.remove(&p);
    }

    let has_other = delta.ro
        || delta.object_policy.is_some()
        || delta.array_policy.is_some()
        || delta.min.is_some()
        || delta.max.is_some()
        || delta.step.is_some()
        || delta.one_of.is_some()
        || delta.regex.is_some();
    if !has_other {
        return;
    }

    let node = table.ensure(&p);
    if delta.ro {
        node.ro = true;
    }
    if let Some(policy) = delta.object_policy {
        node.object_policy = policy;
    }
    if let Some(policy) = delta.array_policy {
        node.array_policy = policy;
    }
    if let Some(min) = delta.min {
        node.constraints.min = Some(min);
    }
    if let Some(max) = delta.max {
        node.constraints.max = Some(max);
    }
    if let Some(step) = delta.step {
        node.constraints.step = Some(step.abs());
    }
    if let Some(one_of) = &delta.one_of {
        node.constraints.one_of = Some(one_of.clone());
    }
    if let Some(regex) = &delta.regex {
        node.constraints.regex = Some(regex.clone());
        let _ = table.compiled_regex(&p);
    }
}

/// Splits `$…` rule keys out of a structured value.
///
/// A `$` key's text is `$dir… target`: directive tokens followed by the
/// target segment (absolute when it already extends the current path). The
/// returned value has every `$` key stripped at all depths; the deltas are
/// keyed by normalized absolute path.
pub fn rules_from_tree(tree: &Value, base_path: &str) -> (Value, Vec<(String, RuleDelta)>) {
    let mut deltas: Vec<(String, RuleDelta)> = Vec::new();
    walk(tree, base_path, &mut deltas);
    (strip_dollar_keys(tree), deltas)
}

fn merge_delta(deltas: &mut Vec<(String, RuleDelta)>, path: String, delta: RuleDelta) {
    if let Some((_, existing)) = deltas.iter_mut().find(|(p, _)| *p == path) {
        existing.merge(delta);
    } else {
        deltas.push((path, delta));
    }
}

fn walk(node: &Value, cur_abs: &str, deltas: &mut Vec<(String, RuleDelta)>) {
    let Some(map) = node.as_object() else {
        return;
    };
    for (key, v) in map {
        let key_str = key.trim();
        if !key_str.starts_with('$') {
            let child = if cur_abs.is_empty() {
                key_str.to_string()
            } else {
                format!("{cur_abs}.{key_str}")
            };
            if v.is_object() {
                walk(v, &child, deltas);
            }
            continue;
        }

        let rest = key_str[1..].trim();
        if rest.is_empty() {
            continue;
        }
        let mut parts: Vec<&str> = rest.split_whitespace().collect();
        let Some(target_token) = parts.pop() else {
            continue;
        };
        let dirs: Vec<String> = parts
            .iter()
            .map(|t| {
                if t.starts_with('$') {
                    (*t).to_string()
                } else {
                    format!("${t}")
                }
            })
            .collect();

        let base_norm = normalize_path(cur_abs);
        let token_norm = normalize_path(target_token);
        let target_path = if !base_norm.is_empty()
            && (token_norm == base_norm || token_norm.starts_with(&format!("{base_norm}.")))
        {
            token_norm
        } else if cur_abs.is_empty() {
            target_token.to_string()
        } else {
            format!("{cur_abs}.{target_token}")
        };
        let abs = normalize_path(&target_path);
        merge_delta(deltas, abs.clone(), parse_directive_tokens(&dirs));

        if v.is_object() {
            walk(v, &abs, deltas);
        }
    }
}

fn strip_dollar_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(strip_dollar_keys).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                if k.trim().starts_with('$') {
                    continue;
                }
                out.insert(k.clone(), strip_dollar_keys(v));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toks(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tokens_fold_into_a_delta() {
        let delta = parse_directive_tokens(&toks(&["$ro", "$min=0", "$max=100", "$step=5"]));
        assert!(delta.ro);
        assert_eq!(delta.min, Some(0.0));
        assert_eq!(delta.max, Some(100.0));
        assert_eq!(delta.step, Some(5.0));
    }

    #[test]
    fn enum_and_regex_tokens() {
        let delta = parse_directive_tokens(&toks(&["$enum=calm|angry", "$re=/^x+$/i"]));
        assert_eq!(delta.one_of, Some(vec!["calm".into(), "angry".into()]));
        let re = delta.regex.unwrap();
        assert_eq!(re.source, "^x+$");
        assert_eq!(re.flags, "i");
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let delta = parse_directive_tokens(&toks(&["$sparkle", "plain"]));
        assert!(delta.is_empty());
    }

    #[test]
    fn clear_drops_the_node_before_merging() {
        let mut table = RuleTable::new();
        table.ensure("hp").ro = true;

        apply_delta(&mut table, "hp", &parse_directive_tokens(&toks(&["$clear"])));
        assert!(table.node("hp").is_none());

        apply_delta(
            &mut table,
            "hp",
            &parse_directive_tokens(&toks(&["$clear", "$min=1"])),
        );
        let node = table.node("hp").unwrap();
        assert!(!node.ro);
        assert_eq!(node.constraints.min, Some(1.0));
    }

    #[test]
    fn step_is_stored_as_magnitude() {
        let mut table = RuleTable::new();
        apply_delta(
            &mut table,
            "hp",
            &parse_directive_tokens(&toks(&["$step=-5"])),
        );
        assert_eq!(table.node("hp").unwrap().constraints.step, Some(5.0));
    }

    #[test]
    fn tree_rules_split_out_and_strip() {
        let tree = json!({
            "stats": {
                "$ro min=0 hp": {"$list buffs": 1},
                "mp": 5
            }
        });
        let (clean, deltas) = rules_from_tree(&tree, "hero");
        assert_eq!(clean, json!({"stats": {"mp": 5}}));

        let hp = deltas
            .iter()
            .find(|(p, _)| p == "hero.stats.hp")
            .map(|(_, d)| d)
            .unwrap();
        assert!(hp.ro);
        assert_eq!(hp.min, Some(0.0));

        let buffs = deltas
            .iter()
            .find(|(p, _)| p == "hero.stats.hp.buffs")
            .map(|(_, d)| d)
            .unwrap();
        assert_eq!(buffs.array_policy, Some(ArrayPolicy::List));
    }

    #[test]
    fn absolute_target_tokens_are_not_rejoined() {
        let tree = json!({"$ro hero.stats.hp": null});
        let (_, deltas) = rules_from_tree(&tree, "hero");
        assert_eq!(deltas[0].0, "hero.stats.hp");
    }
}
