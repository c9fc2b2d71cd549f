//! Indentation-based YAML-like grammar.
//!
//! The fallback strategy: it always claims the block, possibly producing zero
//! operations. A top-level operation keyword opens a scope; indented keys
//! build nested paths; `- ` lines are list items; `|`/`>` right-hand sides
//! open block scalars. Keys may carry leading `$…` guard tokens.

use std::sync::OnceLock;

use plotlog_path::{is_index_str, join_path, normalize_path, root_and_rest};
use regex::Regex;
use serde_json::Value;

use super::collect::OpCollector;
use super::ops::{extract_directives, strip_inline_comment, strip_quotes, top_op};
use super::types::{OpKind, ParsedOp};
use super::ParseStrategy;

pub struct YamlLikeStrategy;

impl ParseStrategy for YamlLikeStrategy {
    fn name(&self) -> &'static str {
        "yaml-like"
    }

    fn try_parse(&self, text: &str) -> Option<Vec<ParsedOp>> {
        Some(parse_yaml_like(text))
    }
}

struct Frame {
    indent: usize,
    path: String,
}

struct PathInfo {
    directives: Vec<String>,
    cur_path: String,
    guard_target: String,
}

/// Resolves a raw key against the enclosing path. Guard tokens target the
/// resolved segment path when the key names one, and the enclosing path when
/// the key is tokens only.
fn build_path_info(raw_key: &str, parent: &str) -> PathInfo {
    let (directives, rest) = extract_directives(raw_key);
    let cur_path = if rest.is_empty() {
        parent.to_string()
    } else {
        join_path(parent, &rest)
    };
    let guard_target = if directives.is_empty() {
        String::new()
    } else if rest.is_empty() && !parent.is_empty() {
        parent.to_string()
    } else {
        cur_path.clone()
    };
    PathInfo {
        directives,
        cur_path,
        guard_target,
    }
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn list_item(trimmed: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^-+\s*(.+)$").unwrap());
    re.captures(trimmed).map(|c| c.get(1).unwrap().as_str())
}

fn looks_like_key(trimmed: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[^\s-][^:]*:\s*(?:\||>.*|.*)?$").unwrap());
    re.is_match(trimmed)
}

fn chars_after(line: &str, n: usize) -> String {
    line.chars().skip(n).collect()
}

/// Folds single newlines to spaces; blank-line breaks survive.
fn fold_newlines(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    for (i, &ch) in chars.iter().enumerate() {
        if ch == '\n' && chars.get(i + 1) != Some(&'\n') {
            out.push(' ');
        } else {
            out.push(ch);
        }
    }
    out
}

/// Consumes consecutive list-item lines deeper than `parent_indent`.
/// Returns the items and the index of the last consumed line.
fn read_list(lines: &[&str], start: usize, parent_indent: usize) -> (Vec<String>, usize) {
    let mut out = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let raw = lines[i];
        let t = raw.trim();
        if t.is_empty() {
            i += 1;
            continue;
        }
        if indent_of(raw) <= parent_indent {
            break;
        }
        match list_item(t) {
            Some(item) => out.push(strip_quotes(&strip_inline_comment(item))),
            None => break,
        }
        i += 1;
    }
    (out, i.saturating_sub(1))
}

/// Consumes a block scalar opened by `|` or `>`.
///
/// Lines more indented than the key are literal content; the block ends at a
/// line at or below the key's indentation that looks like a new key, a list
/// sibling, or a new top-level operation. Other shallow lines are folded in
/// as literal text.
fn read_block_scalar(
    lines: &[&str],
    start: usize,
    parent_indent: usize,
    fold: bool,
) -> (String, usize) {
    let mut out: Vec<String> = Vec::new();
    let mut i = start;
    while i < lines.len() {
        let raw = lines[i];
        let tt = raw.trim();
        if tt.is_empty() {
            out.push(String::new());
            i += 1;
            continue;
        }
        let ind = indent_of(raw);
        if ind <= parent_indent {
            let is_key = looks_like_key(tt);
            let is_list_sibling = tt.starts_with("- ");
            let is_top = parent_indent == 0 && top_op(tt).is_some();
            if is_key || is_list_sibling || is_top {
                break;
            }
            out.push(raw.trim_end().to_string());
            i += 1;
            continue;
        }
        out.push(chars_after(raw, parent_indent + 2));
        i += 1;
    }
    let mut text = out.join("\n");
    if let Some(stripped) = text.strip_prefix('\n') {
        text = stripped.to_string();
    }
    if fold {
        text = fold_newlines(&text);
    }
    (text, i.saturating_sub(1))
}

fn parse_yaml_like(text: &str) -> Vec<ParsedOp> {
    let lines: Vec<&str> = text.lines().collect();
    let mut c = OpCollector::new();
    let mut cur_op: Option<OpKind> = None;
    let mut stack: Vec<Frame> = Vec::new();

    static KV_RE: OnceLock<Regex> = OnceLock::new();
    let kv_re = KV_RE.get_or_init(|| Regex::new(r"^([^:]+):\s*(.*)$").unwrap());

    let mut i = 0;
    while i < lines.len() {
        let raw = lines[i];
        let t = raw.trim();
        if t.is_empty() || t.starts_with('#') {
            i += 1;
            continue;
        }

        let ind = indent_of(raw);
        if ind == 0 {
            if let Some(op) = top_op(t) {
                cur_op = Some(op);
                stack.clear();
                i += 1;
                continue;
            }
        }
        let Some(op) = cur_op else {
            i += 1;
            continue;
        };

        while stack.last().is_some_and(|f| f.indent >= ind) {
            stack.pop();
        }

        if let Some(caps) = kv_re.captures(t) {
            let key = caps.get(1).unwrap().as_str().trim();
            let rhs = strip_inline_comment(caps.get(2).unwrap().as_str());
            let rhs = rhs.trim();
            let parent_path = stack.last().map(|f| f.path.clone()).unwrap_or_default();
            let info = build_path_info(key, &parent_path);

            if !info.directives.is_empty() && !info.guard_target.is_empty() {
                c.record_guard(&info.guard_target, &info.directives);
            }

            let cur_path = normalize_path(&info.cur_path);
            if cur_path.is_empty() {
                i += 1;
                continue;
            }

            // Block scalar.
            if rhs.starts_with('|') || rhs.starts_with('>') {
                let (block, next) = read_block_scalar(&lines, i + 1, ind, rhs.starts_with('>'));
                let (top, rel) = root_and_rest(&cur_path);
                match op {
                    OpKind::Set => c.put_set(&top, &rel, Value::String(block)),
                    OpKind::Push => c.put_push(&top, &rel, Value::String(block)),
                    OpKind::Bump => c.put_bump(&top, &rel, &Value::String(block)),
                    OpKind::Del => {}
                }
                i = next + 1;
                continue;
            }

            // Empty value: nested object, inline list, or (for del) a leaf.
            if rhs.is_empty() {
                stack.push(Frame {
                    indent: ind,
                    path: cur_path.clone(),
                });

                let mut j = i + 1;
                while j < lines.len() && lines[j].trim().is_empty() {
                    j += 1;
                }

                let mut has_deeper = false;

                if j < lines.len() {
                    let t2 = lines[j].trim();
                    let ind2 = indent_of(lines[j]);
                    if ind2 > ind && !t2.is_empty() {
                        has_deeper = true;
                        static DASH_RE: OnceLock<Regex> = OnceLock::new();
                        let dash_re = DASH_RE.get_or_init(|| Regex::new(r"^-+\s+").unwrap());
                        if dash_re.is_match(t2) {
                            let (items, next) = read_list(&lines, j, ind);
                            let (top, rel) = root_and_rest(&cur_path);
                            match op {
                                OpKind::Set => {
                                    let arr: Vec<Value> =
                                        items.iter().cloned().map(Value::String).collect();
                                    c.put_set(&top, &rel, Value::Array(arr));
                                }
                                OpKind::Push => {
                                    for item in &items {
                                        c.put_push(&top, &rel, Value::String(item.clone()));
                                    }
                                }
                                OpKind::Del => {
                                    for item in &items {
                                        let target = if rel.is_empty() {
                                            item.clone()
                                        } else {
                                            join_path(&rel, item)
                                        };
                                        c.put_del(&top, &target);
                                    }
                                }
                                OpKind::Bump => {
                                    for item in &items {
                                        c.put_bump(&top, &rel, &Value::String(item.clone()));
                                    }
                                }
                            }
                            stack.pop();
                            i = next + 1;
                            continue;
                        }
                    }
                }

                if !has_deeper && op == OpKind::Del {
                    let (top, rel) = root_and_rest(&cur_path);
                    c.put_del(&top, &rel);
                    stack.pop();
                }
                i += 1;
                continue;
            }

            // Plain scalar value.
            let (top, rel) = root_and_rest(&cur_path);
            match op {
                OpKind::Set => c.put_set(&top, &rel, Value::String(strip_quotes(rhs))),
                OpKind::Push => c.put_push(&top, &rel, Value::String(strip_quotes(rhs))),
                OpKind::Del => {
                    let val = strip_quotes(rhs);
                    let rel_norm = normalize_path(&rel);
                    let ends_with_index = rel_norm
                        .rsplit('.')
                        .find(|s| !s.is_empty())
                        .is_some_and(is_index_str);
                    if ends_with_index {
                        c.put_del(&top, &rel_norm);
                    } else {
                        let target = if rel_norm.is_empty() {
                            val
                        } else {
                            join_path(&rel_norm, &val)
                        };
                        c.put_del(&top, &target);
                    }
                }
                OpKind::Bump => c.put_bump(&top, &rel, &Value::String(strip_quotes(rhs))),
            }
            i += 1;
            continue;
        }

        if let Some(item) = list_item(t) {
            // Top-level list items delete full paths.
            if stack.is_empty() && op == OpKind::Del {
                let raw_item = strip_quotes(&strip_inline_comment(item));
                if !raw_item.is_empty() {
                    let std = normalize_path(&raw_item);
                    let (top, rel) = root_and_rest(&std);
                    if !top.is_empty() {
                        c.put_del(&top, &rel);
                    }
                }
                i += 1;
                continue;
            }

            if let Some(frame) = stack.last() {
                let (top, rel) = root_and_rest(&frame.path);
                let val = strip_quotes(&strip_inline_comment(item));
                match op {
                    OpKind::Set => {
                        let merged = match c.set_entry_mut(&top, &rel) {
                            Some(Value::Array(arr)) => {
                                arr.push(Value::String(val.clone()));
                                true
                            }
                            Some(prev) => {
                                let old = std::mem::take(prev);
                                *prev = Value::Array(vec![old, Value::String(val.clone())]);
                                true
                            }
                            None => false,
                        };
                        if !merged {
                            c.put_set(&top, &rel, Value::Array(vec![Value::String(val)]));
                        }
                    }
                    OpKind::Push => c.put_push(&top, &rel, Value::String(val)),
                    OpKind::Del => {
                        let target = if rel.is_empty() {
                            val
                        } else {
                            join_path(&rel, &val)
                        };
                        c.put_del(&top, &target);
                    }
                    OpKind::Bump => c.put_bump(&top, &rel, &Value::String(val)),
                }
            }
        }
        i += 1;
    }

    c.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Vec<ParsedOp> {
        parse_yaml_like(text)
    }

    fn first_set(ops: &[ParsedOp]) -> (&str, &indexmap::IndexMap<String, Value>) {
        for op in ops {
            if let ParsedOp::Set { root, entries } = op {
                return (root, entries);
            }
        }
        panic!("no set op in {ops:?}");
    }

    #[test]
    fn nothing_before_the_first_operation_line() {
        let ops = parse("hp: 10\nset:\n  hero:\n    hp: 10");
        let (root, entries) = first_set(&ops);
        assert_eq!(root, "hero");
        assert_eq!(entries.get("hp"), Some(&json!("10")));
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn indentation_builds_nested_paths() {
        let ops = parse("set:\n  hero:\n    stats:\n      hp: 10\n      mp: 5\n    name: Ash");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("stats.hp"), Some(&json!("10")));
        assert_eq!(entries.get("stats.mp"), Some(&json!("5")));
        assert_eq!(entries.get("name"), Some(&json!("Ash")));
    }

    #[test]
    fn dedent_closes_scopes() {
        let ops = parse("set:\n  hero:\n    hp: 1\n  world:\n    day: 2");
        assert_eq!(ops.len(), 2);
        assert!(matches!(
            &ops[1],
            ParsedOp::Set { root, entries } if root == "world" && entries.contains_key("day")
        ));
    }

    #[test]
    fn inline_lists_become_arrays() {
        let ops = parse("set:\n  hero:\n    tags:\n      - brave\n      - tired");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("tags"), Some(&json!(["brave", "tired"])));
    }

    #[test]
    fn literal_block_scalar_joins_with_newlines() {
        let ops = parse("set:\n  hero:\n    bio: |\n      line one\n      line two\n    hp: 3");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("bio"), Some(&json!("line one\nline two")));
        assert_eq!(entries.get("hp"), Some(&json!("3")));
    }

    #[test]
    fn folded_block_scalar_joins_with_spaces() {
        let ops = parse("set:\n  hero:\n    bio: >\n      line one\n      line two");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("bio"), Some(&json!("line one line two")));
    }

    #[test]
    fn block_scalar_ends_at_new_top_operation() {
        let ops = parse("set:\n  note: |\n    remember\nbump:\n  hero:\n    hp: 2");
        // The scalar lands on the root variable itself (empty relative path).
        assert!(ops.iter().any(|op| matches!(
            op,
            ParsedOp::Set { root, entries } if root == "note" && entries.get("") == Some(&json!("remember"))
        )));
        assert!(ops
            .iter()
            .any(|op| matches!(op, ParsedOp::Bump { root, .. } if root == "hero")));
    }

    #[test]
    fn guard_tokens_scope_to_resolved_path() {
        let ops = parse("set:\n  stats:\n    $ro hp: 10");
        assert!(ops.iter().any(|op| matches!(
            op,
            ParsedOp::Guard { entries } if entries[0].path == "stats.hp"
                && entries[0].directives == vec!["$ro".to_string()]
        )));
        let (root, entries) = first_set(&ops);
        assert_eq!(root, "stats");
        assert_eq!(entries.get("hp"), Some(&json!("10")));
    }

    #[test]
    fn directive_only_key_guards_enclosing_path() {
        let ops = parse("set:\n  stats:\n    $lock:\n      hp: 1");
        assert!(ops.iter().any(|op| matches!(
            op,
            ParsedOp::Guard { entries } if entries[0].path == "stats"
        )));
    }

    #[test]
    fn del_scalar_value_becomes_final_segment() {
        let ops = parse("del:\n  hero:\n    buffs: haste");
        assert_eq!(
            ops,
            vec![ParsedOp::Del {
                root: "hero".into(),
                paths: vec!["buffs.haste".into()],
            }]
        );
    }

    #[test]
    fn del_numeric_tail_deletes_the_index() {
        let ops = parse("del:\n  hero:\n    buffs[1]: anything");
        assert_eq!(
            ops,
            vec![ParsedOp::Del {
                root: "hero".into(),
                paths: vec!["buffs.1".into()],
            }]
        );
    }

    #[test]
    fn del_leaf_key_with_no_children() {
        let ops = parse("del:\n  hero:\n    buffs:");
        assert_eq!(
            ops,
            vec![ParsedOp::Del {
                root: "hero".into(),
                paths: vec!["buffs".into()],
            }]
        );
    }

    #[test]
    fn del_top_level_list_items_are_full_paths() {
        let ops = parse("del:\n- hero.buffs[0]\n- world.flag");
        assert_eq!(ops.len(), 2);
        assert!(ops.contains(&ParsedOp::Del {
            root: "hero".into(),
            paths: vec!["buffs.0".into()],
        }));
        assert!(ops.contains(&ParsedOp::Del {
            root: "world".into(),
            paths: vec!["flag".into()],
        }));
    }

    #[test]
    fn repeated_list_items_merge_into_one_array() {
        let ops = parse("set:\n  hero:\n    tags: first\n");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("tags"), Some(&json!("first")));

        let ops = parse("set:\n  hero:\n    tags:\n      - one\n      - two\n");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("tags"), Some(&json!(["one", "two"])));
    }

    #[test]
    fn bump_values_accumulate() {
        let ops = parse("bump:\n  hero:\n    hp: +2\n    hp: 3");
        assert!(ops.iter().any(|op| matches!(
            op,
            ParsedOp::Bump { entries, .. } if entries.get("hp") == Some(&5.0)
        )));
    }

    #[test]
    fn comments_are_stripped_from_values() {
        let ops = parse("set:\n  hero:\n    hp: 10 # max\n# full line comment\n    mp: 4");
        let (_, entries) = first_set(&ops);
        assert_eq!(entries.get("hp"), Some(&json!("10")));
        assert_eq!(entries.get("mp"), Some(&json!("4")));
    }

    #[test]
    fn localized_operation_aliases_open_scopes() {
        let ops = parse("设置:\n  hero:\n    hp: 9");
        let (root, entries) = first_set(&ops);
        assert_eq!(root, "hero");
        assert_eq!(entries.get("hp"), Some(&json!("9")));
    }
}
