//! Line-oriented TOML-like grammar.
//!
//! Second in the detection chain; runs only when the block contains both a
//! `[` and a `=`. Section headers name the current operation; `key = value`
//! lines below feed it. Dotted keys address nested paths; quoted segments are
//! unwrapped. Once the gate matches, the block is claimed even if no line
//! produced an operation.
//!
//! Comment handling diverges from the YAML grammar on purpose: a right-hand
//! side containing a triple-quote marker is exempt from inline-comment
//! stripping, and such lines contribute no value at all.

use std::sync::OnceLock;

use plotlog_path::normalize_path;
use regex::Regex;
use serde_json::Value;

use super::collect::OpCollector;
use super::ops::{extract_directives, normalize_op_name, strip_inline_comment, strip_quotes};
use super::types::{OpKind, ParsedOp};
use super::ParseStrategy;

pub struct TomlLikeStrategy;

impl ParseStrategy for TomlLikeStrategy {
    fn name(&self) -> &'static str {
        "toml-like"
    }

    fn try_parse(&self, text: &str) -> Option<Vec<ParsedOp>> {
        let src = text.trim();
        if src.is_empty() || !src.contains('[') || !src.contains('=') {
            return None;
        }

        static SECTION_RE: OnceLock<Regex> = OnceLock::new();
        let section_re = SECTION_RE.get_or_init(|| Regex::new(r"\[\s*([^\]]+)\s*\]$").unwrap());

        let mut c = OpCollector::new();
        let mut cur_op: Option<OpKind> = None;

        for raw in src.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(caps) = section_re.captures(line) {
                cur_op = normalize_op_name(&caps[1]);
                continue;
            }
            let Some(op) = cur_op else {
                continue;
            };

            let Some((key_raw, rhs_raw)) = line.split_once('=') else {
                continue;
            };

            let has_triple = rhs_raw.contains("\"\"\"") || rhs_raw.contains("'''");
            let rhs = if has_triple {
                rhs_raw.to_string()
            } else {
                strip_inline_comment(rhs_raw)
            };

            let cleaned = strip_quotes(key_raw.trim());
            let (directives, rest) = extract_directives(&cleaned);
            let core = if rest.is_empty() { cleaned.clone() } else { rest };
            let segs: Vec<String> = core
                .split('.')
                .map(|s| strip_quotes(s.trim()))
                .filter(|s| !s.is_empty())
                .collect();
            if segs.is_empty() {
                continue;
            }

            let top = segs[0].clone();
            let rel_norm = normalize_path(&segs[1..].join("."));
            let full_norm = normalize_path(&segs.join("."));

            if !directives.is_empty() {
                c.record_guard(&full_norm, &directives);
            }

            if has_triple {
                continue;
            }

            let value = parse_toml_value(&rhs);
            match op {
                OpKind::Set => c.put_set(&top, &rel_norm, value),
                OpKind::Push => c.put_push(&top, &rel_norm, value),
                OpKind::Bump => c.put_bump(&top, &rel_norm, &value),
                OpKind::Del => {
                    let rel = if rel_norm.is_empty() {
                        full_norm
                    } else {
                        rel_norm
                    };
                    c.put_del(&top, &rel);
                }
            }
        }

        Some(c.finalize())
    }
}

/// Reads one right-hand side: booleans, integers, floats, quoted strings
/// (double quotes unescape, single quotes stay literal), bracketed arrays via
/// a JSON parse with single quotes rewritten, and bare strings otherwise.
fn parse_toml_value(raw: &str) -> Value {
    let v = raw.trim();
    match v {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    static INT_RE: OnceLock<Regex> = OnceLock::new();
    static FLOAT_RE: OnceLock<Regex> = OnceLock::new();
    let int_re = INT_RE.get_or_init(|| Regex::new(r"^-?\d+$").unwrap());
    let float_re = FLOAT_RE.get_or_init(|| Regex::new(r"^-?\d+\.\d+$").unwrap());

    if int_re.is_match(v) {
        if let Ok(i) = v.parse::<i64>() {
            return Value::Number(serde_json::Number::from(i));
        }
    }
    if float_re.is_match(v) {
        if let Ok(f) = v.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }

    let double = v.starts_with('"') && v.ends_with('"') && v.len() >= 2;
    let single = v.starts_with('\'') && v.ends_with('\'') && v.len() >= 2;
    if double || single {
        let inner = &v[1..v.len() - 1];
        return Value::String(if double {
            inner
                .replace("\\n", "\n")
                .replace("\\t", "\t")
                .replace("\\\"", "\"")
                .replace("\\'", "'")
                .replace("\\\\", "\\")
        } else {
            inner.to_string()
        });
    }

    if v.starts_with('[') && v.ends_with(']') {
        if let Ok(arr) = serde_json::from_str::<Value>(&v.replace('\'', "\"")) {
            return arr;
        }
        return Value::String(v.to_string());
    }

    Value::String(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> Vec<ParsedOp> {
        TomlLikeStrategy.try_parse(text).expect("gate should match")
    }

    #[test]
    fn gate_requires_bracket_and_equals() {
        assert!(TomlLikeStrategy.try_parse("set:\n  hp: 1").is_none());
        assert!(TomlLikeStrategy.try_parse("[set]").is_none());
        assert!(TomlLikeStrategy.try_parse("a = 1").is_none());
    }

    #[test]
    fn sections_route_key_values() {
        let ops = parse("[set]\nhero.hp = 10\nhero.name = \"Ash\"\n[bump]\nhero.mp = 2");
        match &ops[0] {
            ParsedOp::Set { root, entries } => {
                assert_eq!(root, "hero");
                assert_eq!(entries.get("hp"), Some(&json!(10)));
                assert_eq!(entries.get("name"), Some(&json!("Ash")));
            }
            other => panic!("unexpected op: {other:?}"),
        }
        match &ops[1] {
            ParsedOp::Bump { entries, .. } => assert_eq!(entries.get("mp"), Some(&2.0)),
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn values_parse_typed() {
        assert_eq!(parse_toml_value("true"), json!(true));
        assert_eq!(parse_toml_value("-7"), json!(-7));
        assert_eq!(parse_toml_value("1.25"), json!(1.25));
        assert_eq!(parse_toml_value("\"a\\nb\""), json!("a\nb"));
        assert_eq!(parse_toml_value("'a\\nb'"), json!("a\\nb"));
        assert_eq!(parse_toml_value("['x', 'y']"), json!(["x", "y"]));
        assert_eq!(parse_toml_value("bare"), json!("bare"));
    }

    #[test]
    fn comments_are_stripped_outside_triple_quotes() {
        let ops = parse("[set]\nhero.hp = 10 # full health");
        match &ops[0] {
            ParsedOp::Set { entries, .. } => assert_eq!(entries.get("hp"), Some(&json!(10))),
            other => panic!("unexpected op: {other:?}"),
        }

        // Triple-quoted right-hand sides are claimed by the key but record no
        // value.
        let ops = parse("[set]\nhero.bio = \"\"\"long # text\"\"\"");
        assert!(ops.is_empty());
    }

    #[test]
    fn single_segment_del_repeats_the_root() {
        // A one-segment del key falls back to the full path as its relative
        // part, addressing `root.root`.
        let ops = parse("[del]\nhero =");
        assert_eq!(
            ops,
            vec![ParsedOp::Del {
                root: "hero".into(),
                paths: vec!["hero".into()],
            }]
        );
    }

    #[test]
    fn guard_tokens_record_against_full_key_path() {
        let ops = parse("[set]\n$ro hero.hp = 10");
        assert!(ops.iter().any(|op| matches!(
            op,
            ParsedOp::Guard { entries } if entries[0].path == "hero.hp"
        )));
    }

    #[test]
    fn unknown_sections_swallow_their_lines() {
        let ops = parse("[mystery]\nhero.hp = 10\n[set]\nhero.mp = 5");
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            ParsedOp::Set { entries, .. } => {
                assert!(entries.contains_key("mp"));
                assert!(!entries.contains_key("hp"));
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }
}
