//! Strict/relaxed JSON grammar.
//!
//! The first strategy in the detection chain. Strict JSON is attempted as-is;
//! on failure a relaxed pass quotes bare-word values (`{"a": ready}` becomes
//! `{"a": "ready"}`) and the parse is retried once.

use std::sync::OnceLock;

use indexmap::IndexSet;
use plotlog_path::{join_path, normalize_path, root_and_rest};
use regex::Regex;
use serde_json::Value;

use super::collect::OpCollector;
use super::ops::normalize_op_name;
use super::scalar::loose_string;
use super::types::{OpKind, ParsedOp};
use super::ParseStrategy;

pub struct JsonStrategy;

impl ParseStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn try_parse(&self, text: &str) -> Option<Vec<ParsedOp>> {
        let s = text.trim();
        if !s.starts_with('{') && !s.starts_with('[') {
            return None;
        }
        if let Ok(data) = serde_json::from_str::<Value>(s) {
            return Some(process_structured(&data));
        }
        let relaxed = relax_json(s);
        if relaxed == s {
            return None;
        }
        let data = serde_json::from_str::<Value>(&relaxed).ok()?;
        Some(process_structured(&data))
    }
}

fn is_bare_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || !c.is_ascii()
}

fn is_stop(c: char) -> bool {
    matches!(c, ',' | '}' | ']' | ':') || c.is_whitespace()
}

fn num_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").unwrap())
}

/// Quotes bare-word values after colons so near-JSON text survives a strict
/// parse. Content inside strings is untouched; `true`/`false`/`null` and
/// numeric tokens stay bare.
fn relax_json(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 8);
    let mut i = 0;
    let mut in_str = false;
    let mut quote = '\0';
    let mut esc = false;

    while i < chars.len() {
        let ch = chars[i];
        if in_str {
            out.push(ch);
            if esc {
                esc = false;
            } else if ch == '\\' {
                esc = true;
            } else if ch == quote {
                in_str = false;
            }
            i += 1;
            continue;
        }
        if ch == '"' || ch == '\'' {
            in_str = true;
            quote = ch;
            out.push(ch);
            i += 1;
            continue;
        }
        if ch == ':' {
            out.push(ch);
            i += 1;
            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                out.push(chars[j]);
                j += 1;
            }
            if j >= chars.len() || !is_bare_start(chars[j]) {
                i = j;
                continue;
            }
            let mut k = j;
            while k < chars.len() && !is_stop(chars[k]) {
                k += 1;
            }
            let tok: String = chars[j..k].iter().collect();
            let low = tok.to_lowercase();
            if low == "true" || low == "false" || low == "null" || num_re().is_match(&tok) {
                out.push_str(&tok);
            } else {
                out.push('"');
                out.push_str(&tok.replace('\\', "\\\\").replace('"', "\\\""));
                out.push('"');
            }
            i = k;
            continue;
        }
        out.push(ch);
        i += 1;
    }
    out
}

/// Key/value pairs of a container: object keys, or array indices rendered as
/// keys.
fn entries_of(v: &Value) -> Vec<(String, &Value)> {
    match v {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn process_structured(data: &Value) -> Vec<ParsedOp> {
    let mut c = OpCollector::new();
    match data {
        Value::Array(entries) => {
            for entry in entries {
                if entry.is_object() {
                    process_entry(entry, &mut c);
                }
            }
        }
        other => process_entry(other, &mut c),
    }
    c.finalize()
}

fn process_entry(data: &Value, c: &mut OpCollector) {
    let Some(map) = data.as_object() else {
        return;
    };
    for (key, v) in map {
        let Some(op) = normalize_op_name(key) else {
            continue;
        };
        if v.is_null() {
            continue;
        }

        // Top-level del lists carry full paths.
        if op == OpKind::Del {
            if let Value::Array(items) = v {
                for it in items {
                    let std = normalize_path(&loose_string(it));
                    let (top, rel) = root_and_rest(&std);
                    if !top.is_empty() {
                        c.put_del(&top, &rel);
                    }
                }
                continue;
            }
        }

        if !v.is_object() && !v.is_array() {
            continue;
        }

        for (raw_top, payload) in entries_of(v) {
            let top = c.decode_key(&raw_top);
            match op {
                OpKind::Push => match payload {
                    Value::Array(items) => {
                        for it in items {
                            c.put_push(&top, "", it.clone());
                        }
                    }
                    Value::Object(_) => walk_push(c, &top, payload, ""),
                    other => c.put_push(&top, "", other.clone()),
                },
                OpKind::Bump if !payload.is_object() => c.put_bump(&top, "", payload),
                OpKind::Bump => walk_bump(c, &top, payload, ""),
                OpKind::Del => {
                    if payload.is_object() || payload.is_array() {
                        walk_del(c, payload, &top);
                    } else {
                        let base = normalize_path(&top);
                        if base.is_empty() {
                            continue;
                        }
                        let val = loose_string(payload);
                        let full = if payload.is_null() || val.trim().is_empty() {
                            base
                        } else {
                            normalize_path(&join_path(&base, val.trim()))
                        };
                        let (t, rel) = root_and_rest(&full);
                        if !t.is_empty() {
                            c.put_del(&t, &rel);
                        }
                    }
                }
                OpKind::Set => walk_set(c, &top, payload, ""),
            }
        }
    }
}

fn walk_set(c: &mut OpCollector, top: &str, node: &Value, base: &str) {
    match node {
        Value::Null => {}
        Value::Object(map) => {
            for (raw_k, v) in map {
                let k = c.decode_key(raw_k);
                let p = normalize_path(&join_path(base, &k));
                match v {
                    Value::Array(_) => c.put_set(top, &p, v.clone()),
                    Value::Object(_) => walk_set(c, top, v, &p),
                    other => c.put_set(top, &p, other.clone()),
                }
            }
        }
        other => c.put_set(top, &normalize_path(base), other.clone()),
    }
}

fn walk_push(c: &mut OpCollector, top: &str, node: &Value, base: &str) {
    let Some(map) = node.as_object() else {
        return;
    };
    for (raw_k, v) in map {
        let k = c.decode_key(raw_k);
        let p = normalize_path(&join_path(base, &k));
        match v {
            Value::Array(items) => {
                for it in items {
                    c.put_push(top, &p, it.clone());
                }
            }
            Value::Object(_) => walk_push(c, top, v, &p),
            other => c.put_push(top, &p, other.clone()),
        }
    }
}

fn walk_bump(c: &mut OpCollector, top: &str, node: &Value, base: &str) {
    let Some(map) = node.as_object() else {
        return;
    };
    for (raw_k, v) in map {
        let k = c.decode_key(raw_k);
        let p = normalize_path(&join_path(base, &k));
        match v {
            Value::Object(_) => walk_bump(c, top, v, &p),
            other => c.put_bump(top, &p, other),
        }
    }
}

/// Flattens a del payload into full paths, then splits each into root and
/// relative parts. Array entries are path segments (or recursions); object
/// values become the final segment of their key's path.
fn walk_del(c: &mut OpCollector, node: &Value, base: &str) {
    let mut acc: IndexSet<String> = IndexSet::new();
    collect_del(c, node, base, &mut acc);
    for p in acc {
        let (top, rel) = root_and_rest(&p);
        if !top.is_empty() {
            c.put_del(&top, &rel);
        }
    }
}

fn collect_del(c: &mut OpCollector, node: &Value, base: &str, acc: &mut IndexSet<String>) {
    match node {
        Value::Array(items) => {
            for it in items {
                match it {
                    Value::String(s) => {
                        let seg = c.decode_key(s);
                        let full = join_path(base, &seg);
                        if !full.is_empty() {
                            acc.insert(normalize_path(&full));
                        }
                    }
                    Value::Number(n) => {
                        let full = join_path(base, &n.to_string());
                        if !full.is_empty() {
                            acc.insert(normalize_path(&full));
                        }
                    }
                    Value::Object(_) | Value::Array(_) => collect_del(c, it, base, acc),
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            for (raw_k, v) in map {
                let k = c.decode_key(raw_k);
                let next_base = join_path(base, &k);
                if v.is_object() || v.is_array() {
                    collect_del(c, v, &next_base, acc);
                } else {
                    let val = match v {
                        Value::Null => String::new(),
                        other => loose_string(other),
                    };
                    let val = val.trim();
                    if !val.is_empty() {
                        acc.insert(normalize_path(&join_path(&next_base, val)));
                    } else if !next_base.is_empty() {
                        acc.insert(normalize_path(&next_base));
                    }
                }
            }
        }
        _ => {
            if !base.is_empty() {
                acc.insert(normalize_path(base));
            }
        }
    }
}
