//! Operation-name resolution and block text preprocessing.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::types::OpKind;

/// Alias table for operation names: English and CJK spellings map to the four
/// canonical kinds.
fn op_map() -> &'static HashMap<&'static str, OpKind> {
    static MAP: OnceLock<HashMap<&'static str, OpKind>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut m = HashMap::new();
        for alias in ["set", "update", "assign", "设置", "更新"] {
            m.insert(alias, OpKind::Set);
        }
        for alias in ["push", "append", "推入", "添加"] {
            m.insert(alias, OpKind::Push);
        }
        for alias in [
            "bump",
            "inc",
            "increase",
            "increment",
            "add",
            "增加",
            "增减",
        ] {
            m.insert(alias, OpKind::Bump);
        }
        for alias in ["del", "delete", "remove", "删除", "移除"] {
            m.insert(alias, OpKind::Del);
        }
        m
    })
}

/// Resolves an operation name (any known alias, case-insensitive).
pub fn normalize_op_name(name: &str) -> Option<OpKind> {
    op_map().get(name.trim().to_lowercase().as_str()).copied()
}

/// Matches a trimmed line that introduces a new top-level operation scope:
/// a bare known keyword followed by a colon.
pub fn top_op(line: &str) -> Option<OpKind> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^([^\s:]+)\s*:\s*$").unwrap());
    let caps = re.captures(line)?;
    normalize_op_name(&caps[1])
}

/// Rewrites alternate bump spellings to the canonical keyword in the three
/// key positions (line-leading key, section header, quoted JSON key) before
/// any grammar runs.
pub fn preprocess_bump_aliases(text: &str) -> String {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    static SECTION_RE: OnceLock<Regex> = OnceLock::new();
    static JSON_KEY_RE: OnceLock<Regex> = OnceLock::new();

    let line_re = LINE_RE.get_or_init(|| {
        Regex::new(r"(?im)^(\s*)(inc|increase|increment|add|增加|增减)(\s*:)").unwrap()
    });
    let section_re = SECTION_RE.get_or_init(|| {
        Regex::new(r"(?i)\[\s*(inc|increase|increment|add|增加|增减)\s*\]").unwrap()
    });
    let json_key_re = JSON_KEY_RE.get_or_init(|| {
        Regex::new(r#"(?i)"(inc|increase|increment|add|增加|增减)"(\s*:)"#).unwrap()
    });

    let out = line_re.replace_all(text, "${1}bump${3}");
    let out = section_re.replace_all(&out, "[bump]");
    json_key_re.replace_all(&out, "\"bump\"${2}").into_owned()
}

/// Strips a byte-order mark and any leading HTML comments.
pub fn strip_leading_html_comments(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\s*<!--[\s\S]*?-->\s*").unwrap());
    let mut t = text.strip_prefix('\u{feff}').unwrap_or(text);
    while let Some(m) = re.find(t) {
        t = &t[m.end()..];
    }
    t.to_string()
}

/// Removes an inline `#` comment from a scalar right-hand side. Hash marks
/// inside single or double quotes are kept.
pub fn strip_inline_comment(s: &str) -> String {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => escaped = true,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '#') => return s[..i].trim_end().to_string(),
            (None, _) => {}
        }
    }
    s.to_string()
}

/// Removes one layer of matching single or double quotes.
pub fn strip_quotes(s: &str) -> String {
    let t = s.trim();
    if t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')))
    {
        t[1..t.len() - 1].to_string()
    } else {
        t.to_string()
    }
}

/// Splits leading `$…` directive tokens off a raw key.
///
/// A key may carry space-separated `$` tokens before the real name, e.g.
/// `$ro $min=0 hp`. Returns the tokens and the remaining key text (empty
/// when the key was tokens only).
pub fn extract_directives(raw_key: &str) -> (Vec<String>, String) {
    let text = raw_key.trim().trim_end_matches(':').trim();
    let mut directives = Vec::new();
    let mut rest = text;
    loop {
        let trimmed = rest.trim_start();
        if !trimmed.starts_with('$') {
            rest = trimmed;
            break;
        }
        let end = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        directives.push(trimmed[..end].to_string());
        rest = &trimmed[end..];
    }
    (directives, rest.trim().to_string())
}
