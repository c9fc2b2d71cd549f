//! Directive-block extraction from raw message text.
//!
//! Blocks are delimited by a case-insensitive `<plot-log> … </plot-log>` tag
//! pair; everything outside the tags is inert prose.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<\s*plot-log[^>]*>(.*?)<\s*/\s*plot-log\s*>").unwrap())
}

/// Extracts the inner content of every non-blank directive block.
pub fn extract_blocks(text: &str) -> Vec<String> {
    tag_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let inner = caps.get(1).map_or("", |m| m.as_str());
            if inner.trim().is_empty() {
                None
            } else {
                Some(inner.to_string())
            }
        })
        .collect()
}

/// The message's directive fingerprint: every block (tags included) trimmed
/// and concatenated. Empty when the text carries no blocks. Reapplying a
/// message whose fingerprint is unchanged is a no-op.
pub fn signature_of(text: &str) -> String {
    let chunks: Vec<&str> = tag_re()
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .collect();
    if chunks.is_empty() {
        String::new()
    } else {
        chunks.join("\n---\n")
    }
}
