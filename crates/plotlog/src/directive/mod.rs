//! The directive parser: block extraction plus three grammars.
//!
//! Detection order per block: strict/relaxed JSON, then the line-oriented
//! TOML-like grammar, then the indentation-based YAML-like fallback. Each
//! grammar is an isolated [`ParseStrategy`]; the first one that claims the
//! text wins. A block no grammar turns into operations contributes nothing —
//! parsing never fails the message.

pub mod blocks;
pub mod collect;
pub mod json;
pub mod ops;
pub mod scalar;
pub mod toml_like;
pub mod types;
pub mod yaml_like;

pub use blocks::{extract_blocks, signature_of};
pub use collect::OpCollector;
pub use types::{GuardEntry, OpKind, ParsedOp};

use tracing::trace;

/// One grammar in the detection chain.
///
/// `try_parse` returns `None` when the text is not this grammar's to claim;
/// a claimed block yields its operation list (possibly empty).
pub trait ParseStrategy {
    fn name(&self) -> &'static str;
    fn try_parse(&self, text: &str) -> Option<Vec<ParsedOp>>;
}

/// Parses one block's inner text into its operation list.
///
/// Bump-alias preprocessing runs first; the JSON and TOML-like grammars
/// additionally see the text with leading HTML comments stripped.
pub fn parse_block(text: &str) -> Vec<ParsedOp> {
    let pre = ops::preprocess_bump_aliases(text);
    let for_json_toml = ops::strip_leading_html_comments(&pre);

    let structured: [&dyn ParseStrategy; 2] = [&json::JsonStrategy, &toml_like::TomlLikeStrategy];
    for strategy in structured {
        if let Some(parsed) = strategy.try_parse(&for_json_toml) {
            trace!(grammar = strategy.name(), ops = parsed.len(), "block parsed");
            return parsed;
        }
    }

    let parsed = yaml_like::YamlLikeStrategy
        .try_parse(&pre)
        .unwrap_or_default();
    trace!(grammar = "yaml-like", ops = parsed.len(), "block parsed");
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detection_order_prefers_json() {
        // Valid JSON that would also survive the YAML grammar picks JSON.
        let ops = parse_block(r#"{"set": {"a": {"x": 1}}}"#);
        assert!(matches!(
            &ops[0],
            ParsedOp::Set { root, entries } if root == "a" && entries.get("x") == Some(&json!(1))
        ));
    }

    #[test]
    fn toml_gate_claims_bracket_equals_text() {
        let ops = parse_block("[set]\na.x = 1");
        assert!(matches!(&ops[0], ParsedOp::Set { root, .. } if root == "a"));
    }

    #[test]
    fn yaml_is_the_fallback() {
        let ops = parse_block("set:\n  a:\n    x: 1");
        assert!(matches!(&ops[0], ParsedOp::Set { root, .. } if root == "a"));
    }

    #[test]
    fn bump_alias_preprocessing_applies_to_every_grammar() {
        let yaml = parse_block("increase:\n  hero:\n    hp: 2");
        assert!(yaml.iter().any(|op| matches!(op, ParsedOp::Bump { .. })));

        let json = parse_block(r#"{"add": {"hero": {"hp": 2}}}"#);
        assert!(json.iter().any(|op| matches!(op, ParsedOp::Bump { .. })));

        let toml = parse_block("[increment]\nhero.hp = 2");
        assert!(toml.iter().any(|op| matches!(op, ParsedOp::Bump { .. })));
    }

    #[test]
    fn unparseable_text_contributes_nothing() {
        assert!(parse_block("just prose with no structure").is_empty());
        assert!(parse_block("").is_empty());
    }

    #[test]
    fn html_comment_prefix_does_not_hide_json() {
        let ops = parse_block("<!-- meta -->\n{\"set\": {\"a\": {\"x\": 1}}}");
        assert!(matches!(&ops[0], ParsedOp::Set { root, .. } if root == "a"));
    }
}
