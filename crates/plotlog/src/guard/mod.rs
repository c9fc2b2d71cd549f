//! The rule table and guardian.
//!
//! A rule node per normalized path carries a type lock, a read-only flag,
//! object/array growth policies, and numeric/string constraints. The
//! [`Guardian`] validates every proposed mutation against the table;
//! [`GuardedVariableStore`] interposes that validation on a host variable
//! API.

pub mod persist;
pub mod rules;
pub mod store;
pub mod tokens;
pub mod validate;

pub use rules::{
    ArrayPolicy, Constraints, ObjectPolicy, RegexConstraint, RuleNode, RuleTable, TypeLock,
};
pub use store::GuardedVariableStore;
pub use tokens::{parse_directive_tokens, rules_from_tree, RuleDelta};
pub use validate::{GuardOp, Guardian, Verdict};
