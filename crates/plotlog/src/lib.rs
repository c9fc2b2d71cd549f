//! plotlog — a guarded variable-store engine driven by directive blocks
//! embedded in chat messages.
//!
//! Chat messages may carry `<plot-log> … </plot-log>` regions containing
//! mutation directives in JSON, a TOML-like form, or a YAML-like form. The
//! engine parses them into set/push/bump/del operations, validates each one
//! against a per-path rule table (type locks, read-only flags, growth
//! policies, numeric/string constraints), applies what survives to the
//! host's variable store, and keeps per-message snapshots so edits, swipes,
//! and deletions roll state back to the preceding floor.
//!
//! The host application is abstract: see [`host`] for the collaborator
//! traits and [`session::Session`] for the event-driven entry point.

// Leaf utilities
pub mod directive;
pub mod host;
pub mod keys;
pub mod vars;

pub mod apply;
pub mod guard;
pub mod snapshot;

pub mod session;

pub use apply::{apply_variables_for_message, ApplyOutcome};
pub use directive::{extract_blocks, parse_block, signature_of, ParsedOp};
pub use guard::{GuardOp, GuardedVariableStore, Guardian, RuleTable, Verdict};
pub use host::{ChatMessage, Host, MemoryHost, VariableStore};
pub use session::{Event, GenerationKind, Session};
pub use snapshot::{rollback_to_previous_of, SnapshotRecord};
