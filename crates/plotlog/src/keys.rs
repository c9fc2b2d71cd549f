//! Reserved chat-metadata keys.

/// Rule table mirror.
pub const RULES_KEY: &str = "plotlog_rules";

/// Snapshot map, keyed by message index.
pub const SNAP_KEY: &str = "plotlog_snapshots";

/// Applied-fingerprint map, keyed by message index.
pub const APPLIED_KEY: &str = "plotlog_applied";

/// Variable dictionary mirror.
pub const VARS_KEY: &str = "variables";
