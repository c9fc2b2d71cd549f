//! Rule-table persistence into chat metadata.

use crate::host::Host;
use crate::keys::RULES_KEY;

use super::validate::Guardian;

/// Mirrors the rule table into metadata.
pub fn save_rules<H: Host>(host: &mut H, guardian: &Guardian) {
    host.meta_set(RULES_KEY, guardian.table.to_value());
    host.save_metadata_debounced();
}

/// Reloads the rule table from metadata (rebuilding the compiled-regex
/// cache). A missing or corrupt mirror loads as an empty table.
pub fn load_rules<H: Host>(host: &H, guardian: &mut Guardian) {
    match host.meta_get(RULES_KEY) {
        Some(value) => guardian.table.load_value(&value),
        None => guardian.table.clear(),
    }
}

/// Saves only when the guardian accumulated changes since the last sync.
pub fn save_rules_if_dirty<H: Host>(host: &mut H, guardian: &mut Guardian) {
    if guardian.take_dirty() {
        save_rules(host, guardian);
    }
}
