//! Abstract host collaborators.
//!
//! The engine never talks to a concrete chat application; it runs against the
//! traits below. Values in the variable store are strings — structured data
//! is JSON-encoded and decoded at this boundary.

use serde_json::Value;

pub mod memory;
pub use memory::MemoryHost;

/// The host's variable API.
///
/// This is the store the guardian interposes on; see
/// [`GuardedVariableStore`](crate::guard::GuardedVariableStore).
pub trait VariableStore {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: &str);
    fn delete(&mut self, name: &str);
}

/// One chat message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub is_user: bool,
    pub speaker: String,
}

/// The host's ordered chat sequence, indexed `0..len`.
pub trait ChatStore {
    fn chat_len(&self) -> usize;
    fn message(&self, index: usize) -> Option<ChatMessage>;

    /// Index of the last message, if the chat is non-empty.
    fn last_index(&self) -> Option<usize> {
        self.chat_len().checked_sub(1)
    }
}

/// The host's per-chat metadata dictionary.
///
/// Holds the rule table, snapshot map, applied-fingerprint map, and the
/// variable mirror under reserved keys. Persistence is the host's concern;
/// `save_metadata_debounced` is a hint, not a synchronous flush.
pub trait MetadataStore {
    fn meta_get(&self, key: &str) -> Option<Value>;
    fn meta_set(&mut self, key: &str, value: Value);
    fn meta_remove(&mut self, key: &str);
    fn save_metadata_debounced(&mut self);
}

/// Hooks the engine fires after it has finished mutating state.
///
/// All are opaque collaborators: display refresh, queued-script execution,
/// and the host-visible "message updated" notification the engine emits
/// after its own post-edit refresh.
pub trait HostHooks {
    fn refresh_message_display(&mut self, _index: usize) {}
    fn run_queued_scripts(&mut self) {}
    fn emit_message_updated(&mut self, _index: usize) {}
}

/// The full host surface the engine runs against.
pub trait Host: VariableStore + ChatStore + MetadataStore + HostHooks {}

impl<T: VariableStore + ChatStore + MetadataStore + HostHooks> Host for T {}
