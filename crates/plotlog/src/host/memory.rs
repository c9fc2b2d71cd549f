//! In-memory host used by tests and examples.

use indexmap::IndexMap;
use serde_json::Value;

use super::{ChatMessage, ChatStore, HostHooks, MetadataStore, VariableStore};

/// A self-contained [`Host`](super::Host) with no persistence.
///
/// Hook invocations are recorded so tests can assert on them.
#[derive(Debug, Default)]
pub struct MemoryHost {
    pub vars: IndexMap<String, String>,
    pub chat: Vec<ChatMessage>,
    pub metadata: IndexMap<String, Value>,
    pub display_refreshes: Vec<usize>,
    pub script_runs: usize,
    pub updated_emits: Vec<usize>,
    pub metadata_saves: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its index.
    pub fn push_message(&mut self, text: &str, is_user: bool) -> usize {
        self.chat.push(ChatMessage {
            text: text.to_string(),
            is_user,
            speaker: if is_user { "user" } else { "char" }.to_string(),
        });
        self.chat.len() - 1
    }

    /// Replaces the text of an existing message.
    pub fn edit_message(&mut self, index: usize, text: &str) {
        if let Some(msg) = self.chat.get_mut(index) {
            msg.text = text.to_string();
        }
    }

    /// Truncates the chat to `len` messages.
    pub fn truncate_chat(&mut self, len: usize) {
        self.chat.truncate(len);
    }
}

impl VariableStore for MemoryHost {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn delete(&mut self, name: &str) {
        self.vars.shift_remove(name);
    }
}

impl ChatStore for MemoryHost {
    fn chat_len(&self) -> usize {
        self.chat.len()
    }

    fn message(&self, index: usize) -> Option<ChatMessage> {
        self.chat.get(index).cloned()
    }
}

impl MetadataStore for MemoryHost {
    fn meta_get(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).cloned()
    }

    fn meta_set(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }

    fn meta_remove(&mut self, key: &str) {
        self.metadata.shift_remove(key);
    }

    fn save_metadata_debounced(&mut self) {
        self.metadata_saves += 1;
    }
}

impl HostHooks for MemoryHost {
    fn refresh_message_display(&mut self, index: usize) {
        self.display_refreshes.push(index);
    }

    fn run_queued_scripts(&mut self) {
        self.script_runs += 1;
    }

    fn emit_message_updated(&mut self, index: usize) {
        self.updated_emits.push(index);
    }
}
