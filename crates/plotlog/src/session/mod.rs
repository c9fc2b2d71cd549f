//! The per-chat engine context and its event loop.
//!
//! A [`Session`] owns the guardian and all per-chat bookkeeping (pending
//! deferred re-applications, one-shot update suppression) and is driven by
//! host lifecycle [`Event`]s. It replaces ambient globals with an explicit
//! object: `Session::new` loads the chat's rule state, `reset` drops it.
//!
//! Deferred work: edits and swipes restore the previous floor immediately
//! but re-apply the message only after the host has finished its own
//! re-render. The host signals that moment by calling [`Session::run_deferred`].
//! A swipe's deferred re-application is cancelled when a new generation
//! starts for the same swiped message.

use std::collections::HashSet;

use tracing::debug;

use crate::apply::{
    apply_variables_for_message, clear_applied_for, clear_applied_from, ApplyOutcome,
};
use crate::guard::persist::{load_rules, save_rules_if_dirty};
use crate::guard::{GuardedVariableStore, Guardian};
use crate::host::Host;
use crate::keys::APPLIED_KEY;
use crate::snapshot::{
    clear_snapshots_from, rollback_for_deletion, rollback_to_previous_of, snapshot_current_last,
    snapshot_for_message,
};
use crate::vars::value_at;

/// What kind of generation is starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Normal,
    Swipe,
}

/// Host lifecycle events, each delivering a message index where one applies.
///
/// A `None` index defaults to the chat's last message, except for
/// `MessageDeleted` which requires an explicit index and is otherwise
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    MessageSent,
    MessageReceived { message_id: Option<usize> },
    UserMessageRendered { message_id: Option<usize> },
    CharacterMessageRendered { message_id: Option<usize> },
    MessageUpdated { message_id: Option<usize> },
    MessageEdited { message_id: Option<usize> },
    MessageSwiped { message_id: Option<usize> },
    MessageDeleted { message_id: Option<usize> },
    GenerationStarted { kind: GenerationKind },
    ChatChanged,
}

/// Work postponed until the host finishes its own mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredTask {
    ReapplyEdited { message_id: usize },
    ReapplySwiped { message_id: usize },
}

/// The engine context for the currently open chat.
#[derive(Debug)]
pub struct Session<H: Host> {
    host: H,
    guardian: Guardian,
    deferred: Vec<DeferredTask>,
    pending_swipe: HashSet<usize>,
    suppress_updated: HashSet<usize>,
    last_swiped: Option<usize>,
}

impl<H: Host> Session<H> {
    /// Opens a session over a host, loading the chat's persisted rule table.
    pub fn new(host: H) -> Self {
        let mut session = Session {
            host,
            guardian: Guardian::new(),
            deferred: Vec::new(),
            pending_swipe: HashSet::new(),
            suppress_updated: HashSet::new(),
            last_swiped: None,
        };
        load_rules(&session.host, &mut session.guardian);
        session
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn guardian(&self) -> &Guardian {
        &self.guardian
    }

    pub fn guardian_mut(&mut self) -> &mut Guardian {
        &mut self.guardian
    }

    /// The host variable API wrapped in guardian validation.
    pub fn guarded_store(&mut self) -> GuardedVariableStore<'_, H> {
        GuardedVariableStore::new(&mut self.host, &mut self.guardian)
    }

    /// Resolves an absolute path against the current store.
    pub fn value_at(&self, path: &str) -> Option<serde_json::Value> {
        value_at(&self.host, path)
    }

    /// Deferred tasks waiting for [`Session::run_deferred`].
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn loose_id(&self, provided: Option<usize>) -> Option<usize> {
        provided.or_else(|| self.host.last_index())
    }

    /// Applies one message's directives and refreshes its display.
    pub fn apply_message(&mut self, message_id: usize) -> ApplyOutcome {
        let outcome = apply_variables_for_message(&mut self.host, &mut self.guardian, message_id);
        save_rules_if_dirty(&mut self.host, &mut self.guardian);
        self.host.refresh_message_display(message_id);
        outcome
    }

    /// Feeds one host lifecycle event through the engine. Never fails; a
    /// malformed payload is ignored.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::MessageSent => {
                snapshot_current_last(&mut self.host, &self.guardian);
                if let Some(id) = self.host.last_index() {
                    self.apply_message(id);
                }
            }
            Event::MessageReceived { message_id } => {
                if let Some(id) = self.loose_id(message_id) {
                    self.apply_message(id);
                    self.host.run_queued_scripts();
                }
            }
            Event::UserMessageRendered { message_id }
            | Event::CharacterMessageRendered { message_id } => {
                if let Some(id) = self.loose_id(message_id) {
                    self.apply_message(id);
                    snapshot_for_message(&mut self.host, &self.guardian, id);
                }
            }
            Event::MessageUpdated { message_id } => {
                if let Some(id) = self.loose_id(message_id) {
                    if self.suppress_updated.remove(&id) {
                        return;
                    }
                    self.apply_message(id);
                }
            }
            Event::MessageEdited { message_id } => {
                if let Some(id) = self.loose_id(message_id) {
                    clear_applied_for(&mut self.host, id);
                    rollback_to_previous_of(&mut self.host, &mut self.guardian, id);
                    self.deferred
                        .push(DeferredTask::ReapplyEdited { message_id: id });
                }
            }
            Event::MessageSwiped { message_id } => {
                if let Some(id) = self.loose_id(message_id) {
                    self.last_swiped = Some(id);
                    clear_applied_for(&mut self.host, id);
                    rollback_to_previous_of(&mut self.host, &mut self.guardian, id);
                    self.pending_swipe.insert(id);
                    self.deferred
                        .push(DeferredTask::ReapplySwiped { message_id: id });
                }
            }
            Event::MessageDeleted { message_id } => {
                // Strict index: without one there is nothing safe to purge.
                let Some(id) = message_id else {
                    return;
                };
                rollback_for_deletion(&mut self.host, &mut self.guardian, id);
                clear_snapshots_from(&mut self.host, id);
                clear_applied_from(&mut self.host, id);
            }
            Event::GenerationStarted { kind } => {
                snapshot_current_last(&mut self.host, &self.guardian);
                if kind == GenerationKind::Swipe {
                    if let Some(id) = self.last_swiped {
                        // The generation will capture its own previous floor;
                        // a still-pending swipe re-application would race it.
                        if self.pending_swipe.remove(&id) {
                            debug!(message_id = id, "cancelled pending swipe re-application");
                        }
                        self.deferred
                            .retain(|t| *t != DeferredTask::ReapplySwiped { message_id: id });
                    }
                }
            }
            Event::ChatChanged => self.chat_changed(),
        }
        save_rules_if_dirty(&mut self.host, &mut self.guardian);
    }

    /// Runs work deferred behind the host's own re-render. The host calls
    /// this once its DOM/array mutation has settled.
    pub fn run_deferred(&mut self) {
        let tasks = std::mem::take(&mut self.deferred);
        for task in tasks {
            match task {
                DeferredTask::ReapplySwiped { message_id } => {
                    if !self.pending_swipe.remove(&message_id) {
                        continue;
                    }
                    self.apply_message(message_id);
                    self.host.run_queued_scripts();
                }
                DeferredTask::ReapplyEdited { message_id } => {
                    self.apply_message(message_id);
                    // The refresh below re-renders the message; suppress the
                    // engine's reaction to its own update notification.
                    self.suppress_updated.insert(message_id);
                    self.host.emit_message_updated(message_id);
                    self.host.run_queued_scripts();
                }
            }
        }
        save_rules_if_dirty(&mut self.host, &mut self.guardian);
    }

    /// Clears all variables and reapplies the whole chat in order.
    pub fn rebuild(&mut self) {
        crate::snapshot::rebuild_from_scratch(&mut self.host, &mut self.guardian);
        save_rules_if_dirty(&mut self.host, &mut self.guardian);
    }

    fn chat_changed(&mut self) {
        self.guardian.table.clear();
        load_rules(&self.host, &mut self.guardian);
        self.host
            .meta_set(APPLIED_KEY, serde_json::Value::Object(Default::default()));
        self.host.save_metadata_debounced();
        self.deferred.clear();
        self.pending_swipe.clear();
        self.suppress_updated.clear();
        self.last_swiped = None;
    }

    /// Drops all per-chat state without reloading anything.
    pub fn reset(&mut self) {
        self.guardian.table.clear();
        self.deferred.clear();
        self.pending_swipe.clear();
        self.suppress_updated.clear();
        self.last_swiped = None;
    }

    /// Consumes the session, handing the host back.
    pub fn into_host(self) -> H {
        self.host
    }
}
