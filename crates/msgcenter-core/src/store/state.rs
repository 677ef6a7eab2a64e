//! Mutable store state and the snapshots taken from it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use msgcenter_html::SafeHtml;

use super::{Failure, OperationKind, ToastQueue};
use crate::model::{Conversation, ConversationId, MessageId};

/// Everything the store guards with its mutex.
#[derive(Debug)]
pub struct State {
    pub conversations: Vec<Conversation>,
    pub selected_id: Option<ConversationId>,
    pub selected_thread: Option<Conversation>,
    pub drafts: HashMap<ConversationId, String>,
    pub is_loading_list: bool,
    pub loading_thread: Option<ConversationId>,
    pub last_error: Option<Failure>,
    pub toasts: ToastQueue,
    /// In-flight mutation per conversation.
    pub pending: HashMap<ConversationId, OperationKind>,
    pub rendered: HashMap<MessageId, SafeHtml>,
    /// Bumped on every selection change.
    pub selection_epoch: u64,
}

impl State {
    pub fn new(toast_lifetime: Duration) -> Self {
        Self {
            conversations: Vec::new(),
            selected_id: None,
            selected_thread: None,
            drafts: HashMap::new(),
            is_loading_list: false,
            loading_thread: None,
            last_error: None,
            toasts: ToastQueue::new(toast_lifetime),
            pending: HashMap::new(),
            rendered: HashMap::new(),
            selection_epoch: 0,
        }
    }

    pub fn position(&self, id: &ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| &c.id == id)
    }

    pub fn conversation_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| &c.id == id)
    }

    /// The open thread, if it is `id`.
    pub fn thread_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.selected_thread.as_mut().filter(|t| &t.id == id)
    }

    pub fn is_selected(&self, id: &ConversationId) -> bool {
        self.selected_id.as_ref() == Some(id)
    }

    pub fn set_selection(&mut self, id: Option<ConversationId>) {
        self.selected_id = id;
        self.selected_thread = None;
        self.loading_thread = None;
        self.selection_epoch += 1;
    }

    /// Applies `change` to the list entry and, if open, the thread.
    pub fn update_both(&mut self, id: &ConversationId, change: impl Fn(&mut Conversation)) {
        if let Some(entry) = self.conversation_mut(id) {
            change(entry);
        }
        if let Some(thread) = self.thread_mut(id) {
            change(thread);
        }
    }
}

/// Copy of one conversation's visible state, taken before a mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: ConversationId,
    index: Option<usize>,
    entry: Option<Conversation>,
    was_selected: bool,
    thread: Option<Conversation>,
    /// Selection epoch right after the optimistic change.
    epoch: u64,
}

impl Snapshot {
    pub fn take(state: &State, id: &ConversationId) -> Self {
        let index = state.position(id);
        Self {
            id: id.clone(),
            index,
            entry: index.map(|i| state.conversations[i].clone()),
            was_selected: state.is_selected(id),
            thread: state.selected_thread.clone().filter(|t| &t.id == id),
            epoch: state.selection_epoch,
        }
    }

    pub const fn entry(&self) -> Option<&Conversation> {
        self.entry.as_ref()
    }

    /// Records the epoch after the optimistic change was applied.
    pub const fn mark_applied(&mut self, state: &State) {
        self.epoch = state.selection_epoch;
    }

    /// Puts the conversation back where it was.
    ///
    /// Other conversations are left alone. Selection is restored only when
    /// nobody selected something else in the meantime.
    ///
    /// A thread that finished loading after the snapshot is kept, minus the
    /// unconfirmed messages the rolled back operation added to it.
    pub fn restore(self, state: &mut State) {
        if let Some(current) = state.position(&self.id) {
            state.conversations.remove(current);
        }
        if let (Some(index), Some(entry)) = (self.index, self.entry.clone()) {
            let index = index.min(state.conversations.len());
            state.conversations.insert(index, entry);
        }

        let untouched = state.selection_epoch == self.epoch;
        if self.was_selected && untouched {
            let reselected = !state.is_selected(&self.id);
            if reselected {
                state.set_selection(Some(self.id.clone()));
            }
            match (self.thread, self.entry) {
                (Some(thread), _) => state.selected_thread = Some(thread),
                // Nothing will load it now.
                (None, Some(entry)) if reselected => state.selected_thread = Some(entry),
                (None, Some(entry)) => {
                    if let Some(thread) = state.thread_mut(&self.id) {
                        revert_thread(thread, &entry);
                    }
                }
                (None, None) => {}
            }
        }
    }
}

/// Brings a thread back in line with its restored list entry.
fn revert_thread(thread: &mut Conversation, entry: &Conversation) {
    thread
        .messages
        .retain(|m| !m.is_pending() || entry.messages.iter().any(|e| e.id == m.id));
    thread.is_read = entry.is_read;
    thread.is_starred = entry.is_starred;
    thread.preview.clone_from(&entry.preview);
    thread.last_message_time = entry.last_message_time;
}

/// Locks the state, recovering it if a panic poisoned the mutex.
pub fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a conversation busy for the guard's lifetime.
pub struct PendingGuard<'a> {
    state: &'a Mutex<State>,
    id: ConversationId,
}

impl<'a> PendingGuard<'a> {
    /// Claims `id`, or returns the operation already holding it.
    pub fn claim(
        state: &'a Mutex<State>,
        guard: &mut State,
        id: &ConversationId,
        kind: OperationKind,
    ) -> Result<Self, OperationKind> {
        if let Some(existing) = guard.pending.get(id) {
            return Err(*existing);
        }
        guard.pending.insert(id.clone(), kind);
        Ok(Self {
            state,
            id: id.clone(),
        })
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).pending.remove(&self.id);
    }
}
