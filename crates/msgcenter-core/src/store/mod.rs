//! Optimistic inbox store.
//!
//! [`OptimisticStore`] owns the in-memory inbox: the conversation list, the
//! open thread and unsent drafts. Every mutation is applied locally first and
//! then written to the [`MailBackend`]. A failed write (including a timeout)
//! puts the affected conversation back the way it was and raises a toast.
//!
//! Each mutation moves through `Idle → Optimistic → Committed | RolledBack`.
//! While one is in flight its conversation is busy; a second mutation on the
//! same id is rejected with [`StoreError::Busy`]. Mutations on different ids
//! run independently, and a rollback only touches its own conversation.

mod state;
mod toast;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use msgcenter_html::SafeHtml;
use tracing::{debug, info, warn};

use self::state::{PendingGuard, Snapshot, State};
pub use self::toast::{Toast, ToastKind, ToastQueue};
use crate::backend::{BackendError, BackendOperation, BackendResult, MailBackend};
use crate::config::{Config, StoreConfig};
use crate::model::{Conversation, ConversationId, Message, MessageId, Participant};

/// Store operations, for busy tracking and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Loading the conversation list.
    LoadList,
    /// Loading one thread.
    LoadThread,
    /// Sending a reply.
    Send,
    /// Deleting a conversation.
    Delete,
    /// Flipping the star.
    ToggleStar,
    /// Flipping the read flag by hand.
    ToggleRead,
    /// Marking read because the conversation was opened.
    MarkRead,
    /// Persisting a draft.
    SaveDraft,
}

impl OperationKind {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LoadList => "load conversations",
            Self::LoadThread => "load thread",
            Self::Send => "send message",
            Self::Delete => "delete conversation",
            Self::ToggleStar => "toggle star",
            Self::ToggleRead => "toggle read",
            Self::MarkRead => "mark as read",
            Self::SaveDraft => "save draft",
        }
    }

    /// Plain-language toast text for a failure.
    #[must_use]
    pub const fn failure_message(self) -> &'static str {
        match self {
            Self::LoadList => "Could not load your conversations. Showing the last known list.",
            Self::LoadThread => "Could not open this conversation.",
            Self::Send => "Your message could not be sent. It is still in the reply box.",
            Self::Delete => "Could not delete the conversation. It has been restored.",
            Self::ToggleStar => "Could not update the star.",
            Self::ToggleRead | Self::MarkRead => "Could not update the read status.",
            Self::SaveDraft => "Could not save the draft.",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a mutation settled.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The backend accepted the change.
    Committed,
    /// The backend refused; local state was restored.
    RolledBack,
}

/// The most recent failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// What was attempted.
    pub operation: OperationKind,
    /// Error description.
    pub message: String,
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Listing or thread fetch failed; state stays at the last known-good value.
    #[error("Failed to load: {0}")]
    LoadFailed(#[source] BackendError),

    /// Sending failed; the thread was rolled back and the draft restored.
    #[error("Failed to send message: {0}")]
    SendFailed(#[source] BackendError),

    /// A star, read or delete write failed and was rolled back.
    #[error("Failed to {operation}: {source}")]
    MutationFailed {
        /// The mutation that failed.
        operation: OperationKind,
        /// Backend cause.
        #[source]
        source: BackendError,
    },

    /// Persisting a draft failed. Only ever logged.
    #[error("Failed to save draft: {0}")]
    DraftSaveFailed(#[source] BackendError),

    /// Another mutation on this conversation is still in flight.
    #[error("Conversation {0} has an operation in flight")]
    Busy(ConversationId),

    /// The conversation is not in the list.
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    /// The operation needs a selected conversation.
    #[error("No conversation selected")]
    NoSelection,

    /// Refused to send an empty body.
    #[error("Message is empty")]
    EmptyMessage,
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// In-memory inbox with optimistic writes.
///
/// All methods take `&self`; state sits behind a mutex that is never held
/// across a backend call, so operations can overlap.
#[derive(Debug)]
pub struct OptimisticStore<B> {
    backend: Arc<B>,
    identity: Participant,
    config: StoreConfig,
    state: Mutex<State>,
}

impl<B: MailBackend> OptimisticStore<B> {
    /// Creates an empty store over `backend`.
    #[must_use]
    pub fn new(backend: Arc<B>, identity: Participant, config: StoreConfig) -> Self {
        let state = State::new(config.toast_lifetime());
        Self {
            backend,
            identity,
            config,
            state: Mutex::new(state),
        }
    }

    /// Creates a store using the identity and store settings of `config`.
    #[must_use]
    pub fn from_config(backend: Arc<B>, config: &Config) -> Self {
        Self::new(backend, config.identity.clone(), config.store.clone())
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        state::lock(&self.state)
    }

    fn claim(
        &self,
        state: &mut State,
        id: &ConversationId,
        kind: OperationKind,
    ) -> StoreResult<PendingGuard<'_>> {
        PendingGuard::claim(&self.state, state, id, kind).map_err(|current| {
            debug!(conversation = %id, %kind, %current, "Rejected, operation in flight");
            StoreError::Busy(id.clone())
        })
    }

    /// Rejects `kind` while another operation holds `id`.
    ///
    /// Checked before the id is looked up, so a conversation whose delete
    /// is in flight reports [`StoreError::Busy`] rather than
    /// [`StoreError::NotFound`].
    fn ensure_idle(state: &State, id: &ConversationId, kind: OperationKind) -> StoreResult<()> {
        match state.pending.get(id) {
            Some(current) => {
                debug!(conversation = %id, %kind, %current, "Rejected, operation in flight");
                Err(StoreError::Busy(id.clone()))
            }
            None => Ok(()),
        }
    }

    /// Runs a backend call under the configured timeout.
    async fn call<T>(
        &self,
        operation: BackendOperation,
        request: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        let after = self.config.call_timeout();
        tokio::time::timeout(after, request).await.unwrap_or_else(|_| {
            warn!(%operation, ?after, "Backend call timed out");
            Err(BackendError::Timeout { operation, after })
        })
    }

    fn report(state: &mut State, operation: OperationKind, error: &StoreError) {
        warn!(%operation, %error, "Operation failed");
        state.last_error = Some(Failure {
            operation,
            message: error.to_string(),
        });
        state
            .toasts
            .push(ToastKind::Error, operation.failure_message(), Instant::now());
    }

    // ---- loading ----

    /// Replaces the list with the backend's.
    ///
    /// The list is ordered most recent first. Conversations with a mutation
    /// in flight keep their local version. On failure the previous list stays.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LoadFailed`] if the backend call fails.
    pub async fn load_conversations(&self) -> StoreResult<usize> {
        self.lock().is_loading_list = true;

        let result = self
            .call(
                BackendOperation::ListConversations,
                self.backend.list_conversations(),
            )
            .await;

        let mut state = self.lock();
        state.is_loading_list = false;
        match result {
            Ok(incoming) => {
                let mut merged: Vec<Conversation> = incoming
                    .into_iter()
                    .filter_map(|conversation| {
                        if state.pending.contains_key(&conversation.id) {
                            state
                                .conversations
                                .iter()
                                .find(|local| local.id == conversation.id)
                                .cloned()
                        } else {
                            Some(conversation)
                        }
                    })
                    .collect();
                merged.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
                let count = merged.len();
                state.conversations = merged;
                info!(count, "Conversations loaded");
                Ok(count)
            }
            Err(e) => {
                let error = StoreError::LoadFailed(e);
                Self::report(&mut state, OperationKind::LoadList, &error);
                Err(error)
            }
        }
    }

    /// Fetches the full thread for the selected conversation `id`.
    ///
    /// A response that arrives after the selection moved on is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LoadFailed`] if the backend call fails while
    /// `id` is still selected.
    pub async fn load_thread(&self, id: &ConversationId) -> StoreResult<()> {
        let epoch = {
            let mut state = self.lock();
            state.loading_thread = Some(id.clone());
            state.selection_epoch
        };

        let result = self
            .call(BackendOperation::GetThread, self.backend.get_thread(id))
            .await;

        let mut state = self.lock();
        if state.loading_thread.as_ref() == Some(id) {
            state.loading_thread = None;
        }
        if state.selection_epoch != epoch || !state.is_selected(id) {
            debug!(conversation = %id, "Discarding stale thread response");
            return Ok(());
        }

        match result {
            Ok(mut thread) => {
                // The list entry carries flags and messages not yet confirmed.
                if let Some(local) = state.conversations.iter().find(|c| &c.id == id) {
                    thread.is_read = local.is_read;
                    thread.is_starred = local.is_starred;
                    let unconfirmed: Vec<Message> = local
                        .messages
                        .iter()
                        .filter(|m| m.is_pending())
                        .cloned()
                        .collect();
                    for message in unconfirmed {
                        thread.push_message(message, self.config.preview_length);
                    }
                }
                debug!(conversation = %id, messages = thread.messages.len(), "Thread loaded");
                state.selected_thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                let error = StoreError::LoadFailed(e);
                Self::report(&mut state, OperationKind::LoadThread, &error);
                Err(error)
            }
        }
    }

    // ---- selection ----

    /// Opens a conversation, or closes the open one with `None`.
    ///
    /// Opening marks the conversation read right away and confirms that with
    /// the backend while the thread loads. A saved draft is fetched when
    /// there is no local one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::LoadFailed`] if the thread cannot be fetched.
    pub async fn select_conversation(&self, id: Option<ConversationId>) -> StoreResult<()> {
        let Some(id) = id else {
            self.lock().set_selection(None);
            debug!("Selection cleared");
            return Ok(());
        };

        let (mark_read, has_draft) = {
            let mut state = self.lock();
            let was_read = state
                .conversations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.is_read)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            state.set_selection(Some(id.clone()));
            let has_draft = state.drafts.contains_key(&id);

            let mark_read = if was_read {
                None
            } else {
                match PendingGuard::claim(&self.state, &mut state, &id, OperationKind::MarkRead) {
                    Ok(guard) => {
                        state.update_both(&id, |c| c.is_read = true);
                        Some(guard)
                    }
                    Err(current) => {
                        debug!(conversation = %id, %current, "Skipping mark-read, busy");
                        None
                    }
                }
            };
            (mark_read, has_draft)
        };
        info!(conversation = %id, "Conversation selected");

        let confirm_read = async {
            let Some(guard) = mark_read else { return };
            let result = self
                .call(BackendOperation::MarkAsRead, self.backend.mark_as_read(&id, true))
                .await;
            if let Err(source) = result {
                let mut state = self.lock();
                state.update_both(&id, |c| c.is_read = false);
                let error = StoreError::MutationFailed {
                    operation: OperationKind::MarkRead,
                    source,
                };
                Self::report(&mut state, OperationKind::MarkRead, &error);
            }
            drop(guard);
        };

        let fetch_draft = async {
            if has_draft {
                return;
            }
            match self
                .call(BackendOperation::GetDraft, self.backend.get_draft(&id))
                .await
            {
                Ok(Some(saved)) if !saved.is_empty() => {
                    let mut state = self.lock();
                    if !state.drafts.contains_key(&id) {
                        state.drafts.insert(id.clone(), saved);
                        state
                            .toasts
                            .push(ToastKind::Info, "Restored your saved draft.", Instant::now());
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(conversation = %id, error = %e, "No saved draft"),
            }
        };

        let (loaded, (), ()) = tokio::join!(self.load_thread(&id), confirm_read, fetch_draft);
        loaded
    }

    // ---- mutations ----

    /// Sends a reply in the selected conversation.
    ///
    /// The message shows up at once under a temporary id and the conversation
    /// moves to the top of the list. On commit the temporary message is
    /// swapped for the backend's copy in place. On failure the conversation
    /// is restored and `html` becomes the draft again.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SendFailed`] after a rollback, and
    /// [`StoreError::NoSelection`], [`StoreError::EmptyMessage`],
    /// [`StoreError::NotFound`] or [`StoreError::Busy`] when nothing was tried.
    pub async fn send_message(&self, html: &str) -> StoreResult<Message> {
        // Serialized tags are lowercase whatever the input case.
        if msgcenter_html::strip_to_plain_text(html).is_empty()
            && !msgcenter_html::sanitize(html).as_str().contains("<img")
        {
            return Err(StoreError::EmptyMessage);
        }

        let (pending, snapshot, id, temp_id) = {
            let mut state = self.lock();
            let id = state.selected_id.clone().ok_or(StoreError::NoSelection)?;
            Self::ensure_idle(&state, &id, OperationKind::Send)?;
            let recipients = state
                .selected_thread
                .as_ref()
                .filter(|t| t.id == id)
                .or_else(|| state.conversations.iter().find(|c| c.id == id))
                .map(|c| c.reply_recipients(&self.identity))
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let pending = self.claim(&mut state, &id, OperationKind::Send)?;

            let mut snapshot = Snapshot::take(&state, &id);
            state.drafts.remove(&id);

            let message =
                Message::draft_reply(id.clone(), self.identity.clone(), recipients, html);
            let temp_id = message.id.clone();
            let preview_length = self.config.preview_length;
            if let Some(thread) = state.thread_mut(&id) {
                thread.push_message(message.clone(), preview_length);
            }
            if let Some(position) = state.position(&id) {
                let mut entry = state.conversations.remove(position);
                entry.push_message(message, preview_length);
                state.conversations.insert(0, entry);
            }
            snapshot.mark_applied(&state);
            (pending, snapshot, id, temp_id)
        };
        debug!(conversation = %id, message = %temp_id, "Optimistic send");

        let result = self
            .call(BackendOperation::Send, self.backend.send(&id, html))
            .await;

        let mut state = self.lock();
        state.rendered.remove(&temp_id);
        let outcome = match result {
            Ok(sent) => {
                let preview_length = self.config.preview_length;
                state.update_both(&id, |c| {
                    remap_message(c, &temp_id, &sent, preview_length);
                    c.is_read = true;
                });
                state
                    .toasts
                    .push(ToastKind::Success, "Message sent.", Instant::now());
                info!(conversation = %id, message = %sent.id, "Message sent");
                Ok(sent)
            }
            Err(e) => {
                snapshot.restore(&mut state);
                state.drafts.insert(id.clone(), html.to_string());
                let error = StoreError::SendFailed(e);
                Self::report(&mut state, OperationKind::Send, &error);
                Err(error)
            }
        };
        drop(state);
        drop(pending);
        outcome
    }

    /// Deletes a conversation, clearing the selection if it was open.
    ///
    /// A rollback puts it back at its old position and reopens it unless
    /// something else was selected meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Busy`] when nothing
    /// was tried. Backend failures yield `Ok(Outcome::RolledBack)`.
    pub async fn delete_conversation(&self, id: &ConversationId) -> StoreResult<Outcome> {
        let (pending, snapshot) = {
            let mut state = self.lock();
            Self::ensure_idle(&state, id, OperationKind::Delete)?;
            let position = state
                .position(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let pending = self.claim(&mut state, id, OperationKind::Delete)?;

            let mut snapshot = Snapshot::take(&state, id);
            state.conversations.remove(position);
            if state.is_selected(id) {
                state.set_selection(None);
            }
            snapshot.mark_applied(&state);
            (pending, snapshot)
        };
        debug!(conversation = %id, "Optimistic delete");

        let result = self
            .call(
                BackendOperation::DeleteConversation,
                self.backend.delete_conversation(id),
            )
            .await;

        let mut state = self.lock();
        let outcome = match result {
            Ok(()) => {
                state.drafts.remove(id);
                if let Some(entry) = snapshot.entry() {
                    for message in &entry.messages {
                        state.rendered.remove(&message.id);
                    }
                }
                state
                    .toasts
                    .push(ToastKind::Success, "Conversation deleted.", Instant::now());
                info!(conversation = %id, "Conversation deleted");
                Outcome::Committed
            }
            Err(source) => {
                snapshot.restore(&mut state);
                let error = StoreError::MutationFailed {
                    operation: OperationKind::Delete,
                    source,
                };
                Self::report(&mut state, OperationKind::Delete, &error);
                Outcome::RolledBack
            }
        };
        drop(state);
        drop(pending);
        Ok(outcome)
    }

    /// Flips the star on a conversation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Busy`] when nothing
    /// was tried.
    pub async fn toggle_star(&self, id: &ConversationId) -> StoreResult<Outcome> {
        let (pending, previous) = {
            let mut state = self.lock();
            Self::ensure_idle(&state, id, OperationKind::ToggleStar)?;
            let previous = state
                .conversations
                .iter()
                .find(|c| &c.id == id)
                .map(|c| c.is_starred)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let pending = self.claim(&mut state, id, OperationKind::ToggleStar)?;
            state.update_both(id, |c| c.is_starred = !previous);
            (pending, previous)
        };

        let result = self
            .call(BackendOperation::ToggleStarred, self.backend.toggle_starred(id))
            .await;

        let outcome = self.settle_flag(id, OperationKind::ToggleStar, result, |c| {
            c.is_starred = previous;
        });
        drop(pending);
        Ok(outcome)
    }

    /// Flips the read flag on the selected conversation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSelection`], [`StoreError::NotFound`] or
    /// [`StoreError::Busy`] when nothing was tried.
    pub async fn toggle_read(&self) -> StoreResult<Outcome> {
        let (pending, id, previous) = {
            let mut state = self.lock();
            let id = state.selected_id.clone().ok_or(StoreError::NoSelection)?;
            Self::ensure_idle(&state, &id, OperationKind::ToggleRead)?;
            let previous = state
                .conversations
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.is_read)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let pending = self.claim(&mut state, &id, OperationKind::ToggleRead)?;
            state.update_both(&id, |c| c.is_read = !previous);
            (pending, id, previous)
        };

        let result = self
            .call(
                BackendOperation::MarkAsRead,
                self.backend.mark_as_read(&id, !previous),
            )
            .await;

        let outcome = self.settle_flag(&id, OperationKind::ToggleRead, result, |c| {
            c.is_read = previous;
        });
        drop(pending);
        Ok(outcome)
    }

    /// Commits a single-field flip, or reverts just that field.
    fn settle_flag(
        &self,
        id: &ConversationId,
        operation: OperationKind,
        result: BackendResult<()>,
        revert: impl Fn(&mut Conversation),
    ) -> Outcome {
        let mut state = self.lock();
        match result {
            Ok(()) => {
                debug!(conversation = %id, %operation, "Committed");
                Outcome::Committed
            }
            Err(source) => {
                state.update_both(id, revert);
                let error = StoreError::MutationFailed { operation, source };
                Self::report(&mut state, operation, &error);
                Outcome::RolledBack
            }
        }
    }

    /// Replaces the draft of the selected conversation.
    ///
    /// Empty content removes the draft. The backend copy is best-effort: a
    /// failed save is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSelection`] when no conversation is open.
    pub async fn update_draft(&self, html: &str) -> StoreResult<()> {
        let id = {
            let mut state = self.lock();
            let id = state.selected_id.clone().ok_or(StoreError::NoSelection)?;
            if html.is_empty() {
                state.drafts.remove(&id);
            } else {
                state.drafts.insert(id.clone(), html.to_string());
            }
            id
        };

        let result = self
            .call(
                BackendOperation::UpdateDraft,
                self.backend.update_draft(&id, html),
            )
            .await;
        if let Err(e) = result {
            let error = StoreError::DraftSaveFailed(e);
            warn!(conversation = %id, %error, "Draft not persisted");
        }
        Ok(())
    }

    // ---- readers ----

    /// Returns the conversation list in display order.
    #[must_use]
    pub fn conversations(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    /// Returns one conversation from the list.
    #[must_use]
    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.lock()
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }

    /// Returns the selected conversation id.
    #[must_use]
    pub fn selected_id(&self) -> Option<ConversationId> {
        self.lock().selected_id.clone()
    }

    /// Returns the open thread, once loaded.
    #[must_use]
    pub fn selected_thread(&self) -> Option<Conversation> {
        self.lock().selected_thread.clone()
    }

    /// Returns the local draft for a conversation.
    #[must_use]
    pub fn draft(&self, id: &ConversationId) -> Option<String> {
        self.lock().drafts.get(id).cloned()
    }

    /// Returns true while the list is being fetched.
    #[must_use]
    pub fn is_loading_list(&self) -> bool {
        self.lock().is_loading_list
    }

    /// Returns true while the open thread is being fetched.
    #[must_use]
    pub fn is_loading_thread(&self) -> bool {
        self.lock().loading_thread.is_some()
    }

    /// Returns true if a mutation on `id` is in flight.
    #[must_use]
    pub fn is_busy(&self, id: &ConversationId) -> bool {
        self.lock().pending.contains_key(id)
    }

    /// Returns the most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<Failure> {
        self.lock().last_error.clone()
    }

    /// Forgets the most recent failure.
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// Returns the live toasts.
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts_at(Instant::now())
    }

    /// Returns the toasts live at `now`, dropping expired ones.
    #[must_use]
    pub fn toasts_at(&self, now: Instant) -> Vec<Toast> {
        self.lock().toasts.active(now)
    }

    /// Dismisses a toast. Returns false if it was already gone.
    pub fn dismiss_toast(&self, id: u64) -> bool {
        self.lock().toasts.dismiss(id)
    }

    /// Conversations matching `query`, in list order.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        self.lock()
            .conversations
            .iter()
            .filter(|c| c.matches(query))
            .cloned()
            .collect()
    }

    /// Number of unread conversations.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.lock()
            .conversations
            .iter()
            .filter(|c| !c.is_read)
            .count()
    }

    /// Returns a message body ready for rendering.
    ///
    /// Bodies are sanitized once and cached by message id.
    #[must_use]
    pub fn rendered_body(&self, message_id: &MessageId) -> Option<SafeHtml> {
        let mut state = self.lock();
        if let Some(cached) = state.rendered.get(message_id) {
            return Some(cached.clone());
        }

        let body = state
            .selected_thread
            .iter()
            .chain(state.conversations.iter())
            .flat_map(|c| c.messages.iter())
            .find(|m| &m.id == message_id)
            .map(Message::sanitized_body)?;
        state.rendered.insert(message_id.clone(), body.clone());
        Some(body)
    }
}

/// Swaps the temporary message for the confirmed one, in place.
///
/// A reload may already have brought in the confirmed copy; then the
/// temporary one is just dropped.
fn remap_message(
    conversation: &mut Conversation,
    temp_id: &MessageId,
    sent: &Message,
    preview_length: usize,
) {
    if conversation.messages.iter().any(|m| m.id == sent.id) {
        conversation.messages.retain(|m| &m.id != temp_id);
        conversation.refresh_preview(preview_length);
    } else {
        conversation.replace_message(temp_id, sent.clone(), preview_length);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{FailureInjector, SessionBackend, seed_conversations};

    async fn store_with(failures: FailureInjector) -> OptimisticStore<SessionBackend> {
        let identity = Participant::new("Me", "me@example.com");
        let backend = SessionBackend::in_memory(identity.clone())
            .await
            .unwrap()
            .with_failures(failures);
        backend.initialize(&seed_conversations()).await.unwrap();
        let store = OptimisticStore::new(Arc::new(backend), identity, StoreConfig::default());
        store.load_conversations().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_load_failure_keeps_list() {
        let failures = FailureInjector::failing(BackendOperation::ListConversations);
        failures.set_enabled(false);
        let store = store_with(failures).await;
        let before = store.conversations();
        assert_eq!(before.len(), 3);

        store.backend().failures().set_enabled(true);
        assert!(matches!(
            store.load_conversations().await,
            Err(StoreError::LoadFailed(_))
        ));
        assert_eq!(store.conversations(), before);
        assert!(!store.is_loading_list());
        assert_eq!(store.last_error().unwrap().operation, OperationKind::LoadList);
        assert_eq!(store.toasts()[0].kind, ToastKind::Error);
    }

    #[tokio::test]
    async fn test_select_none_clears_thread() {
        let store = store_with(FailureInjector::disabled()).await;
        store
            .select_conversation(Some(ConversationId::new("2")))
            .await
            .unwrap();
        assert!(store.selected_thread().is_some());

        store.select_conversation(None).await.unwrap();
        assert_eq!(store.selected_id(), None);
        assert_eq!(store.selected_thread(), None);
    }

    #[tokio::test]
    async fn test_select_unknown_id() {
        let store = store_with(FailureInjector::disabled()).await;
        let result = store
            .select_conversation(Some(ConversationId::new("nope")))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.selected_id(), None);
    }

    #[tokio::test]
    async fn test_send_preconditions() {
        let store = store_with(FailureInjector::disabled()).await;
        assert!(matches!(
            store.send_message("<p>hi</p>").await,
            Err(StoreError::NoSelection)
        ));

        store
            .select_conversation(Some(ConversationId::new("1")))
            .await
            .unwrap();
        assert!(matches!(
            store.send_message("<p>  </p>").await,
            Err(StoreError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_send_image_only_body_in_any_case() {
        let store = store_with(FailureInjector::disabled()).await;
        store
            .select_conversation(Some(ConversationId::new("1")))
            .await
            .unwrap();

        let sent = store
            .send_message(r#"<IMG SRC="https://example.com/a.png">"#)
            .await
            .unwrap();
        assert!(!sent.is_pending());
        assert!(matches!(
            store.send_message("<P> </P>").await,
            Err(StoreError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_rendered_body_is_cached_and_safe() {
        let store = store_with(FailureInjector::disabled()).await;
        let id = MessageId::new("m-5");
        let first = store.rendered_body(&id).unwrap();
        assert!(!first.as_str().contains("<script"));
        assert_eq!(store.rendered_body(&id), Some(first));
        assert_eq!(store.rendered_body(&MessageId::new("missing")), None);
    }

    #[tokio::test]
    async fn test_search_and_unread_count() {
        let store = store_with(FailureInjector::disabled()).await;
        assert_eq!(store.unread_count(), 2);

        let hits = store.search("TALK");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, ConversationId::new("2"));
        assert_eq!(store.search("dana@").len(), 1);
        assert_eq!(store.search("").len(), 3);
    }

    #[tokio::test]
    async fn test_draft_save_failure_is_silent() {
        let store = store_with(FailureInjector::failing(BackendOperation::UpdateDraft)).await;
        let id = ConversationId::new("1");
        store.select_conversation(Some(id.clone())).await.unwrap();

        store.update_draft("<p>wip</p>").await.unwrap();
        assert_eq!(store.draft(&id), Some("<p>wip</p>".to_string()));
        assert!(store.toasts().is_empty());
        assert!(store.last_error().is_none());

        store.update_draft("").await.unwrap();
        assert_eq!(store.draft(&id), None);
    }

    #[tokio::test]
    async fn test_toasts_expire_after_lifetime() {
        let store = store_with(FailureInjector::failing(BackendOperation::ToggleStarred)).await;
        let outcome = store.toggle_star(&ConversationId::new("1")).await.unwrap();
        assert_eq!(outcome, Outcome::RolledBack);

        let toasts = store.toasts();
        assert_eq!(toasts.len(), 1);
        let later = toasts[0].created_at + Duration::from_secs(3);
        assert!(store.toasts_at(later).is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_toast() {
        let store = store_with(FailureInjector::failing(BackendOperation::ToggleStarred)).await;
        let _ = store.toggle_star(&ConversationId::new("2")).await.unwrap();
        let id = store.toasts()[0].id;
        assert!(store.dismiss_toast(id));
        assert!(store.toasts().is_empty());
    }
}
