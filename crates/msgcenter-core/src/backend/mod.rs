//! Persistence backend contract.
//!
//! The optimistic store talks to the durable copy of the inbox only through
//! [`MailBackend`]. [`SessionBackend`] implements it over session storage with
//! simulated latency and injectable failures.

mod failure;
mod seed;
mod session;

use std::future::Future;
use std::time::Duration;

pub use failure::{FailureInjector, FailurePredicate};
pub use seed::seed_conversations;
pub use session::{CONVERSATIONS_KEY, DRAFTS_KEY, SessionBackend};

use crate::model::{Conversation, ConversationId, Message};

/// Backend calls, as seen by failure injection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    /// `list_conversations`.
    ListConversations,
    /// `get_thread`.
    GetThread,
    /// `send`.
    Send,
    /// `delete_conversation`.
    DeleteConversation,
    /// `toggle_starred`.
    ToggleStarred,
    /// `mark_as_read`.
    MarkAsRead,
    /// `get_draft`.
    GetDraft,
    /// `update_draft`.
    UpdateDraft,
}

impl BackendOperation {
    /// Short name used in logs and messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListConversations => "list conversations",
            Self::GetThread => "load thread",
            Self::Send => "send message",
            Self::DeleteConversation => "delete conversation",
            Self::ToggleStarred => "toggle star",
            Self::MarkAsRead => "mark as read",
            Self::GetDraft => "load draft",
            Self::UpdateDraft => "save draft",
        }
    }
}

impl std::fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors a backend call can report.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Simulated failure from the failure injector.
    #[error("{operation} failed: simulated network error")]
    Injected {
        /// The call that failed.
        operation: BackendOperation,
    },

    /// The conversation does not exist in the backend.
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    /// The call did not settle in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The call that timed out.
        operation: BackendOperation,
        /// The configured limit.
        after: Duration,
    },

    /// The storage layer failed.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::Error),
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Durable side of the inbox.
///
/// Every call may fail. Implementations must be safe to call concurrently;
/// overlapping writes to one record are last-write-wins.
pub trait MailBackend: Send + Sync {
    /// Lists all conversations, most recent first.
    fn list_conversations(&self) -> impl Future<Output = BackendResult<Vec<Conversation>>> + Send;

    /// Loads one conversation with all of its messages.
    fn get_thread(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = BackendResult<Conversation>> + Send;

    /// Appends a message from the local user and returns it with its
    /// backend-assigned id.
    fn send(
        &self,
        conversation_id: &ConversationId,
        html: &str,
    ) -> impl Future<Output = BackendResult<Message>> + Send;

    /// Removes a conversation.
    fn delete_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Flips the starred flag.
    fn toggle_starred(&self, id: &ConversationId)
    -> impl Future<Output = BackendResult<()>> + Send;

    /// Sets the read flag.
    fn mark_as_read(
        &self,
        id: &ConversationId,
        read: bool,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Loads the saved draft for a conversation.
    fn get_draft(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = BackendResult<Option<String>>> + Send;

    /// Saves (or, with empty content, clears) the draft for a conversation.
    fn update_draft(
        &self,
        id: &ConversationId,
        html: &str,
    ) -> impl Future<Output = BackendResult<()>> + Send;
}
