//! Inbox data model.
//!
//! Everything here serializes to the camelCase JSON layout used by the
//! session storage records.

mod conversation;
mod message;

pub use conversation::{Conversation, ConversationId, DEFAULT_PREVIEW_LENGTH};
pub use message::{Attachment, AttachmentKind, Message, MessageId, Participant};
