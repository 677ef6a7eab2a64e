//! Message data models.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use msgcenter_html::SafeHtml;
use serde::{Deserialize, Serialize};

use super::ConversationId;

/// Prefix of client-generated ids that have not been confirmed yet.
const TEMPORARY_PREFIX: &str = "temp-";

static TEMPORARY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a message ID from any string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a client-side id for an optimistic message.
    ///
    /// Unique within the process; replaced by the backend id on commit.
    #[must_use]
    pub fn temporary() -> Self {
        let seq = TEMPORARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{TEMPORARY_PREFIX}{}-{seq}",
            Utc::now().timestamp_millis()
        ))
    }

    /// Returns true for ids produced by [`MessageId::temporary`].
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A sender or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Participant {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Participant {
    /// Creates a participant.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Formats as `Name <email>`, or just the email when the name is empty.
    #[must_use]
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

/// Broad attachment category, used to pick an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Pictures.
    Image,
    /// PDFs, office documents, text.
    Document,
    /// Zip and friends.
    Archive,
    /// Anything else.
    #[default]
    #[serde(other)]
    Other,
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name.
    pub name: String,
    /// Category.
    pub kind: AttachmentKind,
    /// Where the file can be fetched.
    pub url: String,
    /// Size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One entry within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Who sent it.
    pub sender: Participant,
    /// Recipient addresses, in order.
    pub recipients: Vec<String>,
    /// When it was sent.
    pub timestamp: DateTime<Utc>,
    /// Raw, untrusted HTML body. Render through [`Message::sanitized_body`].
    pub body_html: String,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Builds an optimistic message with a temporary id.
    #[must_use]
    pub fn draft_reply(
        conversation_id: ConversationId,
        sender: Participant,
        recipients: Vec<String>,
        body_html: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::temporary(),
            conversation_id,
            sender,
            recipients,
            timestamp: Utc::now(),
            body_html: body_html.into(),
            attachments: Vec::new(),
        }
    }

    /// Returns the body cleaned for rendering.
    #[must_use]
    pub fn sanitized_body(&self) -> SafeHtml {
        msgcenter_html::sanitize(&self.body_html)
    }

    /// Returns the body as a single line of plain text.
    #[must_use]
    pub fn plain_text(&self) -> String {
        msgcenter_html::strip_to_plain_text(&self.body_html)
    }

    /// Returns true while the message is only known locally.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_ids_are_unique() {
        let a = MessageId::temporary();
        let b = MessageId::temporary();
        assert_ne!(a, b);
        assert!(a.is_temporary());
        assert!(!MessageId::new("m-1").is_temporary());
    }

    #[test]
    fn test_participant_display() {
        assert_eq!(
            Participant::new("Ada", "ada@example.com").display(),
            "Ada <ada@example.com>"
        );
        assert_eq!(
            Participant::new("", "ada@example.com").display(),
            "ada@example.com"
        );
    }

    #[test]
    fn test_sanitized_body_strips_scripts() {
        let msg = Message::draft_reply(
            ConversationId::new("1"),
            Participant::new("Me", "me@example.com"),
            vec![],
            "<p>hi</p><script>alert(1)</script>",
        );
        assert_eq!(msg.sanitized_body().as_str(), "<p>hi</p>");
        assert_eq!(msg.plain_text(), "hi");
        assert!(msg.is_pending());
    }

    #[test]
    fn test_message_json_layout() {
        let msg = Message {
            id: MessageId::new("m-1"),
            conversation_id: ConversationId::new("1"),
            sender: Participant::new("Ada", "ada@example.com"),
            recipients: vec!["me@example.com".into()],
            timestamp: DateTime::parse_from_rfc3339("2026-01-24T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            body_html: "<p>x</p>".into(),
            attachments: vec![Attachment {
                name: "cv.pdf".into(),
                kind: AttachmentKind::Document,
                url: "/files/cv.pdf".into(),
                size: None,
            }],
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "1");
        assert_eq!(json["bodyHtml"], "<p>x</p>");
        assert_eq!(json["attachments"][0]["kind"], "document");
        assert!(json["attachments"][0].get("size").is_none());

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_unknown_attachment_kind() {
        let att: Attachment =
            serde_json::from_str(r#"{"name":"a","kind":"spreadsheet","url":"/a"}"#).unwrap();
        assert_eq!(att.kind, AttachmentKind::Other);
    }
}
