//! Conversation (thread) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, MessageId, Participant};

/// Default preview length in characters.
pub const DEFAULT_PREVIEW_LENGTH: usize = 100;

/// Unique identifier for a conversation, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Create a conversation ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An email-like thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Thread subject.
    pub subject: String,
    /// Plain-text snippet of the last message.
    pub preview: String,
    /// Time of the last message.
    pub last_message_time: DateTime<Utc>,
    /// Whether the thread has been read.
    pub is_read: bool,
    /// Whether the thread is starred.
    pub is_starred: bool,
    /// Tags, in display order.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Messages in chronological order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates a conversation from its first message.
    #[must_use]
    pub fn new(id: ConversationId, subject: impl Into<String>, first: Message) -> Self {
        let mut conversation = Self {
            id,
            subject: subject.into(),
            preview: String::new(),
            last_message_time: first.timestamp,
            is_read: false,
            is_starred: false,
            labels: Vec::new(),
            messages: vec![first],
        };
        conversation.refresh_preview(DEFAULT_PREVIEW_LENGTH);
        conversation
    }

    /// Adds labels (builder style).
    #[must_use]
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| (*l).to_string()).collect();
        self
    }

    /// Returns the most recent message.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Appends a message and updates preview and time.
    pub fn push_message(&mut self, message: Message, preview_length: usize) {
        self.messages.push(message);
        self.refresh_preview(preview_length);
    }

    /// Replaces the message with id `old` in place.
    ///
    /// Returns false if no such message exists. The position in the thread is
    /// kept, so out-of-order confirmations cannot reorder the thread.
    pub fn replace_message(
        &mut self,
        old: &MessageId,
        replacement: Message,
        preview_length: usize,
    ) -> bool {
        let Some(slot) = self.messages.iter_mut().find(|m| &m.id == old) else {
            return false;
        };
        *slot = replacement;
        self.refresh_preview(preview_length);
        true
    }

    /// Recomputes `preview` and `last_message_time` from the last message.
    pub fn refresh_preview(&mut self, preview_length: usize) {
        if let Some(last) = self.messages.last() {
            self.preview = msgcenter_html::preview(&last.body_html, preview_length);
            self.last_message_time = last.timestamp;
        }
    }

    /// Returns the distinct senders, in order of first appearance.
    #[must_use]
    pub fn participants(&self) -> Vec<&Participant> {
        let mut seen: Vec<&Participant> = Vec::new();
        for message in &self.messages {
            if !seen.iter().any(|p| p.email == message.sender.email) {
                seen.push(&message.sender);
            }
        }
        seen
    }

    /// Addresses a reply from `me` should go to.
    ///
    /// Everyone who wrote in the thread except `me`. Falls back to the last
    /// message's recipients for threads only `me` has written in.
    #[must_use]
    pub fn reply_recipients(&self, me: &Participant) -> Vec<String> {
        let others: Vec<String> = self
            .participants()
            .into_iter()
            .filter(|p| !p.email.eq_ignore_ascii_case(&me.email))
            .map(|p| p.email.clone())
            .collect();

        if others.is_empty() {
            self.last_message()
                .map(|m| m.recipients.clone())
                .unwrap_or_default()
        } else {
            others
        }
    }

    /// Case-insensitive match over subject, preview, senders and labels.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.subject.to_lowercase().contains(&query)
            || self.preview.to_lowercase().contains(&query)
            || self.labels.iter().any(|l| l.to_lowercase().contains(&query))
            || self.participants().iter().any(|p| {
                p.name.to_lowercase().contains(&query) || p.email.to_lowercase().contains(&query)
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn message(id: &str, from: &Participant, body: &str) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new("c1"),
            sender: from.clone(),
            recipients: vec!["me@example.com".into()],
            timestamp: Utc::now(),
            body_html: body.into(),
            attachments: vec![],
        }
    }

    #[test]
    fn test_new_derives_preview() {
        let ada = Participant::new("Ada", "ada@example.com");
        let conv = Conversation::new(
            ConversationId::new("c1"),
            "Hello",
            message("m1", &ada, "<p>Hi <b>there</b></p>"),
        );
        assert_eq!(conv.preview, "Hi there");
        assert_eq!(conv.last_message_time, conv.messages[0].timestamp);
        assert!(!conv.is_read);
    }

    #[test]
    fn test_push_and_replace_keep_position() {
        let ada = Participant::new("Ada", "ada@example.com");
        let me = Participant::new("Me", "me@example.com");
        let mut conv = Conversation::new(ConversationId::new("c1"), "S", message("m1", &ada, "a"));
        conv.push_message(message("temp-1", &me, "b"), 100);
        conv.push_message(message("m3", &ada, "c"), 100);
        assert_eq!(conv.preview, "c");

        assert!(conv.replace_message(&MessageId::new("temp-1"), message("m2", &me, "b!"), 100));
        let ids: Vec<&str> = conv.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert_eq!(conv.preview, "c");

        assert!(!conv.replace_message(&MessageId::new("missing"), message("x", &me, ""), 100));
    }

    #[test]
    fn test_reply_recipients_excludes_me() {
        let ada = Participant::new("Ada", "ada@example.com");
        let me = Participant::new("Me", "ME@example.com");
        let mut conv = Conversation::new(ConversationId::new("c1"), "S", message("m1", &ada, "a"));
        conv.push_message(message("m2", &me, "b"), 100);
        assert_eq!(
            conv.reply_recipients(&Participant::new("Me", "me@example.com")),
            vec!["ada@example.com".to_string()]
        );
    }

    #[test]
    fn test_matches() {
        let ada = Participant::new("Ada Lovelace", "ada@example.com");
        let conv = Conversation::new(
            ConversationId::new("c1"),
            "Project Update",
            message("m1", &ada, "Numbers attached"),
        )
        .with_labels(&["work"]);

        assert!(conv.matches("project"));
        assert!(conv.matches("LOVELACE"));
        assert!(conv.matches("numbers"));
        assert!(conv.matches("work"));
        assert!(conv.matches("  "));
        assert!(!conv.matches("invoice"));
    }

    #[test]
    fn test_json_layout_is_camel_case() {
        let ada = Participant::new("Ada", "ada@example.com");
        let conv = Conversation::new(ConversationId::new("c1"), "S", message("m1", &ada, "a"));
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json.get("lastMessageTime").is_some());
        assert_eq!(json["isStarred"], false);
        assert_eq!(json["id"], "c1");
    }
}
