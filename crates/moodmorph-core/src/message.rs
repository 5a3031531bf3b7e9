//! Conversation messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier, unique and increasing within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person journaling.
    User,
    /// The remote responder, or a local stand-in for it.
    Assistant,
    /// Session notices (connection changes and the like).
    System,
}

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// A media reference (GIF URL).
    Media,
    /// Locally synthesized fallback shown when the responder fails.
    Error,
}

/// Message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    /// Text content.
    Text { text: String },
    /// Media reference, with an optional caption (the topic it illustrates).
    Media { url: String, caption: Option<String> },
}

impl MessageBody {
    /// Text content, if this is a text body.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Media { .. } => None,
        }
    }

    /// Media URL, if this is a media body.
    #[must_use]
    pub fn media_url(&self) -> Option<&str> {
        match self {
            Self::Media { url, .. } => Some(url),
            Self::Text { .. } => None,
        }
    }
}

/// One turn in the conversation.
///
/// Fields are private so a message cannot change once it is in a log.
/// The only sanctioned mutation is swapping the URL of a media message,
/// which goes through [`crate::SessionLog::replace_media`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    kind: MessageKind,
    body: MessageBody,
    created_at: DateTime<Utc>,
}

impl Message {
    /// A text message from the user.
    #[must_use]
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self::text(id, Role::User, text)
    }

    /// A text message from the assistant.
    #[must_use]
    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        Self::text(id, Role::Assistant, text)
    }

    /// A system notice.
    #[must_use]
    pub fn system(id: MessageId, text: impl Into<String>) -> Self {
        Self::text(id, Role::System, text)
    }

    /// An assistant media message.
    #[must_use]
    pub fn media(id: MessageId, url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            kind: MessageKind::Media,
            body: MessageBody::Media {
                url: url.into(),
                caption,
            },
            created_at: Utc::now(),
        }
    }

    /// An assistant fallback message standing in for a failed reply.
    #[must_use]
    pub fn error(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            ..Self::text(id, Role::Assistant, text)
        }
    }

    fn text(id: MessageId, role: Role, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            kind: MessageKind::Text,
            body: MessageBody::Text { text: text.into() },
            created_at: Utc::now(),
        }
    }

    /// Rebuild a message from persisted parts.
    ///
    /// A media body forces `kind` to [`MessageKind::Media`]; a text body
    /// cannot be tagged as media.
    #[must_use]
    pub fn restore(
        id: MessageId,
        role: Role,
        kind: MessageKind,
        body: MessageBody,
        created_at: DateTime<Utc>,
    ) -> Self {
        let kind = match (&body, kind) {
            (MessageBody::Media { .. }, _) => MessageKind::Media,
            (MessageBody::Text { .. }, MessageKind::Media) => MessageKind::Text,
            (MessageBody::Text { .. }, kind) => kind,
        };
        Self {
            id,
            role,
            kind,
            body,
            created_at,
        }
    }

    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    #[must_use]
    pub const fn body(&self) -> &MessageBody {
        &self.body
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Swap the media URL. Returns `false` for non-media messages.
    pub(crate) fn set_media_url(&mut self, new_url: String) -> bool {
        match &mut self.body {
            MessageBody::Media { url, .. } => {
                *url = new_url;
                true
            }
            MessageBody::Text { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_is_assistant_error_kind() {
        let msg = Message::error(MessageId(3), "oops");
        assert_eq!(msg.role(), Role::Assistant);
        assert_eq!(msg.kind(), MessageKind::Error);
        assert_eq!(msg.body().text(), Some("oops"));
    }

    #[test]
    fn test_restore_reconciles_kind_with_body() {
        let now = Utc::now();
        let media = Message::restore(
            MessageId(1),
            Role::Assistant,
            MessageKind::Text,
            MessageBody::Media {
                url: "https://x/y.gif".into(),
                caption: None,
            },
            now,
        );
        assert_eq!(media.kind(), MessageKind::Media);

        let text = Message::restore(
            MessageId(2),
            Role::User,
            MessageKind::Media,
            MessageBody::Text { text: "hi".into() },
            now,
        );
        assert_eq!(text.kind(), MessageKind::Text);
        assert_eq!(text.created_at(), now);
    }

    #[test]
    fn test_set_media_url_only_touches_media() {
        let mut text = Message::user(MessageId(1), "hello");
        assert!(!text.set_media_url("https://a".into()));
        assert_eq!(text.body().text(), Some("hello"));

        let mut media = Message::media(MessageId(2), "https://old", Some("joy".into()));
        assert!(media.set_media_url("https://new".into()));
        assert_eq!(media.body().media_url(), Some("https://new"));
    }
}
