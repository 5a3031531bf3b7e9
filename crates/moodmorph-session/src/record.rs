//! Persisted history format.
//!
//! The blob is a JSON array of records in the shape the browser client
//! wrote to local storage:
//!
//! ```json
//! [{"text": "hi", "sender": "user", "timestamp": "2024-05-01T10:00:00Z"},
//!  {"text": "[GIF: https://x/y.gif]", "sender": "bot", "timestamp": "...",
//!   "isGif": true, "gifUrl": "https://x/y.gif"}]
//! ```
//!
//! Ids are not persisted; they are reassigned in order on load.

use chrono::{DateTime, Utc};
use moodmorph_core::{Message, MessageBody, MessageId, MessageKind, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Sender {
    User,
    #[serde(alias = "assistant")]
    Bot,
    System,
}

impl From<Role> for Sender {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Bot,
            Role::System => Self::System,
        }
    }
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Self::User,
            Sender::Bot => Self::Assistant,
            Sender::System => Self::System,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(alias = "content")]
    text: String,
    sender: Sender,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_gif: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gif_url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

impl From<&Message> for StoredRecord {
    fn from(msg: &Message) -> Self {
        let (text, gif_url) = match msg.body() {
            MessageBody::Text { text } => (text.clone(), None),
            MessageBody::Media { url, .. } => (format!("[GIF: {url}]"), Some(url.clone())),
        };
        Self {
            text,
            sender: msg.role().into(),
            timestamp: msg.created_at(),
            is_gif: gif_url.is_some(),
            gif_url,
            is_error: msg.kind() == MessageKind::Error,
        }
    }
}

impl StoredRecord {
    fn into_message(self, id: MessageId) -> Message {
        let (kind, body) = match (self.is_gif, self.gif_url) {
            (true, Some(url)) => (MessageKind::Media, MessageBody::Media { url, caption: None }),
            _ if self.is_error => (MessageKind::Error, MessageBody::Text { text: self.text }),
            _ => (MessageKind::Text, MessageBody::Text { text: self.text }),
        };
        Message::restore(id, self.sender.into(), kind, body, self.timestamp)
    }
}

/// Serialize messages to the persisted blob.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode(messages: &[Message]) -> Result<String, serde_json::Error> {
    let records: Vec<StoredRecord> = messages.iter().map(StoredRecord::from).collect();
    serde_json::to_string(&records)
}

/// Parse a persisted blob, numbering messages from `first_id`.
///
/// Individual records that do not decode are skipped.
///
/// # Errors
/// Returns error if the blob is not a JSON array.
pub fn decode(blob: &str, first_id: u64) -> Result<Vec<Message>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(blob)?;
    let total = values.len();
    let records: Vec<StoredRecord> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();

    if records.len() < total {
        tracing::warn!(
            skipped = total - records.len(),
            "skipped undecodable history records"
        );
    }

    Ok(records
        .into_iter()
        .zip(first_id..)
        .map(|(record, id)| record.into_message(MessageId(id)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_roundtrip_preserves_order_role_and_time() {
        let messages = vec![
            Message::user(MessageId(7), "I feel terrible today"),
            Message::assistant(MessageId(8), "That sounds hard."),
            Message::error(MessageId(9), "Sorry"),
        ];
        let blob = encode(&messages).unwrap();
        let restored = decode(&blob, 1).unwrap();

        assert_eq!(restored.len(), 3);
        for (original, loaded) in messages.iter().zip(&restored) {
            assert_eq!(original.role(), loaded.role());
            assert_eq!(original.kind(), loaded.kind());
            assert_eq!(original.body(), loaded.body());
            assert_eq!(original.created_at(), loaded.created_at());
        }
        assert_eq!(restored[0].id(), MessageId(1));
        assert_eq!(restored[2].id(), MessageId(3));
    }

    #[test]
    fn test_media_uses_browser_layout() {
        let blob = encode(&[Message::media(MessageId(1), "https://x/y.gif", None)]).unwrap();
        let value: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value[0]["text"], "[GIF: https://x/y.gif]");
        assert_eq!(value[0]["sender"], "bot");
        assert_eq!(value[0]["isGif"], true);
        assert_eq!(value[0]["gifUrl"], "https://x/y.gif");
        assert!(value[0].get("isError").is_none());

        let restored = decode(&blob, 1).unwrap();
        assert_eq!(restored[0].kind(), MessageKind::Media);
        assert_eq!(restored[0].body().media_url(), Some("https://x/y.gif"));
    }

    #[test]
    fn test_decode_accepts_browser_written_blob() {
        let blob = r#"[
            {"content": "hello", "sender": "user", "timestamp": "2024-05-01T10:00:00.000Z"},
            {"text": "hi there", "sender": "bot", "timestamp": "2024-05-01T10:00:01.000Z"},
            {"text": "missing sender", "timestamp": "2024-05-01T10:00:02.000Z"},
            {"text": "[GIF: u]", "sender": "bot", "timestamp": "2024-05-01T10:00:03.000Z", "isGif": true}
        ]"#;
        let restored = decode(blob, 10).unwrap();
        assert_eq!(restored.len(), 3);
        assert_eq!(restored[0].body().text(), Some("hello"));
        assert_eq!(restored[1].role(), Role::Assistant);
        // isGif without a URL degrades to text.
        assert_eq!(restored[2].kind(), MessageKind::Text);
        assert_eq!(restored[2].id(), MessageId(12));
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(decode("{\"text\": 1}", 1).is_err());
        assert!(decode("not json", 1).is_err());
    }
}
