//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on a single user message, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 500;
/// Default Session Log bound.
pub const DEFAULT_CAPACITY: usize = 50;
/// Default number of messages shown after rehydration.
pub const DEFAULT_INITIAL_VIEW: usize = 10;
/// Default key of the persisted history blob.
pub const DEFAULT_STORAGE_KEY: &str = "moodmorph_chat_history";

const DEFAULT_FALLBACK: &str = "Sorry, I'm having trouble connecting right now. Please try again!";
const DEFAULT_GREETING: &str = "Hey! I'm so glad you're here. Whatever's going on in your world \
right now, I'm here to listen and help brighten your day. What's on your heart today?";

/// Tunables of a chat session.
///
/// Every field has a default, so a partial JSON object deserializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Longest accepted input, counted in characters.
    pub max_input_chars: usize,
    /// Session Log bound.
    pub capacity: usize,
    /// Messages exposed to the renderer after rehydration.
    pub initial_view: usize,
    /// Key of the persisted blob.
    pub storage_key: String,
    /// Body of the error message appended when the responder fails.
    pub fallback_text: String,
    /// Welcome text shown while the log is empty.
    pub greeting: String,
    /// Delay between successive assistant appends, in milliseconds.
    pub reply_pacing_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            capacity: DEFAULT_CAPACITY,
            initial_view: DEFAULT_INITIAL_VIEW,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            fallback_text: DEFAULT_FALLBACK.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            reply_pacing_ms: 0,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    #[must_use]
    pub fn with_reply_pacing(mut self, pacing: Duration) -> Self {
        self.reply_pacing_ms = u64::try_from(pacing.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay between successive assistant appends.
    #[must_use]
    pub const fn reply_pacing(&self) -> Duration {
        Duration::from_millis(self.reply_pacing_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"capacity": 20}"#).unwrap();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.max_input_chars, 500);
        assert_eq!(config.initial_view, 10);
        assert_eq!(config.storage_key, "moodmorph_chat_history");
        assert_eq!(config.reply_pacing(), Duration::ZERO);
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::default()
            .with_capacity(5)
            .with_storage_key("other")
            .with_reply_pacing(Duration::from_millis(500));
        assert_eq!(config.capacity, 5);
        assert_eq!(config.storage_key, "other");
        assert_eq!(config.reply_pacing_ms, 500);
    }
}
