//! Wire protocol for the MoodMorph backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use moodmorph_core::{EmotionAnalysis, HistoryRecord, Reply, Sentiment, TransportError};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Body of `POST /api/emotion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    /// Ask only for a fresh GIF.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refresh_gif: bool,
}

impl AnalysisRequest {
    /// Request for a replacement GIF about `topic`.
    #[must_use]
    pub fn refresh(topic: &str) -> Self {
        Self {
            text: format!("I want to feel {topic}"),
            refresh_gif: true,
        }
    }
}

/// A guided exercise attached to a therapeutic tool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Therapeutic tool recommendation, structured or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TherapeuticTool {
    Structured {
        name: String,
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        exercise: Option<Exercise>,
    },
    Plain(String),
}

impl TherapeuticTool {
    /// One-line summary suitable for a chat message.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            Self::Structured { name, exercise, .. } => {
                let Some(exercise) = exercise else {
                    return name.clone();
                };
                let detail = match (&exercise.name, &exercise.description) {
                    (Some(n), Some(d)) => format!("{n} - {d}"),
                    (Some(n), None) => n.clone(),
                    (None, Some(d)) => d.clone(),
                    (None, None) => return name.clone(),
                };
                format!("{name}: {detail}")
            }
        }
    }
}

/// Success body of `/api/chat` and `/api/emotion`.
///
/// The chat flow fills `response`; the analysis flow fills
/// `encouraging_message`. Everything else is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponderPayload {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub encouraging_message: Option<String>,
    #[serde(default)]
    pub gif_url: Option<String>,
    #[serde(default)]
    pub detected_emotion: Option<String>,
    #[serde(default)]
    pub opposite_emotion: Option<String>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub emotion_intensity: Option<f64>,
    #[serde(default)]
    pub therapeutic_tool: Option<TherapeuticTool>,
    #[serde(default)]
    pub therapeutic_suggestion: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

impl ResponderPayload {
    /// Non-empty GIF URL, if any.
    #[must_use]
    pub fn gif(&self) -> Option<String> {
        non_empty(self.gif_url.clone())
    }

    /// Convert into a domain reply.
    ///
    /// # Errors
    /// [`TransportError::Rejected`] when the body reports `success: false`,
    /// [`TransportError::Malformed`] when it carries no reply text.
    pub fn into_reply(self) -> Result<Reply, TransportError> {
        if self.success == Some(false) {
            let reason = non_empty(self.error)
                .or_else(|| non_empty(self.response))
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(TransportError::Rejected(reason));
        }

        let media_url = self.gif();
        let text = non_empty(self.response)
            .or_else(|| non_empty(self.encouraging_message))
            .ok_or_else(|| TransportError::Malformed("no response text".to_string()))?;
        let suggestion = non_empty(self.therapeutic_suggestion)
            .or_else(|| self.therapeutic_tool.as_ref().map(TherapeuticTool::summary));
        let analysis = EmotionAnalysis {
            detected: non_empty(self.detected_emotion),
            opposite: non_empty(self.opposite_emotion),
            sentiment: self
                .sentiment_score
                .or(self.emotion_intensity)
                .map(Sentiment::new),
        };

        Ok(Reply {
            text,
            media_url,
            suggestion,
            analysis,
        })
    }
}

/// Error body of a non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
}

/// One record of `GET /api/history`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireHistoryRecord {
    pub detected_emotion: String,
    pub opposite_emotion: String,
    pub timestamp: String,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub gif_url: Option<String>,
}

impl WireHistoryRecord {
    /// Convert, accepting RFC 3339 or a naive ISO timestamp taken as UTC.
    #[must_use]
    pub fn into_record(self) -> Option<HistoryRecord> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        Some(HistoryRecord {
            detected_emotion: self.detected_emotion,
            opposite_emotion: self.opposite_emotion,
            timestamp,
            sentiment_score: self.sentiment_score,
            gif_url: non_empty(self.gif_url),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn payload(json: &str) -> ResponderPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_chat_payload_to_reply() {
        let reply = assert_ok!(
            payload(
                r#"{"success": true, "response": "That sounds hard.",
                    "gif_url": "https://x/y.gif", "detected_emotion": "sad",
                    "opposite_emotion": "happy", "emotion_intensity": -0.7}"#
            )
            .into_reply()
        );
        assert_eq!(reply.text, "That sounds hard.");
        assert_eq!(reply.media_url.as_deref(), Some("https://x/y.gif"));
        assert_eq!(reply.suggestion, None);
        assert_eq!(reply.analysis.topic(), Some("happy"));
        assert_eq!(reply.analysis.sentiment.map(Sentiment::label), Some("Very Negative"));
    }

    #[test]
    fn test_analysis_payload_uses_encouraging_message_and_tool() {
        let reply = assert_ok!(
            payload(
                r#"{"encouraging_message": "Every feeling is temporary.",
                    "sentiment_score": 0.2, "gif_url": "",
                    "therapeutic_tool": {"name": "Breathing Exercise", "type": "breathing",
                        "exercise": {"name": "4-7-8 Breathing",
                                     "description": "Inhale for 4, hold for 7, exhale for 8",
                                     "instructions": ["Inhale", "Hold", "Exhale"]}}}"#
            )
            .into_reply()
        );
        assert_eq!(reply.text, "Every feeling is temporary.");
        assert_eq!(reply.media_url, None);
        assert_eq!(
            reply.suggestion.as_deref(),
            Some("Breathing Exercise: 4-7-8 Breathing - Inhale for 4, hold for 7, exhale for 8")
        );
    }

    #[test]
    fn test_suggestion_string_wins_over_tool() {
        let reply = assert_ok!(
            payload(
                r#"{"response": "ok", "therapeutic_suggestion": "Take a short walk.",
                    "therapeutic_tool": "Gemini AI: warm"}"#
            )
            .into_reply()
        );
        assert_eq!(reply.suggestion.as_deref(), Some("Take a short walk."));
    }

    #[test]
    fn test_unsuccessful_and_empty_payloads() {
        let err = assert_err!(payload(r#"{"success": false, "error": "quota"}"#).into_reply());
        assert!(matches!(err, TransportError::Rejected(ref r) if r == "quota"));

        let err = assert_err!(payload(r#"{"gif_url": "https://x"}"#).into_reply());
        assert!(matches!(err, TransportError::Malformed(_)));

        let err = assert_err!(payload(r#"{"response": "   "}"#).into_reply());
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn test_refresh_request_body() {
        let body = serde_json::to_value(AnalysisRequest::refresh("happy")).unwrap();
        assert_eq!(body, serde_json::json!({"text": "I want to feel happy", "refresh_gif": true}));

        let plain = AnalysisRequest {
            text: "hi".into(),
            refresh_gif: false,
        };
        assert_eq!(serde_json::to_value(plain).unwrap(), serde_json::json!({"text": "hi"}));
    }

    #[test]
    fn test_history_timestamps() {
        let naive: WireHistoryRecord = serde_json::from_str(
            r#"{"detected_emotion": "sad", "opposite_emotion": "happy",
                "timestamp": "2024-05-01T10:00:00.123456"}"#,
        )
        .unwrap();
        let record = naive.into_record().unwrap();
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T10:00:00.123456+00:00");

        let bad: WireHistoryRecord = serde_json::from_str(
            r#"{"detected_emotion": "sad", "opposite_emotion": "happy", "timestamp": "yesterday"}"#,
        )
        .unwrap();
        assert!(bad.into_record().is_none());
    }
}
