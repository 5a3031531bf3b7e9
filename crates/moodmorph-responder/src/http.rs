//! HTTP responder.

use std::time::Duration;

use async_trait::async_trait;
use moodmorph_core::{HistoryRecord, Reply, Responder, TransportError};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::protocol::{
    AnalysisRequest, ChatRequest, ErrorPayload, ResponderPayload, WireHistoryRecord,
};

/// Which endpoint user messages go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderMode {
    /// Conversational replies from `/api/chat`.
    #[default]
    Chat,
    /// One-shot mood analysis from `/api/emotion`.
    Analysis,
}

/// Responder connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub base_url: String,
    pub mode: ResponderMode,
    pub timeout_secs: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            mode: ResponderMode::Chat,
            timeout_secs: 30,
        }
    }
}

impl ResponderConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: ResponderMode) -> Self {
        self.mode = mode;
        self
    }
}

/// [`Responder`] backed by the MoodMorph HTTP API.
#[derive(Clone)]
pub struct HttpResponder {
    client: Client,
    config: ResponderConfig,
}

impl HttpResponder {
    /// Create a responder.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ResponderConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn config(&self) -> &ResponderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ResponderPayload, TransportError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        read_json(response).await
    }
}

/// Check the status and decode the body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorPayload>(&body)
            .ok()
            .and_then(|p| p.error)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))
}

#[async_trait]
impl Responder for HttpResponder {
    async fn respond(&self, utterance: &str) -> Result<Reply, TransportError> {
        let payload = match self.config.mode {
            ResponderMode::Chat => {
                let body = ChatRequest {
                    message: utterance.to_string(),
                };
                self.post("/api/chat", &body).await?
            }
            ResponderMode::Analysis => {
                let body = AnalysisRequest {
                    text: utterance.to_string(),
                    refresh_gif: false,
                };
                self.post("/api/emotion", &body).await?
            }
        };
        payload.into_reply()
    }

    async fn alternate_media(&self, topic: &str) -> Result<Option<String>, TransportError> {
        let payload = self
            .post("/api/emotion", &AnalysisRequest::refresh(topic))
            .await?;
        Ok(payload.gif())
    }

    async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>, TransportError> {
        let response = self
            .client
            .get(self.url(&format!("/api/history?limit={limit}")))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let wire: Vec<WireHistoryRecord> = read_json(response).await?;

        let total = wire.len();
        let mut records: Vec<HistoryRecord> = wire
            .into_iter()
            .filter_map(WireHistoryRecord::into_record)
            .collect();
        if records.len() < total {
            tracing::debug!(skipped = total - records.len(), "history records with bad timestamps");
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn responder(server: &Server, mode: ResponderMode) -> HttpResponder {
        HttpResponder::new(ResponderConfig::new(format!("{}/", server.url())).with_mode(mode)).unwrap()
    }

    #[tokio::test]
    async fn test_chat_mode_posts_message() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::Json(json!({"message": "I feel terrible today"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "response": "That sounds hard.",
                    "gif_url": "https://x/y.gif", "opposite_emotion": "happy"}"#,
            )
            .create_async()
            .await;

        let reply = assert_ok!(
            responder(&server, ResponderMode::Chat)
                .respond("I feel terrible today")
                .await
        );
        assert_eq!(reply.text, "That sounds hard.");
        assert_eq!(reply.media_url.as_deref(), Some("https://x/y.gif"));
        assert_eq!(reply.analysis.topic(), Some("happy"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_analysis_mode_posts_text() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/emotion")
            .match_body(Matcher::Json(json!({"text": "meh"})))
            .with_status(200)
            .with_body(r#"{"encouraging_message": "Hang in there.", "sentiment_score": -0.2}"#)
            .create_async()
            .await;

        let reply = assert_ok!(responder(&server, ResponderMode::Analysis).respond("meh").await);
        assert_eq!(reply.text, "Hang in there.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_carries_server_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body(r#"{"error": "model unavailable"}"#)
            .create_async()
            .await;

        let err = assert_err!(responder(&server, ResponderMode::Chat).respond("hi").await);
        match err {
            TransportError::Status { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = assert_err!(responder(&server, ResponderMode::Chat).respond("hi").await);
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_alternate_media_requests_refresh() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/emotion")
            .match_body(Matcher::Json(json!({"text": "I want to feel calm", "refresh_gif": true})))
            .with_status(200)
            .with_body(r#"{"success": true, "gif_url": "https://x/calm.gif"}"#)
            .create_async()
            .await;

        let url = assert_ok!(responder(&server, ResponderMode::Chat).alternate_media("calm").await);
        assert_eq!(url.as_deref(), Some("https://x/calm.gif"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_history_sorted_oldest_first() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/api/history".to_string()))
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_body(
                r#"[{"detected_emotion": "angry", "opposite_emotion": "calm",
                     "timestamp": "2024-05-02T09:00:00"},
                    {"detected_emotion": "sad", "opposite_emotion": "happy",
                     "timestamp": "2024-05-01T09:00:00", "sentiment_score": -0.6},
                    {"detected_emotion": "odd", "opposite_emotion": "even",
                     "timestamp": "not a time"}]"#,
            )
            .create_async()
            .await;

        let records = assert_ok!(responder(&server, ResponderMode::Chat).history(5).await);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transition(), "Sad → Happy");
        assert_eq!(records[1].detected_emotion, "angry");
    }
}
