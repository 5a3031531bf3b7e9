//! Collaborator traits: the remote responder and the persistent store.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::reply::{HistoryRecord, Reply};

/// Responder failure. Never surfaced past the session manager; it is
/// converted into an error message in the log instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Http(String),
    #[error("Responder returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Responder rejected the message: {0}")]
    Rejected(String),
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// Store failure. Logged; the session falls back to memory-only mode.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Store quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Remote service that turns an utterance into a reply.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Exchange one user utterance for a reply.
    async fn respond(&self, utterance: &str) -> Result<Reply, TransportError>;

    /// Ask for a replacement media reference about `topic`.
    ///
    /// `Ok(None)` means the responder had nothing new to offer.
    async fn alternate_media(&self, topic: &str) -> Result<Option<String>, TransportError>;

    /// Recent exchanges recorded by the responder, oldest first.
    async fn history(&self, _limit: usize) -> Result<Vec<HistoryRecord>, TransportError> {
        Ok(Vec::new())
    }
}

/// Key-value blob store with whole-value, last-write-wins semantics.
///
/// Calls are synchronous: writes happen inline with the append they follow.
pub trait KeyValueStore: Send + Sync {
    /// Read the blob under `key`.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the blob under `key`.
    ///
    /// # Errors
    /// Returns error if the write fails or exceeds the backend's quota.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Remove the blob under `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<T: Responder + ?Sized> Responder for Arc<T> {
    async fn respond(&self, utterance: &str) -> Result<Reply, TransportError> {
        (**self).respond(utterance).await
    }

    async fn alternate_media(&self, topic: &str) -> Result<Option<String>, TransportError> {
        (**self).alternate_media(topic).await
    }

    async fn history(&self, limit: usize) -> Result<Vec<HistoryRecord>, TransportError> {
        (**self).history(limit).await
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        (**self).remove(key)
    }
}
