//! Core abstractions for MoodMorph chat sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` - One immutable conversation turn
//! - `SessionLog` - Bounded ordered log with change notifications
//! - `SessionConfig` - Session tunables
//! - `Responder` and `KeyValueStore` collaborator traits

pub mod config;
pub mod message;
pub mod reply;
pub mod session_log;
pub mod traits;
pub mod validate;

pub use config::SessionConfig;
pub use message::{Message, MessageBody, MessageId, MessageKind, Role};
pub use reply::{EmotionAnalysis, HistoryRecord, Reply, Sentiment};
pub use session_log::{LogEvent, SessionLog};
pub use traits::{KeyValueStore, PersistenceError, Responder, TransportError};
pub use validate::{InputMeter, ValidationError, validate_input};
