//! Chat session orchestration and history storage for MoodMorph.
//!
//! Provides:
//! - `SessionManager` - Submit messages, append replies, persist history
//! - Store implementations (memory, file)

pub mod manager;
pub mod record;
pub mod storage;

pub use manager::{
    Exchange, ExchangeKind, ExchangeOutcome, MediaRefresh, PendingRequest, Persistence,
    SessionManager, SessionView,
};
