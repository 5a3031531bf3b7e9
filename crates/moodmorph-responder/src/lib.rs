//! Client for the MoodMorph backend.
//!
//! Provides:
//! - Wire protocol for `/api/chat`, `/api/emotion` and `/api/history`
//! - `HttpResponder`, a `Responder` over HTTP + JSON

pub mod http;
pub mod protocol;

pub use http::{HttpResponder, ResponderConfig, ResponderMode};
pub use protocol::{AnalysisRequest, ChatRequest, ResponderPayload, TherapeuticTool};
