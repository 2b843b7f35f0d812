//! Chat-completion client for the relay.
//!
//! Pure HTTP client: role-tagged messages in, one completion out, with every
//! failure classified so callers can map it to a fixed reply.

mod client;
mod error;
mod openai;
mod types;

pub use client::{ChatBackend, LlmClient};
pub use error::{FailureKind, LlmError, Result};
pub use types::{ChatMessage, ChatResponse, CompletionParams, Role, Usage};
