//! LINE Messaging API adapter.
//!
//! Pure I/O: verifies and decodes webhook deliveries into [`InboundEvent`]s and
//! sends text replies keyed by a reply token.

mod client;
mod error;
mod events;
mod signature;
mod traits;
mod types;

pub use client::LineClient;
pub use error::{LineError, ParseError};
pub use events::{InboundEvent, TextMessage, WebhookParser};
pub use signature::{SIGNATURE_HEADER, compute_signature, verify_signature};
pub use traits::ReplySender;
pub use types::{EventSource, MessageId, ReplyToken, UserId};
