use crate::error::ParseError;
use crate::signature::verify_signature;
use crate::types::{EventSource, MessageId, ReplyToken, UserId};
use serde::Deserialize;

/// A webhook event, classified once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    TextMessage(TextMessage),
    OtherMessage {
        message_type: String,
        reply_token: Option<ReplyToken>,
    },
    NonMessage {
        event_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub message_id: MessageId,
    /// Absent for deliveries that cannot be answered, e.g. standby mode.
    pub reply_token: Option<ReplyToken>,
    pub text: String,
    pub source: Option<EventSource>,
}

/// Verifies `x-line-signature` and decodes the webhook envelope.
#[derive(Clone)]
pub struct WebhookParser {
    channel_secret: String,
}

impl WebhookParser {
    pub fn new(channel_secret: &str) -> Self {
        Self {
            channel_secret: channel_secret.to_string(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn parse(&self, body: &str, signature: &str) -> Result<Vec<InboundEvent>, ParseError> {
        if !verify_signature(&self.channel_secret, body.as_bytes(), signature) {
            return Err(ParseError::InvalidSignature);
        }
        let payload: LineWebhookPayload = serde_json::from_str(body)?;
        tracing::debug!(
            destination = payload.destination.as_deref().unwrap_or_default(),
            event_count = payload.events.len(),
            "line webhook decoded"
        );
        Ok(payload.events.into_iter().map(classify_event).collect())
    }
}

fn classify_event(event: LineEvent) -> InboundEvent {
    if event.event_type != "message" {
        return InboundEvent::NonMessage {
            event_type: event.event_type,
        };
    }
    let reply_token = event.reply_token.filter(|t| !t.trim().is_empty());
    let Some(message) = event.message else {
        return InboundEvent::OtherMessage {
            message_type: "unknown".to_string(),
            reply_token: reply_token.map(ReplyToken::from),
        };
    };
    let is_text = message.message_type == "text";
    match (is_text, message.text) {
        (true, Some(text)) => InboundEvent::TextMessage(TextMessage {
            message_id: message.id.into(),
            reply_token: reply_token.map(ReplyToken::from),
            text,
            source: event.source.map(to_event_source),
        }),
        _ => InboundEvent::OtherMessage {
            message_type: message.message_type,
            reply_token: reply_token.map(ReplyToken::from),
        },
    }
}

fn to_event_source(source: LineSource) -> EventSource {
    EventSource {
        source_type: source.source_type,
        user_id: source.user_id.map(UserId::from),
        group_id: source.group_id,
        room_id: source.room_id,
    }
}

#[derive(Debug, Deserialize)]
struct LineWebhookPayload {
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<LineSource>,
    #[serde(default)]
    message: Option<LineMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineSource {
    #[serde(rename = "type", default)]
    source_type: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    text: Option<String>,
}
