//! LINE webhook endpoint.
//!
//! Validation decides the status code; once a delivery is validated the
//! response is always 200 so LINE does not redeliver on generation failures.

use crate::context::ConversationTurn;
use crate::server::RelayState;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json};
use futures_util::FutureExt;
use relay_line::{InboundEvent, LineError, ParseError, SIGNATURE_HEADER, TextMessage};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const EMPTY_REPLY_FALLBACK: &str = "あらあら、何て言ったらいいか分からないねえ。";

pub fn router(webhook_path: &str) -> axum::Router {
    axum::Router::new().route(webhook_path, post(line_webhook))
}

#[tracing::instrument(level = "info", skip_all)]
async fn line_webhook(
    Extension(state): Extension<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::info!("line webhook triggered");

    let Ok(body) = std::str::from_utf8(&body) else {
        tracing::error!("request body is not valid utf-8");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
    };
    if body.is_empty() {
        tracing::warn!("empty request body");
        return error_response(StatusCode::BAD_REQUEST, "bad request");
    }
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if signature.is_empty() {
        tracing::warn!("missing x-line-signature header");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    tracing::info!(body_len = body.len(), "request body received");

    let events = match state.parser.parse(body, signature) {
        Ok(events) => events,
        Err(ParseError::InvalidSignature) => {
            tracing::error!("invalid line signature");
            return error_response(StatusCode::FORBIDDEN, "forbidden");
        }
        Err(e @ ParseError::Malformed(_)) => {
            tracing::error!(error = %e, "signed webhook body could not be decoded");
            return error_response(StatusCode::FORBIDDEN, "forbidden");
        }
    };

    if let Err(panic) = AssertUnwindSafe(route_events(&state, events))
        .catch_unwind()
        .await
    {
        tracing::error!(
            panic_payload = %panic_payload_to_string(panic.as_ref()),
            "error handling line events"
        );
    }

    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RouteSummary {
    pub text_events: usize,
    pub replies_sent: usize,
    pub reply_failures: usize,
    pub skipped: usize,
}

pub(crate) async fn route_events(state: &RelayState, events: Vec<InboundEvent>) -> RouteSummary {
    let mut summary = RouteSummary::default();
    for event in events {
        match event {
            InboundEvent::TextMessage(message) => {
                summary.text_events += 1;
                match handle_text_message(state, &message).await {
                    TextOutcome::Replied => summary.replies_sent += 1,
                    TextOutcome::ReplyFailed => summary.reply_failures += 1,
                    TextOutcome::NotAddressed => {}
                    TextOutcome::NoReplyToken => summary.skipped += 1,
                }
            }
            InboundEvent::OtherMessage { message_type, .. } => {
                tracing::debug!(%message_type, "skipping non-text message");
                summary.skipped += 1;
            }
            InboundEvent::NonMessage { event_type } => {
                tracing::debug!(%event_type, "skipping non-message event");
                summary.skipped += 1;
            }
        }
    }
    tracing::info!(
        text_events = summary.text_events,
        replies_sent = summary.replies_sent,
        reply_failures = summary.reply_failures,
        skipped = summary.skipped,
        "line events routed"
    );
    summary
}

enum TextOutcome {
    NotAddressed,
    NoReplyToken,
    Replied,
    ReplyFailed,
}

async fn handle_text_message(state: &RelayState, message: &TextMessage) -> TextOutcome {
    tracing::info!(
        message_id = %message.message_id,
        source_type = message.source.as_ref().map(|s| s.source_type.as_str()).unwrap_or("unknown"),
        text = %message.text,
        "received message"
    );

    let detection = state.detector.detect(&message.text);
    if !detection.addressed {
        // Unaddressed chatter still feeds the window, verbatim.
        state.context.append(ConversationTurn::user(message.text.as_str()));
        tracing::info!("message not addressed to the persona, not replying");
        return TextOutcome::NotAddressed;
    }

    let Some(reply_token) = message.reply_token.as_ref() else {
        state.context.append(ConversationTurn::user(message.text.as_str()));
        tracing::warn!("addressed message has no reply token, skipping reply");
        return TextOutcome::NoReplyToken;
    };

    tracing::info!(payload = %detection.payload, "processing addressed message");
    let mut reply = state.responder.generate(&detection.payload).await;
    if reply.trim().is_empty() {
        reply = EMPTY_REPLY_FALLBACK.to_string();
    }
    state.context.append(ConversationTurn::assistant(reply.as_str()));

    match state.replier.reply_text(reply_token, &reply).await {
        Ok(()) => {
            tracing::info!(reply = %reply, "sent reply");
            TextOutcome::Replied
        }
        Err(e) => {
            log_reply_failure(&e);
            TextOutcome::ReplyFailed
        }
    }
}

fn log_reply_failure(e: &LineError) {
    match e.status() {
        Some(status) if e.is_server_error() => {
            tracing::error!(status, error = %e, "line api server error");
            tracing::info!("server error, will not send error message to user");
        }
        Some(status) => tracing::error!(status, error = %e, "line api client error"),
        None => tracing::error!(error = %e, "line reply failed"),
    }
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(serde_json::json!({ "status": "error", "error": error })),
    )
        .into_response()
}

pub(crate) fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
