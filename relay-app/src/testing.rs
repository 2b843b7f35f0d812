//! In-process fakes for the LLM backend and the LINE reply API.

use crate::context::ContextBuffer;
use crate::persona::PersonaSource;
use crate::responder::ResponseGenerator;
use crate::server::RelayState;
use crate::wake::AddressDetector;
use async_trait::async_trait;
use relay_line::{LineError, ReplySender, ReplyToken, WebhookParser};
use relay_llm::{
    ChatBackend, ChatMessage, ChatResponse, CompletionParams, LlmError, Role, Usage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Reply(String),
    RateLimited,
    ApiError(u16),
    Timeout,
    Network,
}

/// Plays back scripted outcomes and records every transcript it was sent.
/// Once the script runs out it answers "はいよ".
pub struct FakeBackend {
    script: Mutex<VecDeque<FakeOutcome>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeBackend {
    pub fn new(script: Vec<FakeOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &CompletionParams,
    ) -> relay_llm::Result<ChatResponse> {
        self.calls.lock().expect("calls lock").push(messages.to_vec());
        let outcome = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| FakeOutcome::Reply("はいよ".to_string()));
        match outcome {
            FakeOutcome::Reply(content) => Ok(ChatResponse {
                message: ChatMessage {
                    role: Role::Assistant,
                    content,
                },
                usage: Usage::default(),
                finish_reason: "stop".to_string(),
            }),
            FakeOutcome::RateLimited => Err(LlmError::RateLimited("slow down".to_string())),
            FakeOutcome::ApiError(status) => Err(LlmError::Api {
                status,
                message: "backend unhappy".to_string(),
            }),
            FakeOutcome::Timeout => Err(LlmError::Timeout("deadline elapsed".to_string())),
            FakeOutcome::Network => Err(LlmError::Http("connection reset".to_string())),
        }
    }
}

/// Records replies; optionally fails every send with the given LINE status.
#[derive(Default)]
pub struct FakeReplier {
    fail_status: Option<u16>,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeReplier {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// `(reply_token, text)` pairs in send order, including failed attempts.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl ReplySender for FakeReplier {
    async fn reply_text(&self, reply_token: &ReplyToken, text: &str) -> Result<(), LineError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((reply_token.to_string(), text.to_string()));
        match self.fail_status {
            Some(status) => Err(LineError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Relay state wired to the given fakes, with wake word "ろんな", a
/// five-turn context and a persona path inside the returned temp dir.
pub fn relay_state(
    channel_secret: &str,
    backend: Arc<dyn ChatBackend>,
    replier: Arc<dyn ReplySender>,
) -> (tempfile::TempDir, Arc<RelayState>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let context = Arc::new(ContextBuffer::new(5));
    let responder = ResponseGenerator::new(
        backend,
        context.clone(),
        PersonaSource::new(dir.path().join("system_prompt.txt")),
        CompletionParams::default(),
        150,
    );
    let state = Arc::new(RelayState {
        parser: WebhookParser::new(channel_secret),
        detector: AddressDetector::new("ろんな", "あいさつ"),
        context,
        responder,
        replier,
    });
    (dir, state)
}
