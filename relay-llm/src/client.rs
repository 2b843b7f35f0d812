use crate::error::Result;
use crate::openai::{OPENAI_DEFAULT_BASE_URL, OpenAiClient};
use crate::types::{ChatMessage, ChatResponse, CompletionParams};
use async_trait::async_trait;
use std::time::Duration;

/// Anything that can turn a role-tagged transcript into one completion.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    inner: OpenAiClient,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(api_key: &str, model: &str, base_url: Option<&str>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        let base_url = base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(OPENAI_DEFAULT_BASE_URL);
        Self {
            inner: OpenAiClient::new(http, api_key, model, base_url),
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    #[tracing::instrument(level = "info", skip_all)]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<ChatResponse> {
        let resp = self.inner.chat(messages, params).await?;
        tracing::debug!(
            prompt_tokens = resp.usage.prompt_tokens,
            completion_tokens = resp.usage.completion_tokens,
            finish_reason = %resp.finish_reason,
            "completion received"
        );
        Ok(resp)
    }
}
