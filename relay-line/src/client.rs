use crate::error::LineError;
use crate::traits::ReplySender;
use crate::types::ReplyToken;
use serde::Deserialize;
use std::time::Duration;

const LINE_DEFAULT_API_BASE_URL: &str = "https://api.line.me";

#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
    api_base_url: String,
}

impl LineClient {
    pub fn new(
        access_token: &str,
        api_base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LineError> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(LineError::InvalidInput(
                "line channel access token is required".to_string(),
            ));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let api_base_url = api_base_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(LINE_DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            access_token: access_token.to_string(),
            api_base_url,
        })
    }

    fn reply_url(&self) -> String {
        format!("{}/v2/bot/message/reply", self.api_base_url)
    }
}

#[async_trait::async_trait]
impl ReplySender for LineClient {
    #[tracing::instrument(level = "info", skip_all)]
    async fn reply_text(&self, reply_token: &ReplyToken, text: &str) -> Result<(), LineError> {
        if reply_token.trim().is_empty() {
            return Err(LineError::InvalidInput("reply token is empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(LineError::InvalidInput("message text is empty".to_string()));
        }

        let payload = serde_json::json!({
            "replyToken": reply_token.as_str(),
            "messages": [{ "type": "text", "text": text }],
        });

        let response = self
            .http
            .post(self.reply_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(LineError::Api {
            status: status.as_u16(),
            message: error_message_from_body(&body),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LineErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<LineErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct LineErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    property: String,
}

/// LINE reports `{"message": ..., "details": [{"message", "property"}]}` on failure.
fn error_message_from_body(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<LineErrorBody>(body) else {
        return body.trim().to_string();
    };
    if parsed.details.is_empty() {
        return parsed.message;
    }
    let details = parsed
        .details
        .iter()
        .map(|d| format!("{}: {}", d.property, d.message))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} ({details})", parsed.message)
}
