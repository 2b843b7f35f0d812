//! Relay configuration loader.
//!
//! TOML file (every section optional) → environment overrides → validation.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "ronna.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path LINE posts deliveries to.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:7071".to_string()
}

fn default_webhook_path() -> String {
    "/api/HttpTrigger1".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    230
}

fn default_http_max_in_flight() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            webhook_path: default_webhook_path(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_access_token: String,
    #[serde(default)]
    pub channel_secret: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_line_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_line_timeout_seconds() -> u64 {
    30
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            channel_secret: String::new(),
            api_base_url: None,
            timeout_seconds: default_line_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_llm_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_timeout_seconds() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    200
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_p() -> f32 {
    0.9
}

fn default_frequency_penalty() -> f32 {
    0.1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            timeout_seconds: default_llm_timeout_seconds(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            frequency_penalty: default_frequency_penalty(),
        }
    }
}

impl LlmConfig {
    pub fn completion_params(&self) -> relay_llm::CompletionParams {
        relay_llm::CompletionParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            n: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    /// Payload used when the wake word arrives on its own.
    #[serde(default = "default_greeting_payload")]
    pub greeting_payload: String,
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
    #[serde(default = "default_context_capacity")]
    pub context_capacity: usize,
}

fn default_prompt_path() -> PathBuf {
    PathBuf::from("system_prompt.txt")
}

fn default_wake_word() -> String {
    "ろんな".to_string()
}

fn default_greeting_payload() -> String {
    "あいさつ".to_string()
}

fn default_max_reply_chars() -> usize {
    150
}

fn default_context_capacity() -> usize {
    5
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            prompt_path: default_prompt_path(),
            wake_word: default_wake_word(),
            greeting_payload: default_greeting_payload(),
            max_reply_chars: default_max_reply_chars(),
            context_capacity: default_context_capacity(),
        }
    }
}

impl RelayConfig {
    /// Load from `path`, `$RONNA_CONFIG`, or `./ronna.toml`.
    ///
    /// The implicit default file may be absent; the relay then runs on
    /// environment variables alone. An explicitly named file must exist.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.or_else(|| {
            std::env::var("RONNA_CONFIG")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        });

        let mut cfg = match explicit {
            Some(path) => Self::from_file(&path).await?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::from_file(&path).await?
                } else {
                    tracing::info!("no {DEFAULT_CONFIG_FILE} found; using defaults and environment");
                    Self::default()
                }
            }
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    async fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("LINE_CHANNEL_ACCESS_TOKEN") {
            self.line.channel_access_token = v;
        }
        if let Some(v) = var("LINE_CHANNEL_SECRET") {
            self.line.channel_secret = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = var("RONNA_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("RONNA_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = var("RONNA_PERSONA_PATH") {
            self.persona.prompt_path = PathBuf::from(v);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(anyhow::anyhow!("llm.model is required"));
        }
        if self.persona.wake_word.chars().count() != 3 {
            return Err(anyhow::anyhow!(
                "persona.wake_word must be exactly 3 characters, got {:?}",
                self.persona.wake_word
            ));
        }
        if self.persona.greeting_payload.trim().is_empty() {
            return Err(anyhow::anyhow!("persona.greeting_payload must not be empty"));
        }
        if self.persona.context_capacity == 0 {
            return Err(anyhow::anyhow!("persona.context_capacity must be > 0"));
        }
        if !self.server.webhook_path.starts_with('/') {
            return Err(anyhow::anyhow!("server.webhook_path must start with '/'"));
        }
        if self.server.http_timeout_seconds == 0
            || self.llm.timeout_seconds == 0
            || self.line.timeout_seconds == 0
        {
            return Err(anyhow::anyhow!("timeouts must be > 0 seconds"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Secrets needed to actually serve LINE traffic.
    pub fn require_credentials(&self) -> anyhow::Result<()> {
        let mut missing = Vec::new();
        if self.line.channel_access_token.trim().is_empty() {
            missing.push("LINE_CHANNEL_ACCESS_TOKEN");
        }
        if self.line.channel_secret.trim().is_empty() {
            missing.push("LINE_CHANNEL_SECRET");
        }
        if self.llm.api_key.trim().is_empty() {
            missing.push("OPENAI_API_KEY");
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(anyhow::anyhow!("missing credentials: {}", missing.join(", ")))
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_seconds)
    }

    pub fn line_timeout(&self) -> Duration {
        Duration::from_secs(self.line.timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.server.http_timeout_seconds)
    }
}

pub fn presence(secret: &str) -> &'static str {
    if secret.trim().is_empty() { "missing" } else { "set" }
}
