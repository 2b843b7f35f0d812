use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("api error status={status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("completion was empty")]
    EmptyCompletion,
}

/// Coarse failure class used to pick a user-facing fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    BackendError,
    Unexpected,
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::Api { .. } => FailureKind::BackendError,
            Self::Http(_) | Self::Timeout(_) | Self::ResponseFormat(_) | Self::EmptyCompletion => {
                FailureKind::Unexpected
            }
        }
    }

    /// Short stable label for log fields.
    pub fn class(&self) -> &'static str {
        match self {
            Self::RateLimited(_) => "rate_limited",
            Self::Api { .. } => "api",
            Self::Http(_) => "http",
            Self::Timeout(_) => "timeout",
            Self::ResponseFormat(_) => "response_format",
            Self::EmptyCompletion => "empty_completion",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
