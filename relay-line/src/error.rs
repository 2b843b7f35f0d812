use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("line api error status={status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(String),
}

impl LineError {
    /// True when LINE itself reported a 5xx; the reply channel is presumed down.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LineError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// Failure to turn a webhook delivery into events.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed webhook body: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
