use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlackError {
    /// Slack answered `{"ok": false, "error": code}`.
    #[error("{method} failed: {code}")]
    Api { method: String, code: String },
    #[error("{method} transport error: {source}")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned status {status}")]
    Status {
        method: String,
        status: u16,
        retry_after_secs: Option<u64>,
    },
    #[error("{method} response could not be decoded: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SlackError {
    pub fn api(method: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Api {
            method: method.into(),
            code: code.into(),
        }
    }

    /// The Slack error code, for API-level failures.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True when this is an API failure with the given code, e.g. `name_taken`.
    pub fn is(&self, code: &str) -> bool {
        self.code() == Some(code)
    }

    pub fn method(&self) -> &str {
        match self {
            Self::Api { method, .. }
            | Self::Transport { method, .. }
            | Self::Status { method, .. }
            | Self::Decode { method, .. } => method,
        }
    }
}
