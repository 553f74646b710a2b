//! Structured error types for aide
//!
//! Every subsystem returns [`AideError`]. The CLI turns it into a short
//! user-facing message via [`AideError::user_message`].

use std::time::Duration;
use thiserror::Error;

/// Primary error type for aide operations
#[derive(Error, Debug)]
pub enum AideError {
    // =========================================================================
    // Provider / API Errors
    // =========================================================================
    /// Authentication/authorization errors (401/403)
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Quota/billing limit reached
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Rate limit exceeded (429 without a quota marker)
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    /// Provider returned an error
    #[error("provider error: {status} - {message}")]
    ProviderError { status: u16, message: String },

    /// Network/connection error
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Timeout
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    // =========================================================================
    // Tool Execution Errors
    // =========================================================================
    #[error("Tool '{tool_name}' not found")]
    ToolNotFound { tool_name: String },

    #[error("{error}")]
    ToolExecutionFailed { tool_name: String, error: String },

    #[error("{reason}")]
    InvalidToolArguments { tool_name: String, reason: String },

    // =========================================================================
    // Configuration / Input Errors
    // =========================================================================
    #[error("missing required configuration: {key}")]
    MissingConfig { key: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    // =========================================================================
    // Storage / Serialization
    // =========================================================================
    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl AideError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::RateLimitExceeded { .. } => {
                true
            }
            Self::ProviderError { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Check whether the error means the provider refused for quota reasons.
    ///
    /// Providers are inconsistent here, so the rendered message is inspected
    /// too: anything mentioning `insufficient_quota`, `quota` or `429` counts.
    pub fn is_quota(&self) -> bool {
        if matches!(self, Self::QuotaExceeded { .. }) {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("insufficient_quota") || text.contains("quota") || text.contains("429")
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => {
                "Authentication failed. Please check your API key.".to_string()
            }
            Self::QuotaExceeded { .. } => {
                "Unable to complete this request because the API quota is exhausted.".to_string()
            }
            Self::MissingConfig { key } => {
                format!("Missing configuration '{}'. Set it in the environment, a .env file or config.toml.", key)
            }
            Self::ToolExecutionFailed { tool_name, .. } => {
                format!("Failed to execute tool '{}'.", tool_name)
            }
            _ => self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AideError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AideError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<reqwest::Error> for AideError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                duration: Duration::from_secs(0),
            }
        } else if let Some(status) = err.status() {
            Self::ProviderError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Self::ConnectionFailed {
                message: err.to_string(),
            }
        }
    }
}

/// Result type alias using AideError
pub type Result<T> = std::result::Result<T, AideError>;
