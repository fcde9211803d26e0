//! Unified error types for xAgent

use thiserror::Error;

/// Unified error type for all xAgent operations
#[derive(Error, Debug)]
pub enum XAgentError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Operator errors
    #[error("Operator initialization failed: {0}")]
    OperatorInit(String),

    #[error("Operator error: {0}")]
    Operator(String),

    #[error("Screenshot failed: {0}")]
    Screenshot(String),

    // Model errors
    /// Transport-level failure of a model call. `status` carries the HTTP
    /// status code when the endpoint answered at all.
    #[error("Model call failed{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Model {
        status: Option<u16>,
        message: String,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API limit: {0}")]
    ApiLimit(String),

    /// The run was cancelled through the abort signal or `stop()`
    #[error("AbortError: {0}")]
    Aborted(String),

    // Tool gating errors
    #[error("Tool call rejected: {0}")]
    ToolRejected(String),

    #[error("Parse error: {0}")]
    Parse(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl XAgentError {
    /// Build a model error without a status code
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status code attached to a model error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Model { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error represents a cancellation rather than a failure.
    ///
    /// `Aborted` is the typed signal. Untyped transport errors are matched
    /// best-effort on "AbortError", "aborted" and "cancelled"/"canceled".
    pub fn is_abort(&self) -> bool {
        match self {
            Self::Aborted(_) => true,
            Self::Model { message, .. } | Self::Operator(message) | Self::Other(message) => {
                let lower = message.to_lowercase();
                lower.contains("aborterror")
                    || lower.contains("aborted")
                    || lower.contains("cancelled")
                    || lower.contains("canceled")
            }
            _ => false,
        }
    }
}

/// Result type alias using XAgentError
pub type Result<T> = std::result::Result<T, XAgentError>;
