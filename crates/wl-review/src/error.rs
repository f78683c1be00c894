// error.rs — Error types for review providers.

use thiserror::Error;

/// Errors raised while talking to a hosting provider.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The provider's CLI is not installed or not on PATH.
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: String, hint: String },

    /// The provider rejected a request.
    #[error("{provider} API call {call} failed: {message}")]
    Api {
        provider: &'static str,
        call: String,
        message: String,
    },

    /// No open review shell exists for the branch.
    #[error("no open review for branch {0}")]
    NotFound(String),

    /// The provider has no equivalent of the requested operation.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: String,
    },

    /// A provider response did not have the expected shape.
    #[error("unexpected {provider} response: {reason}")]
    Response {
        provider: &'static str,
        reason: String,
    },

    #[error("invalid repository path '{0}' (expected org/db)")]
    InvalidRepo(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReviewError {
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, ReviewError::ToolMissing { .. })
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            ReviewError::ToolMissing { hint, .. } => Some(hint),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
