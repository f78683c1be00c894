// error.rs — Error types for the versioned-database layer.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`Database`](crate::Database) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The external database tool is not installed or not on PATH.
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: String, hint: String },

    /// The tool ran but exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A read-only query exceeded its time bound.
    #[error("{command} timed out after {}ms", after.as_millis())]
    Timeout { command: String, after: Duration },

    /// The clone has no remote with this name.
    #[error("no remote named '{0}'")]
    RemoteMissing(String),

    /// The remote exists but could not be reached.
    #[error("remote '{0}' is unreachable")]
    RemoteUnreachable(String),

    /// A branch or remote-tracking ref does not exist.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// A row expected by an update or delete is missing.
    #[error("row not found: {0}")]
    RowNotFound(String),

    /// A merge stopped on conflicting rows.
    #[error("merge of {0} has conflicts; resolve them in the clone and commit")]
    MergeConflict(String),

    /// Output from the tool could not be interpreted.
    #[error("could not parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the failure is the tool itself being unavailable.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, StoreError::ToolMissing { .. })
    }

    /// Install or setup guidance to print alongside the error, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            StoreError::ToolMissing { hint, .. } => Some(hint),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
