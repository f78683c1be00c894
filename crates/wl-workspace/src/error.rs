// error.rs — Error types for workspaces and coordinated mutations.

use std::path::PathBuf;

use thiserror::Error;
use wl_board::BoardError;
use wl_review::ReviewError;
use wl_store::StoreError;

/// Errors raised while resolving a workspace or running a mutation.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    /// No commons has been joined yet.
    #[error("not joined to any commons")]
    NotJoined,

    /// `--commons` named a commons that is not in the registry.
    #[error("not joined to {0}")]
    UnknownCommons(String),

    /// Several commons are joined and none was selected.
    #[error("joined to several commons ({})", .0.join(", "))]
    Ambiguous(Vec<String>),

    #[error("already joined to {0}")]
    AlreadyJoined(String),

    /// A workspace config field failed validation.
    #[error("invalid workspace config: {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The command needs a review provider but none was supplied.
    #[error("no review provider available for this workspace")]
    NoProvider,

    /// No item branch exists for a branch-scoped command.
    #[error("no branch {0} for this item")]
    NoBranch(String),

    #[error("cannot determine a config directory; set WL_CONFIG_DIR")]
    NoConfigDir,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize workspace registry: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("bad pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl WorkspaceError {
    /// A concrete next step for the user, where one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            WorkspaceError::NotJoined => Some("run `wl join <org/db>` first".to_string()),
            WorkspaceError::UnknownCommons(key) => Some(format!("run `wl join {}` first", key)),
            WorkspaceError::Ambiguous(keys) => Some(format!(
                "pass --commons <org/db> to pick one of: {}",
                keys.join(", ")
            )),
            WorkspaceError::NoBranch(_) => {
                Some("the item has no review branch; was it mutated in pr mode?".to_string())
            }
            WorkspaceError::Store(e) => e.hint().map(str::to_string),
            WorkspaceError::Review(e) => e.hint().map(str::to_string),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
