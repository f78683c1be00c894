// error.rs — Error types for wanted-board items and their lifecycle.

use thiserror::Error;

use crate::model::ItemStatus;
use crate::transition::TransitionKind;

/// Errors raised while validating or applying a wanted-board action.
///
/// Variants fall in two groups: input validation (bad field values) and
/// state conflicts (wrong status, wrong actor, self-referential action).
/// [`BoardError::is_validation`] tells them apart for callers that map
/// errors onto a policy.
#[derive(Debug, Error)]
pub enum BoardError {
    /// A field value is out of range or malformed.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A required field was empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// The requested transition is not allowed from the current status.
    #[error("cannot {kind} item: status is {status}")]
    Conflict {
        kind: TransitionKind,
        status: ItemStatus,
    },

    /// `done` attempted by a rig that does not hold the claim.
    #[error("item {item_id} is not claimed by you (claimed by {claimed_by})")]
    NotClaimedByYou { item_id: String, claimed_by: String },

    /// An action restricted to the poster was attempted by someone else.
    #[error("only the poster ({posted_by}) can {action} item {item_id}")]
    NotPoster {
        item_id: String,
        action: TransitionKind,
        posted_by: String,
    },

    /// `unclaim` attempted by a rig that is neither claimer nor poster.
    #[error("only the claimer ({claimed_by}) or poster ({posted_by}) can unclaim item {item_id}")]
    NotClaimerOrPoster {
        item_id: String,
        claimed_by: String,
        posted_by: String,
    },

    /// The acceptor submitted the completion being accepted.
    #[error("cannot accept your own completion for item {0}")]
    SelfAccept(String),

    /// A stamp whose author is also its subject.
    #[error("rig {0} cannot stamp itself")]
    SelfStamp(String),

    /// The item does not exist in the observed ref.
    #[error("wanted item not found: {0}")]
    NotFound(String),

    /// The item has no active completion record.
    #[error("no completion recorded for item {0}")]
    NoCompletion(String),
}

impl BoardError {
    /// True for input validation errors (nothing was looked up or mutated).
    pub fn is_validation(&self) -> bool {
        matches!(self, BoardError::Invalid { .. } | BoardError::Missing(_))
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
