// transition.rs — Lifecycle transitions for wanted items.
//
//   open ──claim──▶ claimed ──done──▶ in_review ──accept/close──▶ completed
//    │  ◀──unclaim──┘  ▲                  │
//    │                 └─────reject───────┘
//    └──delete──▶ withdrawn
//
// `update` edits fields of an open item and leaves it open. `completed` and
// `withdrawn` are terminal. Who may perform a transition is decided by the
// caller; this module only knows which statuses allow which kinds.

use std::fmt;

use crate::error::{BoardError, Result};
use crate::model::ItemStatus;

/// The kind of state-changing action requested for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    Claim,
    Unclaim,
    Done,
    Accept,
    Reject,
    Close,
    Delete,
    Update,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 8] = [
        TransitionKind::Claim,
        TransitionKind::Unclaim,
        TransitionKind::Done,
        TransitionKind::Accept,
        TransitionKind::Reject,
        TransitionKind::Close,
        TransitionKind::Delete,
        TransitionKind::Update,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Claim => "claim",
            TransitionKind::Unclaim => "unclaim",
            TransitionKind::Done => "done",
            TransitionKind::Accept => "accept",
            TransitionKind::Reject => "reject",
            TransitionKind::Close => "close",
            TransitionKind::Delete => "delete",
            TransitionKind::Update => "update",
        }
    }

    /// The single status this kind may start from, and where it leads.
    pub fn edge(self) -> (ItemStatus, ItemStatus) {
        match self {
            TransitionKind::Claim => (ItemStatus::Open, ItemStatus::Claimed),
            TransitionKind::Unclaim => (ItemStatus::Claimed, ItemStatus::Open),
            TransitionKind::Done => (ItemStatus::Claimed, ItemStatus::InReview),
            TransitionKind::Accept => (ItemStatus::InReview, ItemStatus::Completed),
            TransitionKind::Reject => (ItemStatus::InReview, ItemStatus::Claimed),
            TransitionKind::Close => (ItemStatus::InReview, ItemStatus::Completed),
            TransitionKind::Delete => (ItemStatus::Open, ItemStatus::Withdrawn),
            TransitionKind::Update => (ItemStatus::Open, ItemStatus::Open),
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `kind` may be applied to an item in `current` status and
/// return the status the item ends up in.
pub fn validate_transition(current: ItemStatus, kind: TransitionKind) -> Result<ItemStatus> {
    let (from, to) = kind.edge();
    if current != from {
        return Err(BoardError::Conflict {
            kind,
            status: current,
        });
    }
    Ok(to)
}
