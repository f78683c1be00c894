//! # wl-board
//!
//! The rows of a wanted board and the rules for moving them through their
//! lifecycle.
//!
//! ## Key components
//!
//! - [`WorkItem`], [`CompletionRecord`], [`Stamp`] — the `wanted`,
//!   `completions` and `stamps` rows of a commons database
//! - [`validate_transition`] — the item state machine (open → claimed →
//!   in_review → completed, plus reject, unclaim and withdraw)
//! - [`branch_name`] / [`extract_wanted_id`] — the `wl/<rig>/<item>` naming
//!   that ties an item to its review branch

pub mod branch;
pub mod error;
pub mod ids;
pub mod model;
pub mod transition;

pub use branch::{branch_name, extract_rig, extract_wanted_id, is_item_branch, parse_branch};
pub use error::BoardError;
pub use model::{
    CompletionRecord, EffortLevel, ItemStatus, ItemType, ItemUpdate, NewItem, Severity, Stamp,
    StampInput, WorkItem,
};
pub use transition::{validate_transition, TransitionKind};
