//! # wl-workspace
//!
//! Joined commons and the mode-aware mutation coordinator.
//!
//! A rig joins a commons (`org/db`) by forking it; the fork's local clone,
//! rig handle and workflow mode are recorded in a [`WorkspaceRegistry`].
//! Every board command then runs through a [`MutationContext`]:
//!
//! 1. sync local main with canonical (best-effort)
//! 2. locate the item on canonical, fork and item branches
//! 3. in `pr` mode, check out `wl/<rig>/<item>`
//! 4. validate, write and commit through the [`wl_store::Database`]
//! 5. push where the [`push_target`] rules say, refresh any open review
//!
//! [`Board`] wraps that bracket with the authorization rules of each command
//! and the review flows (open, approve, request changes, merge).

pub mod actions;
pub mod config;
pub mod error;
pub mod location;
pub mod mutation;
pub mod policy;
pub mod push_target;
pub mod review;

pub use actions::{Board, Outcome, SyncReport, SUGGEST_TIMEOUT};
pub use config::{
    config_dir, registry_path, ProviderType, WorkflowMode, WorkspaceConfig, WorkspaceRegistry,
};
pub use error::{Result, WorkspaceError};
pub use location::{
    BranchObservation, DashboardEntry, ItemLocation, LocationResolver, Observation, Source,
};
pub use mutation::{CheckoutGuard, MutationContext, MutationOptions, PushReport};
pub use policy::{policy_for, settle, ErrorClass, Policy, Warning};
pub use push_target::{PushScope, PushTarget};
pub use review::{BranchOwner, MergeOutcome, ReviewOutcome};
