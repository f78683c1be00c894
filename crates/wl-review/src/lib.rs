//! Review shells for wanted-board branches.
//!
//! An item worked in PR mode lives on a `wl/<rig>/<item>` database branch.
//! This crate mirrors that branch as a cross-fork pull request on the
//! commons' hosting provider so maintainers can review it where they already
//! work. The core abstraction is the [`ReviewProvider`] trait, with a GitHub
//! implementation (git-object API through `gh`) and a DoltHub implementation
//! (REST). [`ReviewShellBuilder`] drives either one.

pub mod dolthub;
pub mod error;
pub mod github;
pub mod provider;
pub mod shell;
pub mod testing;

pub use dolthub::{DoltHubHttp, DoltHubProvider, DoltHubTransport};
pub use error::ReviewError;
pub use github::{GhCli, GhTransport, GitHubProvider};
pub use provider::{
    NewPullRequest, PrHead, PullRequest, RepoRef, Review, ReviewEvent, ReviewProvider,
    ReviewState,
};
pub use shell::{
    marker_path, render_body, CloseReport, CloseStep, ReviewGate, ReviewShellBuilder,
    ShellOutcome,
};
