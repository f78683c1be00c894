//! # wl-store
//!
//! The versioned-database contract behind a joined commons.
//!
//! The wanted-board coordinator never talks to a database engine directly;
//! it drives a [`Database`]: sync, fetch, push, branch checkout, merge,
//! point-in-time reads "as of" a ref, and row writes on the checked-out
//! branch.
//!
//! ## Backends
//!
//! - [`DoltStore`] — runs the `dolt` CLI inside a local clone
//! - [`MemoryStore`] — in-memory clone with shareable [`MemoryRemote`]s and
//!   fault injection, used by tests across the workspace

pub mod diff;
pub mod dolt;
pub mod error;
pub mod memory;
pub mod progress;
pub mod sql;
pub mod store;

pub use diff::{DiffSummary, TableDiff};
pub use dolt::DoltStore;
pub use error::StoreError;
pub use memory::{CommitEntry, MemoryRemote, MemoryStore, Tables};
pub use progress::{NullProgress, ProgressSink, TracingProgress};
pub use store::{peer_remote, tracking_ref, BranchRef, Database, ItemFilter, MAIN, ORIGIN, UPSTREAM};
