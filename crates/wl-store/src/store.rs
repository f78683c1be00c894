// store.rs — The database contract the coordinator drives.
//
// A local clone of a commons database has three places an item can live:
// local branches, the fork remote (`origin`) and the canonical remote
// (`upstream`). Remote state is only visible through remote-tracking refs
// after a `fetch`. Row writes always apply to the branch currently checked
// out; only one branch is checked out at a time.

use std::time::Duration;

use wl_board::{CompletionRecord, ItemStatus, Stamp, WorkItem};

use crate::diff::DiffSummary;
use crate::error::Result;
use crate::progress::ProgressSink;

/// Remote name of the canonical commons.
pub const UPSTREAM: &str = "upstream";
/// Remote name of the rig's fork.
pub const ORIGIN: &str = "origin";
/// Trunk branch name, locally and on both remotes.
pub const MAIN: &str = "main";

/// Remote name under which another rig's fork is fetched.
pub fn peer_remote(fork_org: &str) -> String {
    format!("peer-{}", fork_org)
}

/// Remote-tracking ref name for `branch` on `remote`, e.g. `upstream/main`.
pub fn tracking_ref(remote: &str, branch: &str) -> String {
    format!("{}/{}", remote, branch)
}

/// A branch visible from the clone, local or remote-tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    /// Branch name without any remote prefix (e.g. `wl/alice/w-1`).
    pub name: String,
    /// `None` for local branches, the remote name for tracking refs.
    pub remote: Option<String>,
}

impl BranchRef {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: None,
        }
    }

    pub fn tracking(remote: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: Some(remote.into()),
        }
    }

    /// The ref string to use for point-in-time reads.
    pub fn reference(&self) -> String {
        match &self.remote {
            Some(remote) => tracking_ref(remote, &self.name),
            None => self.name.clone(),
        }
    }
}

/// Filter for listing items.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    /// Items posted by or claimed by this rig.
    pub involving: Option<String>,
    pub id_prefix: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &WorkItem) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(rig) = &self.involving {
            if &item.posted_by != rig && item.claimed_by.as_ref() != Some(rig) {
                return false;
            }
        }
        if let Some(prefix) = &self.id_prefix {
            if !item.id.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// The versioned tabular database behind a joined commons.
///
/// Implementations run serially against one clone. Two `Database` values
/// must not drive the same clone directory at once; nothing here arbitrates
/// that.
pub trait Database: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Fail with [`StoreError::ToolMissing`](crate::StoreError::ToolMissing)
    /// if the backing tool cannot run.
    fn ensure_available(&self) -> Result<()>;

    // ── Remotes ────────────────────────────────────────────────────

    fn has_remote(&self, remote: &str) -> Result<bool>;

    /// Update remote-tracking refs for `remote` without merging.
    fn fetch(&self, remote: &str) -> Result<()>;

    /// Fetch one branch from another rig's fork (`fork_path`, an `org/db`
    /// path on the remote host), adding it as the [`peer_remote`] of
    /// `fork_org` first if needed. Returns the remote-tracking ref.
    fn fetch_peer_branch(&self, fork_org: &str, fork_path: &str, branch: &str) -> Result<String>;

    /// Merge canonical main into local main. A clone without an
    /// `upstream` remote has nothing to sync and succeeds.
    fn sync(&self) -> Result<()>;

    /// Push local main to `remote`.
    fn push_main(&self, remote: &str, progress: &mut dyn ProgressSink) -> Result<()>;

    /// Push a local branch to the fork remote.
    fn push_branch(&self, name: &str, progress: &mut dyn ProgressSink) -> Result<()>;

    /// Push local main to canonical, pulling and retrying once if the
    /// remote moved underneath us.
    fn push_with_sync(&self, progress: &mut dyn ProgressSink) -> Result<()>;

    // ── Branches ───────────────────────────────────────────────────

    fn current_branch(&self) -> Result<String>;

    /// Check out `name`, creating it from the current branch if missing.
    /// Checking out the branch already checked out is a no-op.
    fn checkout_branch(&self, name: &str) -> Result<()>;

    fn checkout_main(&self) -> Result<()>;

    /// Whether a local branch named `name` exists.
    fn branch_exists(&self, name: &str) -> Result<bool>;

    /// Local branches plus remote-tracking branches of every remote.
    fn list_branches(&self) -> Result<Vec<BranchRef>>;

    /// Merge `name` into the current branch and commit the merge.
    fn merge_branch(&self, name: &str) -> Result<()>;

    fn delete_branch(&self, name: &str) -> Result<()>;

    /// Row changes `reference` makes relative to local main.
    fn diff(&self, reference: &str) -> Result<DiffSummary>;

    // ── Point-in-time reads ────────────────────────────────────────

    /// Whether a local branch or remote-tracking ref can be read.
    fn ref_exists(&self, reference: &str) -> Result<bool>;

    /// The item as of `reference` (branch name or `remote/branch`).
    fn item_as_of(&self, reference: &str, id: &str) -> Result<Option<WorkItem>>;

    fn list_items(&self, reference: &str, filter: &ItemFilter) -> Result<Vec<WorkItem>>;

    /// Ids of open items starting with `prefix`, bounded by `timeout`.
    /// Used for shell completion, which must never hang.
    fn suggest_item_ids(&self, prefix: &str, timeout: Duration) -> Result<Vec<String>>;

    // ── Working-copy reads and writes (current branch) ─────────────

    fn item(&self, id: &str) -> Result<Option<WorkItem>>;

    fn completion(&self, wanted_id: &str) -> Result<Option<CompletionRecord>>;

    fn stamps_for(&self, subject: &str) -> Result<Vec<Stamp>>;

    fn insert_item(&self, item: &WorkItem) -> Result<()>;

    fn update_item(&self, item: &WorkItem) -> Result<()>;

    fn insert_completion(&self, completion: &CompletionRecord) -> Result<()>;

    fn update_completion(&self, completion: &CompletionRecord) -> Result<()>;

    /// Remove the active completion for an item.
    fn delete_completion(&self, wanted_id: &str) -> Result<()>;

    fn insert_stamp(&self, stamp: &Stamp) -> Result<()>;

    /// Commit pending working-copy changes on the current branch.
    fn commit(&self, message: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wl_board::NewItem;

    #[test]
    fn branch_ref_reference_strings() {
        assert_eq!(BranchRef::local("wl/a/w-1").reference(), "wl/a/w-1");
        assert_eq!(
            BranchRef::tracking(ORIGIN, "wl/a/w-1").reference(),
            "origin/wl/a/w-1"
        );
    }

    #[test]
    fn filter_involving_matches_poster_or_claimer() {
        let mut item = WorkItem::post(NewItem::new("x"), "alice", chrono::Utc::now()).unwrap();
        let filter = ItemFilter {
            involving: Some("bob".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&item));
        item.claimed_by = Some("bob".into());
        assert!(filter.matches(&item));
    }
}
