// location.rs — Where an item currently lives: canonical, fork, branches.
//
// Resolution fetches (never merges) both remotes, then reads the item "as of"
// canonical main, fork main and every `wl/*/<item>` branch. A remote that
// cannot be fetched is recorded as Unknown, which callers must not read as
// absence. A clone without a separate canonical remote uses local main as
// canonical.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use wl_board::{is_item_branch, ItemStatus, WorkItem};
use wl_store::{tracking_ref, Database, ItemFilter, StoreError, MAIN, ORIGIN, UPSTREAM};

use crate::error::Result;

/// What one ref says about an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Present {
        status: ItemStatus,
        updated_at: DateTime<Utc>,
    },
    Absent,
    /// The ref could not be read; the item may or may not be there.
    Unknown,
}

impl Observation {
    fn from_read(read: std::result::Result<Option<WorkItem>, StoreError>) -> Self {
        match read {
            Ok(Some(item)) => Observation::Present {
                status: item.status,
                updated_at: item.updated_at,
            },
            Ok(None) => Observation::Absent,
            Err(e) => {
                tracing::debug!("item read failed: {}", e);
                Observation::Unknown
            }
        }
    }

    pub fn status(&self) -> Option<ItemStatus> {
        match self {
            Observation::Present { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Observation::Present { .. })
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Present { status, .. } => write!(f, "{}", status),
            Observation::Absent => f.write_str("absent"),
            Observation::Unknown => f.write_str("unknown"),
        }
    }
}

/// An item as seen on one `wl/<rig>/<item>` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchObservation {
    pub branch: String,
    pub observation: Observation,
    /// The branch exists in this clone but has not been pushed to the fork.
    pub local_only: bool,
}

/// The item's status across canonical, fork and review branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLocation {
    pub item_id: String,
    pub canonical: Observation,
    /// Ref read as canonical: `upstream/main`, or `main` without one.
    pub canonical_ref: String,
    pub fork: Observation,
    pub branches: Vec<BranchObservation>,
}

impl ItemLocation {
    /// Best available status. Canonical wins; the fork speaks only for items
    /// canonical does not have; then the first branch that has the item.
    pub fn effective_status(&self) -> Option<ItemStatus> {
        self.canonical
            .status()
            .or_else(|| self.fork.status())
            .or_else(|| self.branches.iter().find_map(|b| b.observation.status()))
    }

    /// Present on the fork but not (yet) on canonical.
    pub fn is_fork_only(&self) -> bool {
        self.fork.is_present() && self.canonical == Observation::Absent
    }

    /// Fork main disagrees with canonical about this item. Unknown canonical
    /// state is never treated as disagreement.
    pub fn fork_diverges(&self) -> bool {
        match (self.canonical, self.fork) {
            (Observation::Present { status: c, .. }, Observation::Present { status: f, .. }) => {
                c != f
            }
            (Observation::Absent, Observation::Present { .. }) => true,
            _ => false,
        }
    }

    /// Canonical already holds this version of the row: same status and
    /// same `updated_at`. A field edit that keeps the status is not converged.
    pub fn converged_with(&self, item: &WorkItem) -> bool {
        self.canonical
            == Observation::Present {
                status: item.status,
                updated_at: item.updated_at,
            }
    }

    /// Warn when the canonical claim has not moved for more than `days`.
    pub fn stale_claim(&self, now: DateTime<Utc>, days: u32) -> Option<String> {
        let Observation::Present {
            status: ItemStatus::Claimed,
            updated_at,
        } = self.canonical
        else {
            return None;
        };
        let age = now.signed_duration_since(updated_at);
        if age > Duration::days(i64::from(days)) {
            Some(format!(
                "item {} has been claimed without progress for {} days (since {})",
                self.item_id,
                age.num_days(),
                updated_at.format("%Y-%m-%d")
            ))
        } else {
            None
        }
    }
}

/// Where a dashboard row was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Canonical,
    Fork,
    Branch(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Canonical => f.write_str("canonical"),
            Source::Fork => f.write_str("fork"),
            Source::Branch(b) => f.write_str(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardEntry {
    pub item: WorkItem,
    pub source: Source,
}

/// Outcome of fetching one remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Fetched,
    NoRemote,
    Failed,
}

pub struct LocationResolver<'a> {
    db: &'a dyn Database,
}

impl<'a> LocationResolver<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    fn fetch(&self, remote: &str) -> Fetch {
        match self.db.has_remote(remote) {
            Ok(false) => return Fetch::NoRemote,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!("could not list remotes: {}", e);
                return Fetch::Failed;
            }
        }
        match self.db.fetch(remote) {
            Ok(()) => Fetch::Fetched,
            Err(e) => {
                tracing::warn!("fetch {} failed: {}", remote, e);
                Fetch::Failed
            }
        }
    }

    /// Main of `remote` if it was fetched and exists, else `fallback`.
    fn main_ref(&self, remote: &str, fetch: Fetch, fallback: Option<&str>) -> Option<String> {
        let tracking = tracking_ref(remote, MAIN);
        match fetch {
            Fetch::Fetched if self.db.ref_exists(&tracking).unwrap_or(false) => Some(tracking),
            Fetch::Failed => None,
            _ => fallback.map(str::to_string),
        }
    }

    fn read(&self, reference: Option<&str>, item_id: &str) -> Observation {
        match reference {
            Some(r) => Observation::from_read(self.db.item_as_of(r, item_id)),
            None => Observation::Unknown,
        }
    }

    pub fn locate(&self, item_id: &str) -> Result<ItemLocation> {
        let upstream = self.fetch(UPSTREAM);
        let origin = self.fetch(ORIGIN);

        let canonical_ref = self.main_ref(UPSTREAM, upstream, Some(MAIN));
        let canonical = self.read(canonical_ref.as_deref(), item_id);

        let fork = match origin {
            Fetch::NoRemote => Observation::Absent,
            _ => {
                let fork_ref = self.main_ref(ORIGIN, origin, None);
                if origin == Fetch::Fetched && fork_ref.is_none() {
                    Observation::Absent
                } else {
                    self.read(fork_ref.as_deref(), item_id)
                }
            }
        };

        let branches = self.branches_for(item_id);
        let location = ItemLocation {
            item_id: item_id.to_string(),
            canonical,
            canonical_ref: canonical_ref.unwrap_or_else(|| tracking_ref(UPSTREAM, MAIN)),
            fork,
            branches,
        };
        tracing::debug!(
            "located {}: canonical={} fork={} branches={}",
            item_id,
            location.canonical,
            location.fork,
            location.branches.len()
        );
        Ok(location)
    }

    fn branches_for(&self, item_id: &str) -> Vec<BranchObservation> {
        let refs = match self.db.list_branches() {
            Ok(refs) => refs,
            Err(e) => {
                tracing::warn!("could not list branches: {}", e);
                return Vec::new();
            }
        };

        // branch name → (local?, pushed to origin?)
        let mut seen: BTreeMap<String, (bool, bool)> = BTreeMap::new();
        for r in refs.iter().filter(|r| is_item_branch(&r.name, item_id)) {
            let entry = seen.entry(r.name.clone()).or_default();
            match r.remote.as_deref() {
                None => entry.0 = true,
                Some(ORIGIN) => entry.1 = true,
                Some(_) => {}
            }
        }

        seen.into_iter()
            .map(|(branch, (local, pushed))| {
                let reference = if local {
                    branch.clone()
                } else if pushed {
                    tracking_ref(ORIGIN, &branch)
                } else {
                    tracking_ref(UPSTREAM, &branch)
                };
                BranchObservation {
                    observation: Observation::from_read(self.db.item_as_of(&reference, item_id)),
                    local_only: local && !pushed,
                    branch,
                }
            })
            .collect()
    }

    /// Items the rig posted or holds, each listed once: canonical first,
    /// then fork-only items, then items that exist only on the rig's branches.
    /// Remotes are expected to have been fetched by a preceding `locate` or
    /// sync; unreadable refs are skipped.
    pub fn dashboard(&self, rig: &str) -> Result<Vec<DashboardEntry>> {
        let filter = ItemFilter {
            involving: Some(rig.to_string()),
            ..Default::default()
        };
        let upstream = self.fetch(UPSTREAM);
        let origin = self.fetch(ORIGIN);

        let mut sources: Vec<(Source, String)> = Vec::new();
        if let Some(r) = self.main_ref(UPSTREAM, upstream, Some(MAIN)) {
            sources.push((Source::Canonical, r));
        }
        if let Some(r) = self.main_ref(ORIGIN, origin, None) {
            sources.push((Source::Fork, r));
        }
        let prefix = format!("{}{}/", wl_board::branch::BRANCH_PREFIX, rig);
        let mut branch_names = BTreeSet::new();
        for r in self.db.list_branches().unwrap_or_default() {
            if r.name.starts_with(&prefix) && branch_names.insert(r.name.clone()) {
                sources.push((Source::Branch(r.name.clone()), r.reference()));
            }
        }

        let mut out: Vec<DashboardEntry> = Vec::new();
        let mut listed: BTreeSet<String> = BTreeSet::new();
        for (source, reference) in sources {
            let items = match self.db.list_items(&reference, &filter) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("skipping {}: {}", reference, e);
                    continue;
                }
            };
            for item in items {
                if listed.insert(item.id.clone()) {
                    out.push(DashboardEntry {
                        item,
                        source: source.clone(),
                    });
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wl_board::NewItem;
    use wl_store::{MemoryRemote, MemoryStore, NullProgress};

    fn item(title: &str, poster: &str) -> WorkItem {
        WorkItem::post(NewItem::new(title), poster, Utc::now()).unwrap()
    }

    fn present(status: ItemStatus) -> Observation {
        Observation::Present {
            status,
            updated_at: Utc::now(),
        }
    }

    fn location(canonical: Observation, fork: Observation) -> ItemLocation {
        ItemLocation {
            item_id: "w-1".into(),
            canonical,
            canonical_ref: "upstream/main".into(),
            fork,
            branches: vec![],
        }
    }

    #[test]
    fn canonical_wins_over_fork() {
        let loc = location(present(ItemStatus::Claimed), present(ItemStatus::Open));
        assert_eq!(loc.effective_status(), Some(ItemStatus::Claimed));
        assert!(loc.fork_diverges());

        let fork_only = location(Observation::Absent, present(ItemStatus::Open));
        assert_eq!(fork_only.effective_status(), Some(ItemStatus::Open));
        assert!(fork_only.is_fork_only());
    }

    #[test]
    fn unknown_canonical_is_not_divergence() {
        let loc = location(Observation::Unknown, present(ItemStatus::Open));
        assert!(!loc.fork_diverges());
        assert!(!loc.is_fork_only());
    }

    #[test]
    fn stale_claims_are_flagged() {
        let now = Utc::now();
        let old = Observation::Present {
            status: ItemStatus::Claimed,
            updated_at: now - Duration::days(30),
        };
        let loc = location(old, Observation::Absent);
        assert!(loc.stale_claim(now, 14).unwrap().contains("30 days"));
        assert!(loc.stale_claim(now, 60).is_none());
        let open = location(present(ItemStatus::Open), Observation::Absent);
        assert!(open.stale_claim(now, 0).is_none());
    }

    #[test]
    fn locate_reads_all_three_places() {
        let upstream = MemoryRemote::new();
        let origin = MemoryRemote::new();
        let store = MemoryStore::with_fork(&upstream, &origin);

        let it = item("task", "alice");
        store.insert_item(&it).unwrap();
        store.push_main(UPSTREAM, &mut NullProgress).unwrap();

        let branch = format!("wl/bob/{}", it.id);
        store.checkout_branch(&branch).unwrap();
        let mut claimed = it.clone();
        claimed.status = ItemStatus::Claimed;
        store.update_item(&claimed).unwrap();
        store.checkout_main().unwrap();

        let loc = LocationResolver::new(&store).locate(&it.id).unwrap();
        assert_eq!(loc.canonical.status(), Some(ItemStatus::Open));
        assert_eq!(loc.canonical_ref, "upstream/main");
        assert_eq!(loc.fork, Observation::Absent);
        assert_eq!(loc.branches.len(), 1);
        assert_eq!(loc.branches[0].observation.status(), Some(ItemStatus::Claimed));
        assert!(loc.branches[0].local_only);
    }

    #[test]
    fn unreachable_remote_reads_as_unknown() {
        let upstream = MemoryRemote::new();
        let origin = MemoryRemote::new();
        let store = MemoryStore::with_fork(&upstream, &origin);
        upstream.set_reachable(false);

        let loc = LocationResolver::new(&store).locate("w-0000000000").unwrap();
        assert_eq!(loc.canonical, Observation::Unknown);
        assert_eq!(loc.fork, Observation::Absent);
    }

    #[test]
    fn clone_without_remotes_uses_local_main() {
        let store = MemoryStore::new();
        let it = item("local", "alice");
        store.insert_item(&it).unwrap();
        let loc = LocationResolver::new(&store).locate(&it.id).unwrap();
        assert_eq!(loc.canonical_ref, "main");
        assert_eq!(loc.canonical.status(), Some(ItemStatus::Open));
    }

    #[test]
    fn dashboard_counts_each_item_once() {
        let upstream = MemoryRemote::new();
        let origin = MemoryRemote::new();
        let store = MemoryStore::with_fork(&upstream, &origin);

        let shared = item("shared", "bob");
        store.insert_item(&shared).unwrap();
        store.push_main(UPSTREAM, &mut NullProgress).unwrap();
        store.push_main(ORIGIN, &mut NullProgress).unwrap();

        let wip = item("wip", "bob");
        let branch = format!("wl/bob/{}", wip.id);
        store.checkout_branch(&branch).unwrap();
        store.insert_item(&wip).unwrap();
        store.checkout_main().unwrap();

        let rows = LocationResolver::new(&store).dashboard("bob").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item.id, shared.id);
        assert_eq!(rows[0].source, Source::Canonical);
        assert_eq!(rows[1].source, Source::Branch(branch));
    }
}
