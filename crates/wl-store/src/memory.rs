// memory.rs — In-memory Database with shareable remotes.
//
// Each `MemoryStore` is one clone: local branches, remote-tracking snapshots
// and a current branch. Remotes are `MemoryRemote` handles that several
// clones can share, so tests can model two rigs working against the same
// canonical commons. Remotes can be made unreachable to exercise the
// best-effort paths.
//
// Merging is last-writer-wins per item on `updated_at`; an item's active
// completion travels with the item version that wins. Stamps are append-only
// and merge by union.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use wl_board::{CompletionRecord, ItemStatus, Stamp, WorkItem};

use crate::diff::{DiffSummary, TableDiff};
use crate::error::{Result, StoreError};
use crate::progress::ProgressSink;
use crate::store::{
    peer_remote, tracking_ref, BranchRef, Database, ItemFilter, MAIN, ORIGIN, UPSTREAM,
};

/// The three board tables at one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub items: BTreeMap<String, WorkItem>,
    /// Active completion per wanted id.
    pub completions: BTreeMap<String, CompletionRecord>,
    pub stamps: BTreeMap<String, Stamp>,
}

impl Tables {
    /// Merge `src` into `self`.
    fn merge_from(&mut self, src: &Tables) {
        for (id, theirs) in &src.items {
            let take = match self.items.get(id) {
                None => true,
                Some(ours) => theirs.updated_at > ours.updated_at,
            };
            if take {
                self.items.insert(id.clone(), theirs.clone());
                match src.completions.get(id) {
                    Some(c) => {
                        self.completions.insert(id.clone(), c.clone());
                    }
                    None => {
                        self.completions.remove(id);
                    }
                }
            }
        }
        for (id, stamp) in &src.stamps {
            self.stamps.entry(id.clone()).or_insert_with(|| stamp.clone());
        }
    }
}

fn count_diff<T: PartialEq>(
    table: &str,
    base: &BTreeMap<String, T>,
    target: &BTreeMap<String, T>,
) -> TableDiff {
    let mut diff = TableDiff {
        table: table.to_string(),
        ..Default::default()
    };
    for (k, v) in target {
        match base.get(k) {
            None => diff.added += 1,
            Some(b) if b != v => diff.modified += 1,
            Some(_) => {}
        }
    }
    diff.removed = base.keys().filter(|k| !target.contains_key(*k)).count() as u64;
    diff
}

#[derive(Debug, Default)]
struct RemoteData {
    branches: BTreeMap<String, Tables>,
    unreachable: bool,
}

/// A remote database that one or more [`MemoryStore`] clones can share.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<RemoteData>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteData> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Make fetches and pushes against this remote fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Snapshot of a branch on the remote.
    pub fn branch(&self, name: &str) -> Option<Tables> {
        self.lock().branches.get(name).cloned()
    }

    pub fn item(&self, branch: &str, id: &str) -> Option<WorkItem> {
        self.lock()
            .branches
            .get(branch)
            .and_then(|t| t.items.get(id).cloned())
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.lock().branches.contains_key(name)
    }

    /// Replace a branch's contents directly, as another rig's push would.
    pub fn put_branch(&self, name: &str, tables: Tables) {
        self.lock().branches.insert(name.to_string(), tables);
    }
}

/// A commit recorded by [`MemoryStore::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub branch: String,
    pub message: String,
}

#[derive(Debug)]
struct CloneState {
    current: String,
    branches: BTreeMap<String, Tables>,
    tracking: BTreeMap<(String, String), Tables>,
    remotes: BTreeMap<String, MemoryRemote>,
    commits: Vec<CommitEntry>,
    available: bool,
    remote_lookup_fails: bool,
}

impl CloneState {
    fn current_tables(&mut self) -> Result<&mut Tables> {
        let current = self.current.clone();
        self.branches
            .get_mut(&current)
            .ok_or(StoreError::RefNotFound(current))
    }

    fn resolve(&self, reference: &str) -> Option<&Tables> {
        if let Some(t) = self.branches.get(reference) {
            return Some(t);
        }
        let (remote, branch) = reference.split_once('/')?;
        self.tracking.get(&(remote.to_string(), branch.to_string()))
    }

    fn remote(&self, name: &str) -> Result<MemoryRemote> {
        self.remotes
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::RemoteMissing(name.to_string()))
    }

    fn fetch(&mut self, name: &str) -> Result<()> {
        let remote = self.remote(name)?;
        let data = remote.lock();
        if data.unreachable {
            return Err(StoreError::RemoteUnreachable(name.to_string()));
        }
        self.tracking.retain(|(r, _), _| r != name);
        for (branch, tables) in &data.branches {
            self.tracking
                .insert((name.to_string(), branch.clone()), tables.clone());
        }
        Ok(())
    }

    fn fetch_branch(&mut self, name: &str, branch: &str) -> Result<()> {
        let remote = self.remote(name)?;
        let data = remote.lock();
        if data.unreachable {
            return Err(StoreError::RemoteUnreachable(name.to_string()));
        }
        let tables = data
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound(tracking_ref(name, branch)))?;
        self.tracking
            .insert((name.to_string(), branch.to_string()), tables);
        Ok(())
    }

    fn push(&mut self, remote_name: &str, branch: &str, replace: bool) -> Result<()> {
        let local = self
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound(branch.to_string()))?;
        let remote = self.remote(remote_name)?;
        let pushed = {
            let mut data = remote.lock();
            if data.unreachable {
                return Err(StoreError::RemoteUnreachable(remote_name.to_string()));
            }
            let entry = data.branches.entry(branch.to_string()).or_default();
            if replace {
                *entry = local;
            } else {
                entry.merge_from(&local);
            }
            entry.clone()
        };
        self.tracking
            .insert((remote_name.to_string(), branch.to_string()), pushed);
        Ok(())
    }
}

/// In-memory [`Database`] clone.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<CloneState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A clone with an empty `main` and no remotes.
    pub fn new() -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(MAIN.to_string(), Tables::default());
        Self {
            state: Mutex::new(CloneState {
                current: MAIN.to_string(),
                branches,
                tracking: BTreeMap::new(),
                remotes: BTreeMap::new(),
                commits: Vec::new(),
                available: true,
                remote_lookup_fails: false,
            }),
        }
    }

    /// A clone whose `upstream` and `origin` are separate remotes.
    pub fn with_fork(upstream: &MemoryRemote, origin: &MemoryRemote) -> Self {
        let store = Self::new();
        store.add_remote(UPSTREAM, upstream.clone());
        store.add_remote(ORIGIN, origin.clone());
        store
    }

    fn lock(&self) -> MutexGuard<'_, CloneState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_remote(&self, name: &str, remote: MemoryRemote) {
        self.lock().remotes.insert(name.to_string(), remote);
    }

    /// Make another rig's fork reachable, as `dolt remote add` would. A
    /// memory clone cannot resolve `org/db` paths, so peers are registered
    /// up front.
    pub fn add_peer(&self, fork_org: &str, remote: MemoryRemote) {
        self.add_remote(&peer_remote(fork_org), remote);
    }

    /// Simulate the backing tool being missing.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Make `has_remote` fail, as a broken `dolt_remotes` query would.
    pub fn set_remote_lookup_fails(&self, fails: bool) {
        self.lock().remote_lookup_fails = fails;
    }

    /// Commits made so far, oldest first.
    pub fn commits(&self) -> Vec<CommitEntry> {
        self.lock().commits.clone()
    }

    /// Snapshot of a local branch.
    pub fn branch(&self, name: &str) -> Option<Tables> {
        self.lock().branches.get(name).cloned()
    }
}

impl Database for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn ensure_available(&self) -> Result<()> {
        if self.lock().available {
            Ok(())
        } else {
            Err(StoreError::ToolMissing {
                tool: "dolt".to_string(),
                hint: "memory store marked unavailable".to_string(),
            })
        }
    }

    fn has_remote(&self, remote: &str) -> Result<bool> {
        let state = self.lock();
        if state.remote_lookup_fails {
            return Err(StoreError::CommandFailed {
                command: "select from dolt_remotes".to_string(),
                stderr: "remote lookup failed".to_string(),
            });
        }
        Ok(state.remotes.contains_key(remote))
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        self.lock().fetch(remote)
    }

    fn fetch_peer_branch(&self, fork_org: &str, fork_path: &str, branch: &str) -> Result<String> {
        let remote = peer_remote(fork_org);
        let mut state = self.lock();
        if !state.remotes.contains_key(&remote) {
            tracing::debug!("no peer registered for {}", fork_path);
            return Err(StoreError::RemoteMissing(remote));
        }
        state.fetch_branch(&remote, branch)?;
        Ok(tracking_ref(&remote, branch))
    }

    fn sync(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.remotes.contains_key(UPSTREAM) {
            return Ok(());
        }
        state.fetch(UPSTREAM)?;
        let key = (UPSTREAM.to_string(), MAIN.to_string());
        if let Some(theirs) = state.tracking.get(&key).cloned() {
            state
                .branches
                .entry(MAIN.to_string())
                .or_default()
                .merge_from(&theirs);
        }
        Ok(())
    }

    fn push_main(&self, remote: &str, progress: &mut dyn ProgressSink) -> Result<()> {
        self.lock().push(remote, MAIN, false)?;
        progress.line(&format!("pushed {} to {}", MAIN, remote));
        Ok(())
    }

    fn push_branch(&self, name: &str, progress: &mut dyn ProgressSink) -> Result<()> {
        self.lock().push(ORIGIN, name, true)?;
        progress.line(&format!("pushed {} to {}", name, ORIGIN));
        Ok(())
    }

    fn push_with_sync(&self, progress: &mut dyn ProgressSink) -> Result<()> {
        self.sync()?;
        self.push_main(UPSTREAM, progress)
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.lock().current.clone())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.branches.contains_key(name) {
            let from = state.current_tables()?.clone();
            state.branches.insert(name.to_string(), from);
        }
        state.current = name.to_string();
        Ok(())
    }

    fn checkout_main(&self) -> Result<()> {
        self.checkout_branch(MAIN)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lock().branches.contains_key(name))
    }

    fn list_branches(&self) -> Result<Vec<BranchRef>> {
        let state = self.lock();
        let mut out: Vec<BranchRef> = state.branches.keys().map(BranchRef::local).collect();
        out.extend(
            state
                .tracking
                .keys()
                .map(|(remote, branch)| BranchRef::tracking(remote, branch)),
        );
        Ok(out)
    }

    fn merge_branch(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let theirs = state
            .resolve(name)
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound(name.to_string()))?;
        state.current_tables()?.merge_from(&theirs);
        let branch = state.current.clone();
        state.commits.push(CommitEntry {
            branch,
            message: format!("Merge branch '{}'", name),
        });
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        if state.current == name {
            return Err(StoreError::CommandFailed {
                command: format!("branch -D {}", name),
                stderr: "cannot delete the checked out branch".to_string(),
            });
        }
        state
            .branches
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::RefNotFound(name.to_string()))
    }

    fn diff(&self, reference: &str) -> Result<DiffSummary> {
        let state = self.lock();
        let base = state
            .resolve(MAIN)
            .ok_or_else(|| StoreError::RefNotFound(MAIN.to_string()))?;
        let target = state
            .resolve(reference)
            .ok_or_else(|| StoreError::RefNotFound(reference.to_string()))?;
        Ok(DiffSummary {
            base: MAIN.to_string(),
            target: reference.to_string(),
            tables: vec![
                count_diff("wanted", &base.items, &target.items),
                count_diff("completions", &base.completions, &target.completions),
                count_diff("stamps", &base.stamps, &target.stamps),
            ],
        })
    }

    fn ref_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.lock().resolve(reference).is_some())
    }

    fn item_as_of(&self, reference: &str, id: &str) -> Result<Option<WorkItem>> {
        let state = self.lock();
        let tables = state
            .resolve(reference)
            .ok_or_else(|| StoreError::RefNotFound(reference.to_string()))?;
        Ok(tables.items.get(id).cloned())
    }

    fn list_items(&self, reference: &str, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        let state = self.lock();
        let tables = state
            .resolve(reference)
            .ok_or_else(|| StoreError::RefNotFound(reference.to_string()))?;
        let mut items: Vec<WorkItem> = tables
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(items)
    }

    fn suggest_item_ids(&self, prefix: &str, _timeout: Duration) -> Result<Vec<String>> {
        let filter = ItemFilter {
            status: Some(ItemStatus::Open),
            id_prefix: Some(prefix.to_string()),
            ..Default::default()
        };
        let current = self.current_branch()?;
        Ok(self
            .list_items(&current, &filter)?
            .into_iter()
            .map(|i| i.id)
            .collect())
    }

    fn item(&self, id: &str) -> Result<Option<WorkItem>> {
        Ok(self.lock().current_tables()?.items.get(id).cloned())
    }

    fn completion(&self, wanted_id: &str) -> Result<Option<CompletionRecord>> {
        Ok(self
            .lock()
            .current_tables()?
            .completions
            .get(wanted_id)
            .cloned())
    }

    fn stamps_for(&self, subject: &str) -> Result<Vec<Stamp>> {
        let mut state = self.lock();
        let mut stamps: Vec<Stamp> = state
            .current_tables()?
            .stamps
            .values()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect();
        stamps.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stamps)
    }

    fn insert_item(&self, item: &WorkItem) -> Result<()> {
        let mut state = self.lock();
        let tables = state.current_tables()?;
        if tables.items.contains_key(&item.id) {
            return Err(StoreError::CommandFailed {
                command: "insert wanted".to_string(),
                stderr: format!("duplicate primary key {}", item.id),
            });
        }
        tables.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn update_item(&self, item: &WorkItem) -> Result<()> {
        let mut state = self.lock();
        let tables = state.current_tables()?;
        match tables.items.get_mut(&item.id) {
            Some(row) => {
                *row = item.clone();
                Ok(())
            }
            None => Err(StoreError::RowNotFound(item.id.clone())),
        }
    }

    fn insert_completion(&self, completion: &CompletionRecord) -> Result<()> {
        let mut state = self.lock();
        state
            .current_tables()?
            .completions
            .insert(completion.wanted_id.clone(), completion.clone());
        Ok(())
    }

    fn update_completion(&self, completion: &CompletionRecord) -> Result<()> {
        let mut state = self.lock();
        let tables = state.current_tables()?;
        match tables.completions.get_mut(&completion.wanted_id) {
            Some(row) if row.id == completion.id => {
                *row = completion.clone();
                Ok(())
            }
            _ => Err(StoreError::RowNotFound(completion.id.clone())),
        }
    }

    fn delete_completion(&self, wanted_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.current_tables()?.completions.remove(wanted_id);
        Ok(())
    }

    fn insert_stamp(&self, stamp: &Stamp) -> Result<()> {
        let mut state = self.lock();
        state
            .current_tables()?
            .stamps
            .insert(stamp.id.clone(), stamp.clone());
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let mut state = self.lock();
        let branch = state.current.clone();
        state.commits.push(CommitEntry {
            branch,
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use chrono::{Duration as ChronoDuration, Utc};
    use wl_board::NewItem;

    fn item(title: &str) -> WorkItem {
        WorkItem::post(NewItem::new(title), "alice", Utc::now()).unwrap()
    }

    #[test]
    fn writes_land_on_the_checked_out_branch() {
        let store = MemoryStore::new();
        let it = item("one");
        store.checkout_branch("wl/alice/x").unwrap();
        store.insert_item(&it).unwrap();
        assert!(store.item(&it.id).unwrap().is_some());
        assert!(store.item_as_of(MAIN, &it.id).unwrap().is_none());

        store.checkout_main().unwrap();
        store.merge_branch("wl/alice/x").unwrap();
        assert!(store.item(&it.id).unwrap().is_some());
    }

    #[test]
    fn checkout_is_idempotent() {
        let store = MemoryStore::new();
        store.checkout_branch("wl/a/w-1").unwrap();
        store.checkout_branch("wl/a/w-1").unwrap();
        assert_eq!(store.current_branch().unwrap(), "wl/a/w-1");
        assert!(store.delete_branch("wl/a/w-1").is_err());
        store.checkout_main().unwrap();
        store.delete_branch("wl/a/w-1").unwrap();
        assert!(!store.branch_exists("wl/a/w-1").unwrap());
    }

    #[test]
    fn two_clones_see_each_other_through_a_shared_remote() {
        let upstream = MemoryRemote::new();
        let a = MemoryStore::new();
        a.add_remote(UPSTREAM, upstream.clone());
        let b = MemoryStore::new();
        b.add_remote(UPSTREAM, upstream.clone());

        let it = item("shared");
        a.insert_item(&it).unwrap();
        a.push_main(UPSTREAM, &mut NullProgress).unwrap();

        b.sync().unwrap();
        assert_eq!(b.item(&it.id).unwrap().unwrap().title, "shared");
        assert!(b.ref_exists("upstream/main").unwrap());
    }

    #[test]
    fn newer_item_version_wins_and_carries_its_completion() {
        let mut ours = Tables::default();
        let mut it = item("x");
        ours.items.insert(it.id.clone(), it.clone());
        ours.completions.insert(
            it.id.clone(),
            CompletionRecord::new(&it.id, "bob", "url", Utc::now()).unwrap(),
        );

        let mut theirs = Tables::default();
        it.updated_at = it.updated_at + ChronoDuration::seconds(5);
        it.status = ItemStatus::Claimed;
        theirs.items.insert(it.id.clone(), it.clone());

        ours.merge_from(&theirs);
        assert_eq!(ours.items[&it.id].status, ItemStatus::Claimed);
        assert!(ours.completions.get(&it.id).is_none());
    }

    #[test]
    fn unreachable_remote_fails_fetch_and_push() {
        let upstream = MemoryRemote::new();
        let store = MemoryStore::new();
        store.add_remote(UPSTREAM, upstream.clone());
        upstream.set_reachable(false);
        assert!(matches!(
            store.fetch(UPSTREAM),
            Err(StoreError::RemoteUnreachable(_))
        ));
        assert!(store.push_main(UPSTREAM, &mut NullProgress).is_err());
        assert!(matches!(
            store.fetch(ORIGIN),
            Err(StoreError::RemoteMissing(_))
        ));
    }

    #[test]
    fn peer_branch_is_fetched_under_its_own_remote() {
        let peer = MemoryRemote::new();
        let mut tables = Tables::default();
        let it = item("peer work");
        tables.items.insert(it.id.clone(), it.clone());
        peer.put_branch("wl/bob/w-1", tables);

        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch_peer_branch("bob", "bob/commons", "wl/bob/w-1"),
            Err(StoreError::RemoteMissing(_))
        ));

        store.add_peer("bob", peer.clone());
        let reference = store
            .fetch_peer_branch("bob", "bob/commons", "wl/bob/w-1")
            .unwrap();
        assert_eq!(reference, "peer-bob/wl/bob/w-1");
        assert!(store.item_as_of(&reference, &it.id).unwrap().is_some());
        assert!(matches!(
            store.fetch_peer_branch("bob", "bob/commons", "wl/bob/w-2"),
            Err(StoreError::RefNotFound(_))
        ));
    }

    #[test]
    fn diff_counts_changes_against_main() {
        let store = MemoryStore::new();
        store.checkout_branch("wl/a/w-1").unwrap();
        store.insert_item(&item("new")).unwrap();
        let diff = store.diff("wl/a/w-1").unwrap();
        assert_eq!(diff.tables[0].added, 1);
        assert!(!diff.is_empty());
    }
}
