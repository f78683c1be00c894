// mutation.rs — MutationContext: the setup/push bracket around every mutation.
//
//   setup():  tool check → checkout main → sync (best-effort) → locate
//             → [pr mode] checkout wl/<rig>/<item>
//   ...caller validates and writes through the Database, then commits...
//   push():   resolve target → push → [branch] refresh review (best-effort)
//   finish(): back to main, hand over warnings
//
// The working copy can only have one branch checked out. `setup` returns a
// `CheckoutGuard` that puts main back when released or dropped, so an error
// anywhere between setup and finish still leaves the clone on main. Two
// contexts must not drive the same clone at once; callers serialize commands
// per clone directory.

use chrono::Utc;
use wl_board::WorkItem;
use wl_review::{PullRequest, ReviewProvider, ReviewShellBuilder};
use wl_store::{tracking_ref, Database, ProgressSink, TracingProgress, ORIGIN, UPSTREAM};

use crate::config::{WorkflowMode, WorkspaceConfig};
use crate::error::Result;
use crate::location::{ItemLocation, LocationResolver};
use crate::policy::{settle, ErrorClass, Warning};
use crate::push_target::{resolve, PushScope, PushTarget};

/// Per-command switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOptions {
    /// Commit locally, push nothing.
    pub no_push: bool,
    /// Work on main even in pr mode (merge and other admin operations).
    pub main_only: bool,
}

/// Holds a non-main checkout; returns the clone to main when released or
/// dropped.
pub struct CheckoutGuard<'a> {
    db: &'a dyn Database,
    branch: Option<String>,
}

impl<'a> CheckoutGuard<'a> {
    fn on_main(db: &'a dyn Database) -> Self {
        Self { db, branch: None }
    }

    /// The branch held checked out, if any.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Check out main now, reporting failure.
    pub fn release(mut self) -> Result<()> {
        if let Some(branch) = self.branch.take() {
            tracing::debug!("leaving {}", branch);
            self.db.checkout_main()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CheckoutGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutGuard")
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        if let Some(branch) = self.branch.take() {
            if let Err(e) = self.db.checkout_main() {
                tracing::error!("could not return from {} to main: {}", branch, e);
            }
        }
    }
}

/// What `push` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// `None` when pushing was skipped with `no_push`.
    pub target: Option<PushTarget>,
    /// Refs that were pushed, as `remote/branch`.
    pub pushed: Vec<String>,
    /// Review shell refreshed after a branch push.
    pub review: Option<PullRequest>,
}

impl PushReport {
    pub fn skipped(&self) -> bool {
        self.target.is_none()
    }

    pub fn hint(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.hint.as_deref())
    }
}

/// Whether `remote` is configured. Runs after a local commit, so a failed
/// lookup is recorded as a `Push` warning and the push is skipped.
pub(crate) fn remote_configured(
    db: &dyn Database,
    remote: &str,
    warnings: &mut Vec<Warning>,
) -> Result<bool> {
    Ok(settle(
        ErrorClass::Push,
        &format!("look up remote {}", remote),
        db.has_remote(remote),
        warnings,
    )?
    .unwrap_or(false))
}

/// Coordinates one state-changing command against one clone.
pub struct MutationContext<'a> {
    db: &'a dyn Database,
    config: &'a WorkspaceConfig,
    provider: Option<&'a dyn ReviewProvider>,
    item_id: String,
    options: MutationOptions,
    progress: Box<dyn ProgressSink + 'a>,
    location: Option<ItemLocation>,
    branch: String,
    warnings: Vec<Warning>,
}

impl<'a> MutationContext<'a> {
    pub fn new(
        db: &'a dyn Database,
        config: &'a WorkspaceConfig,
        item_id: impl Into<String>,
        options: MutationOptions,
    ) -> Self {
        Self {
            db,
            config,
            provider: None,
            item_id: item_id.into(),
            options,
            progress: Box::new(TracingProgress::new("push")),
            location: None,
            branch: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Provider used to refresh an open review after a branch push.
    pub fn with_provider(mut self, provider: Option<&'a dyn ReviewProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink + 'a>) -> Self {
        self.progress = progress;
        self
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// The checked-out review branch; empty when mutating main.
    pub fn branch_name(&self) -> &str {
        &self.branch
    }

    pub fn location(&self) -> Option<&ItemLocation> {
        self.location.as_ref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn warn(&mut self, class: ErrorClass, message: impl Into<String>) {
        self.warnings.push(Warning::new(class, message));
    }

    /// Prepare the clone for a mutation of this item.
    pub fn setup(&mut self) -> Result<CheckoutGuard<'a>> {
        self.db.ensure_available()?;
        // A previous run may have been killed while on a branch.
        self.db.checkout_main()?;

        settle(
            ErrorClass::Sync,
            "sync with upstream",
            self.db.sync(),
            &mut self.warnings,
        )?;

        let location = LocationResolver::new(self.db).locate(&self.item_id)?;
        if let Some(stale) = location.stale_claim(Utc::now(), self.config.stale_after_days) {
            tracing::warn!("{}", stale);
            self.warn(ErrorClass::Advisory, stale);
        }
        self.location = Some(location);

        let mut guard = CheckoutGuard::on_main(self.db);
        if self.config.mode == WorkflowMode::Pr && !self.options.main_only {
            let branch = self.config.branch_for(&self.item_id);
            let fresh = !self.db.branch_exists(&branch)?;
            self.db.checkout_branch(&branch)?;
            guard.branch = Some(branch.clone());

            // Pick up work already pushed from another clone.
            let pushed = tracking_ref(ORIGIN, &branch);
            if fresh && self.db.ref_exists(&pushed)? {
                tracing::info!("continuing {} from {}", branch, pushed);
                self.db.merge_branch(&pushed)?;
            }
            tracing::debug!("working on {}", branch);
            self.branch = branch;
        }
        Ok(guard)
    }

    /// Push the committed mutation where the workflow mode says it belongs.
    ///
    /// `post` is the item row as committed. Everything from here on runs
    /// after the local commit, so store failures become `Push` warnings.
    pub fn push(&mut self, post: Option<&WorkItem>) -> Result<PushReport> {
        if self.options.no_push {
            tracing::info!("--no-push: {} committed locally only", self.item_id);
            return Ok(PushReport::default());
        }

        let location = match &self.location {
            Some(location) => location.clone(),
            None => LocationResolver::new(self.db).locate(&self.item_id)?,
        };
        let scope = if self.branch.is_empty() {
            PushScope::Main
        } else {
            PushScope::Branch(self.branch.clone())
        };
        let target = resolve(self.config.mode, &scope, &location, post);
        let mut report = PushReport {
            target: Some(target.clone()),
            ..Default::default()
        };

        match &scope {
            PushScope::Branch(branch) => {
                if target.origin {
                    let pushed = settle(
                        ErrorClass::Push,
                        &format!("push {} to {}", branch, ORIGIN),
                        self.db.push_branch(branch, &mut *self.progress),
                        &mut self.warnings,
                    )?;
                    if pushed.is_some() {
                        report.pushed.push(tracking_ref(ORIGIN, branch));
                        report.review = self.refresh_review(branch)?;
                    }
                }
            }
            PushScope::Main => {
                if target.upstream && remote_configured(self.db, UPSTREAM, &mut self.warnings)? {
                    let pushed = settle(
                        ErrorClass::Push,
                        &format!("push main to {}", UPSTREAM),
                        self.db.push_with_sync(&mut *self.progress),
                        &mut self.warnings,
                    )?;
                    if pushed.is_some() {
                        report.pushed.push(tracking_ref(UPSTREAM, wl_store::MAIN));
                    }
                }
                if target.origin && remote_configured(self.db, ORIGIN, &mut self.warnings)? {
                    let pushed = settle(
                        ErrorClass::Push,
                        &format!("push main to {}", ORIGIN),
                        self.db.push_main(ORIGIN, &mut *self.progress),
                        &mut self.warnings,
                    )?;
                    if pushed.is_some() {
                        report.pushed.push(tracking_ref(ORIGIN, wl_store::MAIN));
                    }
                }
            }
        }

        if let Some(hint) = &target.hint {
            tracing::info!("{}", hint);
        }
        Ok(report)
    }

    /// Update the description of an open review for `branch`, if there is one.
    fn refresh_review(&mut self, branch: &str) -> Result<Option<PullRequest>> {
        let Some(provider) = self.provider else {
            return Ok(None);
        };
        let refreshed = (|| -> Result<Option<PullRequest>> {
            let item = self
                .db
                .item(&self.item_id)?
                .ok_or_else(|| wl_board::BoardError::NotFound(self.item_id.clone()))?;
            let diff = self.db.diff(branch)?;
            let shell = ReviewShellBuilder::new(
                provider,
                self.config.upstream_repo()?,
                self.config.fork_repo(),
            );
            Ok(shell.refresh(branch, &item, &diff)?)
        })();
        Ok(settle(
            ErrorClass::ReviewRefresh,
            &format!("refresh review for {}", branch),
            refreshed,
            &mut self.warnings,
        )?
        .flatten())
    }

    /// Return the clone to main and hand back every warning collected.
    pub fn finish(mut self, guard: CheckoutGuard<'_>) -> Vec<Warning> {
        if let Err(e) = guard.release() {
            self.warn(
                ErrorClass::Advisory,
                format!("could not check out main again: {}", e),
            );
        }
        self.warnings
    }
}

impl std::fmt::Debug for MutationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationContext")
            .field("item_id", &self.item_id)
            .field("branch", &self.branch)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wl_board::{ItemStatus, NewItem};
    use wl_review::testing::FakeGitHub;
    use wl_review::GitHubProvider;
    use wl_store::{MemoryRemote, MemoryStore, NullProgress, MAIN};

    struct Fixture {
        upstream: MemoryRemote,
        origin: MemoryRemote,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let upstream = MemoryRemote::new();
        let origin = MemoryRemote::new();
        let store = MemoryStore::with_fork(&upstream, &origin);
        Fixture {
            upstream,
            origin,
            store,
        }
    }

    fn config(mode: WorkflowMode) -> WorkspaceConfig {
        WorkspaceConfig::new("hop/commons", "bob", "commons", "/tmp/bob", "bob").with_mode(mode)
    }

    fn seed(fx: &Fixture) -> WorkItem {
        let item = WorkItem::post(NewItem::new("task"), "alice", Utc::now()).unwrap();
        fx.store.insert_item(&item).unwrap();
        fx.store.push_main(UPSTREAM, &mut NullProgress).unwrap();
        fx.store.push_main(ORIGIN, &mut NullProgress).unwrap();
        item
    }

    fn claim(db: &dyn Database, id: &str) -> WorkItem {
        let mut item = db.item(id).unwrap().unwrap();
        item.status = ItemStatus::Claimed;
        item.claimed_by = Some("bob".into());
        item.updated_at = Utc::now();
        db.update_item(&item).unwrap();
        db.commit("claim").unwrap();
        item
    }

    #[test]
    fn wild_west_mutates_main_and_pushes_both() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::WildWest);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        assert_eq!(ctx.branch_name(), "");
        assert!(guard.branch().is_none());

        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        let warnings = ctx.finish(guard);

        assert!(warnings.is_empty());
        assert_eq!(report.pushed, vec!["upstream/main", "origin/main"]);
        assert_eq!(
            fx.upstream.item(MAIN, &item.id).unwrap().status,
            ItemStatus::Claimed
        );
        assert_eq!(
            fx.origin.item(MAIN, &item.id).unwrap().status,
            ItemStatus::Claimed
        );
    }

    #[test]
    fn pr_mode_works_on_the_item_branch_and_pushes_fork_only() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::Pr);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        let branch = format!("wl/bob/{}", item.id);
        assert_eq!(ctx.branch_name(), branch);
        assert_eq!(fx.store.current_branch().unwrap(), branch);

        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        ctx.finish(guard);

        assert_eq!(fx.store.current_branch().unwrap(), MAIN);
        assert_eq!(report.pushed, vec![format!("origin/{}", branch)]);
        assert!(fx.origin.has_branch(&branch));
        assert_eq!(
            fx.upstream.item(MAIN, &item.id).unwrap().status,
            ItemStatus::Open
        );
    }

    #[test]
    fn error_after_setup_still_returns_to_main() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::Pr);

        let attempt = || -> Result<()> {
            let mut ctx =
                MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
            let _guard = ctx.setup()?;
            Err(wl_board::BoardError::Missing("evidence").into())
        };
        assert!(attempt().is_err());
        assert_eq!(fx.store.current_branch().unwrap(), MAIN);
    }

    #[test]
    fn setup_tolerates_a_leftover_branch_checkout() {
        let fx = fixture();
        let item = seed(&fx);
        fx.store.checkout_branch("wl/bob/leftover").unwrap();
        let cfg = config(WorkflowMode::WildWest);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        assert_eq!(fx.store.current_branch().unwrap(), MAIN);
        ctx.finish(guard);
    }

    #[test]
    fn offline_sync_and_push_become_warnings() {
        let fx = fixture();
        let item = seed(&fx);
        fx.upstream.set_reachable(false);
        let cfg = config(WorkflowMode::WildWest);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        let warnings = ctx.finish(guard);

        assert_eq!(report.pushed, vec!["origin/main"]);
        let classes: Vec<ErrorClass> = warnings.iter().map(|w| w.class).collect();
        assert_eq!(classes, vec![ErrorClass::Sync, ErrorClass::Push]);
        assert_eq!(
            fx.store.item(&item.id).unwrap().unwrap().status,
            ItemStatus::Claimed
        );
    }

    #[test]
    fn failed_remote_lookup_after_commit_is_a_push_warning() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::WildWest);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        let claimed = claim(&fx.store, &item.id);
        fx.store.set_remote_lookup_fails(true);
        let report = ctx.push(Some(&claimed)).unwrap();
        let warnings = ctx.finish(guard);

        assert!(report.pushed.is_empty());
        let classes: Vec<ErrorClass> = warnings.iter().map(|w| w.class).collect();
        assert_eq!(classes, vec![ErrorClass::Push, ErrorClass::Push]);
        assert!(warnings[0].to_string().contains("wl sync --push"));
        assert_eq!(
            fx.store.item(&item.id).unwrap().unwrap().status,
            ItemStatus::Claimed
        );
    }

    #[test]
    fn stale_claim_is_an_advisory() {
        let fx = fixture();
        let mut item = WorkItem::post(NewItem::new("old task"), "alice", Utc::now()).unwrap();
        item.status = ItemStatus::Claimed;
        item.claimed_by = Some("carol".into());
        item.updated_at = Utc::now() - chrono::Duration::days(30);
        fx.store.insert_item(&item).unwrap();
        fx.store.push_main(UPSTREAM, &mut NullProgress).unwrap();
        let cfg = config(WorkflowMode::WildWest);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default());
        let guard = ctx.setup().unwrap();
        let warnings = ctx.finish(guard);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].class, ErrorClass::Advisory);
        assert!(warnings[0].message.contains("claimed without progress"));
    }

    #[test]
    fn no_push_commits_locally_only() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::WildWest);
        let options = MutationOptions {
            no_push: true,
            ..Default::default()
        };

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, options);
        let guard = ctx.setup().unwrap();
        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        ctx.finish(guard);

        assert!(report.skipped());
        assert_eq!(
            fx.upstream.item(MAIN, &item.id).unwrap().status,
            ItemStatus::Open
        );
    }

    #[test]
    fn missing_tool_aborts_setup() {
        let fx = fixture();
        fx.store.set_available(false);
        let cfg = config(WorkflowMode::WildWest);
        let mut ctx = MutationContext::new(&fx.store, &cfg, "w-1", MutationOptions::default());
        let err = ctx.setup().unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::ToolingUnavailable);
    }

    #[test]
    fn branch_push_refreshes_an_open_review() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::Pr);
        let gh = FakeGitHub::new();
        gh.seed_repo(&cfg.fork_repo());
        let provider = GitHubProvider::with_transport(gh.clone());
        let branch = cfg.branch_for(&item.id);

        let shell = ReviewShellBuilder::new(&provider, cfg.upstream_repo().unwrap(), cfg.fork_repo());
        let diff = fx.store.diff(MAIN).unwrap();
        shell.open(&branch, &item, &diff).unwrap();

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default())
            .with_provider(Some(&provider));
        let guard = ctx.setup().unwrap();
        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        assert!(ctx.finish(guard).is_empty());

        assert!(report.review.is_some());
        assert_eq!(gh.pulls().len(), 1);
        assert!(gh.pulls()[0].body.contains("status on branch: claimed"));
    }

    #[test]
    fn review_refresh_failure_is_a_warning() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::Pr);
        let gh = FakeGitHub::new();
        gh.fail_on("pulls");
        let provider = GitHubProvider::with_transport(gh);

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default())
            .with_provider(Some(&provider));
        let guard = ctx.setup().unwrap();
        let claimed = claim(&fx.store, &item.id);
        let report = ctx.push(Some(&claimed)).unwrap();
        let warnings = ctx.finish(guard);

        assert_eq!(report.pushed.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].class, ErrorClass::ReviewRefresh);
    }

    #[test]
    fn progress_lines_reach_the_sink() {
        let fx = fixture();
        let item = seed(&fx);
        let cfg = config(WorkflowMode::WildWest);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let lines = lines.clone();
            move |l: &str| lines.lock().unwrap().push(l.to_string())
        };

        let mut ctx = MutationContext::new(&fx.store, &cfg, &item.id, MutationOptions::default())
            .with_progress(Box::new(sink));
        let guard = ctx.setup().unwrap();
        ctx.push(Some(&item)).unwrap();
        ctx.finish(guard);
        assert!(!lines.lock().unwrap().is_empty());
    }
}
