// review.rs — Review shells around item branches: open, verdicts, merge.
//
// A reviewer acting on another rig's branch names that rig (and its fork
// org, when it differs from the handle). The shell is looked up on the
// upstream commons by its `<fork-org>:wl/<rig>/<item>` head.

use wl_board::{branch_name, BoardError, WorkItem};
use wl_review::{PullRequest, RepoRef, ReviewEvent, ReviewGate, ReviewShellBuilder};
use wl_store::{tracking_ref, StoreError, ORIGIN, UPSTREAM};

use crate::actions::Board;
use crate::error::{Result, WorkspaceError};
use crate::mutation::{MutationOptions, PushReport};
use crate::policy::{settle, ErrorClass, Warning};

/// The rig whose item branch a review command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOwner {
    pub rig: String,
    /// Org holding that rig's fork of the commons.
    pub fork_org: String,
}

impl BranchOwner {
    /// `fork_org` defaults to the rig handle.
    pub fn new(rig: impl Into<String>, fork_org: Option<String>) -> Self {
        let rig = rig.into();
        let fork_org = fork_org.unwrap_or_else(|| rig.clone());
        Self { rig, fork_org }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewOutcome {
    pub branch: String,
    /// `None` with `--no-push`: nothing was sent anywhere.
    pub pr: Option<PullRequest>,
    pub created: bool,
    pub pushed: bool,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub item: WorkItem,
    pub branch: String,
    /// Review state read before merging; `None` when it could not be read.
    pub gate: Option<ReviewGate>,
    pub push: PushReport,
    pub closed: Option<PullRequest>,
    pub warnings: Vec<Warning>,
}

impl<'a> Board<'a> {
    /// The current rig as branch owner, using the workspace's fork org.
    pub fn own_branch(&self) -> BranchOwner {
        BranchOwner::new(self.rig(), Some(self.config.fork_org.clone()))
    }

    fn shell(&self, owner: &BranchOwner) -> Result<ReviewShellBuilder<'a>> {
        let provider = self.require_provider()?;
        Ok(ReviewShellBuilder::new(
            provider,
            self.config.upstream_repo()?,
            RepoRef::new(&owner.fork_org, &self.config.fork_db),
        ))
    }

    /// Where to read `owner`'s branch: the local branch, else a copy on this
    /// rig's fork or on canonical, else (for another rig) the copy fetched
    /// from that rig's fork.
    fn branch_ref(&self, owner: &BranchOwner, branch: &str) -> Result<String> {
        if self.db.branch_exists(branch)? {
            return Ok(branch.to_string());
        }
        for remote in [ORIGIN, UPSTREAM] {
            let pushed = tracking_ref(remote, branch);
            if self.db.ref_exists(&pushed)? {
                return Ok(pushed);
            }
        }
        if owner.fork_org == self.config.fork_org {
            return Err(WorkspaceError::NoBranch(branch.to_string()));
        }

        let fork = RepoRef::new(&owner.fork_org, &self.config.fork_db).to_string();
        match self.db.fetch_peer_branch(&owner.fork_org, &fork, branch) {
            Ok(reference) => {
                tracing::info!("fetched {} from {}", branch, fork);
                Ok(reference)
            }
            Err(StoreError::RefNotFound(_)) => Err(WorkspaceError::NoBranch(branch.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Push this rig's branch for `id` and open or update its review shell.
    pub fn open_review(&self, id: &str) -> Result<ReviewOutcome> {
        self.db.ensure_available()?;
        let owner = self.own_branch();
        let branch = branch_name(&owner.rig, id);
        let reference = self.branch_ref(&owner, &branch)?;
        let item = self
            .db
            .item_as_of(&reference, id)?
            .ok_or_else(|| BoardError::NotFound(id.to_string()))?;

        let mut outcome = ReviewOutcome {
            branch: branch.clone(),
            ..Default::default()
        };
        if self.options.no_push {
            tracing::info!("--no-push: not opening a review for {}", branch);
            return Ok(outcome);
        }
        let shell = self.shell(&owner)?;

        if reference == branch {
            let mut progress = wl_store::TracingProgress::new("push");
            outcome.pushed = settle(
                ErrorClass::Push,
                &format!("push {} to {}", branch, ORIGIN),
                self.db.push_branch(&branch, &mut progress),
                &mut outcome.warnings,
            )?
            .is_some();
        }

        let diff = self.db.diff(&reference)?;
        let opened = shell.open(&branch, &item, &diff)?;
        outcome.created = opened.created;
        outcome.pr = Some(opened.pr);
        Ok(outcome)
    }

    /// Approve or request changes on `owner`'s review for `id`.
    pub fn submit_review(
        &self,
        id: &str,
        owner: &BranchOwner,
        event: ReviewEvent,
        body: &str,
    ) -> Result<Option<PullRequest>> {
        let branch = branch_name(&owner.rig, id);
        if self.options.no_push {
            tracing::info!("--no-push: not submitting {} on {}", event, branch);
            return Ok(None);
        }
        let pr = self.shell(owner)?.review(&branch, event, body)?;
        Ok(Some(pr))
    }

    /// Merge `owner`'s branch for `id` into main, push, and close its review.
    ///
    /// Another rig's branch is fetched from that rig's fork when this clone
    /// has no copy. Review state is advisory: outstanding change requests or
    /// a missing approval are reported as warnings and the merge goes ahead.
    pub fn merge(&self, id: &str, owner: &BranchOwner) -> Result<MergeOutcome> {
        let branch = branch_name(&owner.rig, id);
        let options = MutationOptions {
            main_only: true,
            ..self.options
        };
        let mut ctx = self.context(id, options);
        let guard = ctx.setup()?;
        let reference = self.branch_ref(owner, &branch)?;

        let online = !self.options.no_push;
        let shell = match self.provider {
            Some(_) if online => Some(self.shell(owner)?),
            _ => None,
        };

        let mut warnings = Vec::new();
        let gate = match &shell {
            Some(shell) => settle(
                ErrorClass::ApprovalLookup,
                &format!("read review state for {}", branch),
                shell.gate(&branch),
                &mut warnings,
            )?,
            None => None,
        };
        if let Some(gate) = &gate {
            for advisory in gate.warnings() {
                tracing::warn!("{}: {}", branch, advisory);
                warnings.push(Warning::new(ErrorClass::ApprovalLookup, advisory));
            }
        }

        self.db.merge_branch(&reference)?;
        tracing::info!("merged {} into main", reference);
        let item = self.load(id)?;
        let push = ctx.push(Some(&item))?;

        let mut closed = None;
        if let Some(shell) = &shell {
            let report = shell.close_after_merge(
                &branch,
                &format!("Merged into main of {} as {}.", self.config.upstream, item.status),
            );
            for (step, err) in report.failures {
                warnings.push(Warning::new(
                    ErrorClass::ReviewClose,
                    format!("{} failed: {}", step.as_str(), err),
                ));
            }
            closed = report.closed;
        }

        if reference == branch {
            settle(
                ErrorClass::ReviewClose,
                &format!("delete local branch {}", branch),
                self.db.delete_branch(&branch),
                &mut warnings,
            )?;
        }

        let mut all = ctx.finish(guard);
        all.extend(warnings);
        Ok(MergeOutcome {
            item,
            branch,
            gate,
            push,
            closed,
            warnings: all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{WorkflowMode, WorkspaceConfig};
    use wl_board::{ItemStatus, NewItem};
    use wl_review::testing::FakeGitHub;
    use wl_review::GitHubProvider;
    use wl_store::{Database, MemoryStore, MAIN};

    fn pr_config(rig: &str) -> WorkspaceConfig {
        WorkspaceConfig::new("hop/commons", rig, "commons", "/tmp/x", rig)
            .with_mode(WorkflowMode::Pr)
    }

    #[test]
    fn branch_owner_defaults_fork_org_to_handle() {
        let owner = BranchOwner::new("bob", None);
        assert_eq!(owner.fork_org, "bob");
        let owner = BranchOwner::new("bob", Some("bob-labs".into()));
        assert_eq!(owner.fork_org, "bob-labs");
    }

    #[test]
    fn open_review_without_branch_fails() {
        let store = MemoryStore::new();
        let config = pr_config("bob");
        let fake = FakeGitHub::new();
        let provider = GitHubProvider::with_transport(fake);
        let err = Board::new(&store, &config)
            .with_provider(Some(&provider))
            .open_review("w-0000000000")
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NoBranch(_)));
    }

    #[test]
    fn open_review_requires_provider() {
        let store = MemoryStore::new();
        let config = pr_config("bob");
        store.checkout_branch("wl/bob/w-1").unwrap();
        let mut item = WorkItem::post(NewItem::new("x"), "alice", chrono::Utc::now()).unwrap();
        item.id = "w-1".into();
        store.insert_item(&item).unwrap();
        store.commit("seed").unwrap();
        store.checkout_main().unwrap();

        let err = Board::new(&store, &config).open_review("w-1").unwrap_err();
        assert!(matches!(err, WorkspaceError::NoProvider));
    }

    #[test]
    fn merge_without_provider_merges_locally() {
        let store = MemoryStore::new();
        let bob = pr_config("bob");
        let offline = MutationOptions {
            no_push: true,
            ..Default::default()
        };
        let board = Board::new(&store, &bob).with_options(offline);

        // Posting in pr mode lands on the item branch, not main.
        let posted = board.post(NewItem::new("Write docs")).unwrap();
        let id = posted.item.id.clone();
        let branch = posted.branch.clone().unwrap();
        assert!(store.branch(MAIN).unwrap().items.get(&id).is_none());

        let merged = board.merge(&id, &board.own_branch()).unwrap();
        assert_eq!(merged.item.status, ItemStatus::Open);
        assert!(merged.gate.is_none());
        assert!(store.branch(MAIN).unwrap().items.contains_key(&id));
        assert!(!store.branch_exists(&branch).unwrap());
        assert_eq!(store.current_branch().unwrap(), MAIN);
    }
}
