// actions.rs — Wanted-board commands as coordinated mutations.
//
// Each command validates its input first (nothing touched), then runs inside
// a MutationContext: setup, read the item from the working copy, check the
// lifecycle transition and who is allowed to make it, write, commit, push.
// The state machine only knows statuses; authorization lives here:
//
//   claim     any rig
//   unclaim   claimer or poster
//   done      claimer only
//   accept    poster only, and never the rig that submitted the completion
//   reject    poster only; removes the completion
//   close     poster only; no stamp
//   delete    any rig
//   update    any rig
//
// Rig handles are compared exactly (case-sensitive).

use std::time::Duration;

use chrono::{DateTime, Utc};
use wl_board::{
    validate_transition, BoardError, CompletionRecord, ItemUpdate, NewItem, Stamp, StampInput,
    TransitionKind, WorkItem,
};
use wl_review::ReviewProvider;
use wl_store::{Database, StoreError, ORIGIN, UPSTREAM};

use crate::config::{WorkflowMode, WorkspaceConfig};
use crate::error::{Result, WorkspaceError};
use crate::location::{DashboardEntry, ItemLocation, LocationResolver};
use crate::mutation::{remote_configured, MutationContext, MutationOptions, PushReport};
use crate::policy::{settle, ErrorClass, Warning};

/// Bound on read-only id suggestion queries.
pub const SUGGEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one board command.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub item: WorkItem,
    pub completion: Option<CompletionRecord>,
    pub stamp: Option<Stamp>,
    /// Review branch the mutation was made on, if any.
    pub branch: Option<String>,
    pub push: PushReport,
    pub warnings: Vec<Warning>,
}

/// What a mutation wrote, before commit and push.
pub(crate) struct Applied {
    pub item: WorkItem,
    pub completion: Option<CompletionRecord>,
    pub stamp: Option<Stamp>,
    pub message: String,
}

impl Applied {
    fn item(item: WorkItem, message: String) -> Self {
        Self {
            item,
            completion: None,
            stamp: None,
            message,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pushed: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// The wanted board of one joined commons, acting as its rig.
pub struct Board<'a> {
    pub(crate) db: &'a dyn Database,
    pub(crate) config: &'a WorkspaceConfig,
    pub(crate) provider: Option<&'a dyn ReviewProvider>,
    pub(crate) options: MutationOptions,
    progress: Option<fn(&str)>,
}

impl<'a> Board<'a> {
    pub fn new(db: &'a dyn Database, config: &'a WorkspaceConfig) -> Self {
        Self {
            db,
            config,
            provider: None,
            options: MutationOptions::default(),
            progress: None,
        }
    }

    pub fn with_provider(mut self, provider: Option<&'a dyn ReviewProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_options(mut self, options: MutationOptions) -> Self {
        self.options = options;
        self
    }

    /// Forward push progress lines to `sink` instead of the log.
    pub fn with_progress(mut self, sink: fn(&str)) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn rig(&self) -> &str {
        &self.config.rig_handle
    }

    pub fn config(&self) -> &WorkspaceConfig {
        self.config
    }

    pub(crate) fn require_provider(&self) -> Result<&'a dyn ReviewProvider> {
        self.provider.ok_or(WorkspaceError::NoProvider)
    }

    pub(crate) fn context(&self, item_id: &str, options: MutationOptions) -> MutationContext<'a> {
        let ctx = MutationContext::new(self.db, self.config, item_id, options)
            .with_provider(self.provider);
        match self.progress {
            Some(sink) => ctx.with_progress(Box::new(sink)),
            None => ctx,
        }
    }

    pub(crate) fn load(&self, id: &str) -> Result<WorkItem> {
        self.db
            .item(id)?
            .ok_or_else(|| BoardError::NotFound(id.to_string()).into())
    }

    fn require_poster(&self, item: &WorkItem, action: TransitionKind) -> Result<()> {
        if item.posted_by != self.rig() {
            return Err(BoardError::NotPoster {
                item_id: item.id.clone(),
                action,
                posted_by: item.posted_by.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Setup, mutate, commit, push, return to main.
    fn run<F>(&self, item_id: &str, mutate: F) -> Result<Outcome>
    where
        F: FnOnce(&Self, DateTime<Utc>) -> Result<Applied>,
    {
        let mut ctx = self.context(item_id, self.options);
        let guard = ctx.setup()?;
        let applied = mutate(self, Utc::now())?;
        self.db.commit(&applied.message)?;
        tracing::info!("{}", applied.message);

        let push = ctx.push(Some(&applied.item))?;
        let branch = Some(ctx.branch_name().to_string()).filter(|b| !b.is_empty());
        let warnings = ctx.finish(guard);
        Ok(Outcome {
            item: applied.item,
            completion: applied.completion,
            stamp: applied.stamp,
            branch,
            push,
            warnings,
        })
    }

    pub fn post(&self, input: NewItem) -> Result<Outcome> {
        let item = WorkItem::post(input, self.rig(), Utc::now())?;
        let id = item.id.clone();
        self.run(&id, move |board, _| {
            board.db.insert_item(&item)?;
            let message = format!("wl post: {} {}", item.id, item.title);
            Ok(Applied::item(item, message))
        })
    }

    pub fn claim(&self, id: &str) -> Result<Outcome> {
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            item.status = validate_transition(item.status, TransitionKind::Claim)?;
            item.claimed_by = Some(board.rig().to_string());
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied::item(item, format!("wl claim: {}", id)))
        })
    }

    pub fn unclaim(&self, id: &str) -> Result<Outcome> {
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            let next = validate_transition(item.status, TransitionKind::Unclaim)?;
            let claimer = item.claimed_by.clone().unwrap_or_default();
            if board.rig() != claimer && board.rig() != item.posted_by {
                return Err(BoardError::NotClaimerOrPoster {
                    item_id: id.to_string(),
                    claimed_by: claimer,
                    posted_by: item.posted_by.clone(),
                }
                .into());
            }
            item.status = next;
            item.claimed_by = None;
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied::item(item, format!("wl unclaim: {}", id)))
        })
    }

    pub fn update(&self, id: &str, update: ItemUpdate) -> Result<Outcome> {
        if update.is_empty() {
            return Err(BoardError::Invalid {
                field: "update",
                reason: "no fields to change".to_string(),
            }
            .into());
        }
        self.run(id, move |board, now| {
            let mut item = board.load(id)?;
            item.status = validate_transition(item.status, TransitionKind::Update)?;
            item.apply_update(update, now)?;
            board.db.update_item(&item)?;
            Ok(Applied::item(item, format!("wl update: {}", id)))
        })
    }

    /// Withdraw an open item.
    pub fn delete(&self, id: &str) -> Result<Outcome> {
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            item.status = validate_transition(item.status, TransitionKind::Delete)?;
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied::item(item, format!("wl delete: {}", id)))
        })
    }

    /// Submit evidence for a claimed item.
    pub fn done(&self, id: &str, evidence: &str) -> Result<Outcome> {
        if evidence.trim().is_empty() {
            return Err(BoardError::Missing("evidence").into());
        }
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            let next = validate_transition(item.status, TransitionKind::Done)?;
            if item.claimed_by.as_deref() != Some(board.rig()) {
                return Err(BoardError::NotClaimedByYou {
                    item_id: id.to_string(),
                    claimed_by: item.claimed_by.clone().unwrap_or_default(),
                }
                .into());
            }
            let completion = CompletionRecord::new(id, board.rig(), evidence, now)?;
            board.db.insert_completion(&completion)?;
            item.status = next;
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied {
                message: format!("wl done: {} ({})", id, completion.id),
                item,
                completion: Some(completion),
                stamp: None,
            })
        })
    }

    /// Accept a completion and stamp the rig that did the work.
    pub fn accept(&self, id: &str, input: StampInput) -> Result<Outcome> {
        input.validate()?;
        self.run(id, move |board, now| {
            let mut item = board.load(id)?;
            let next = validate_transition(item.status, TransitionKind::Accept)?;
            let mut completion = board
                .db
                .completion(id)?
                .ok_or_else(|| BoardError::NoCompletion(id.to_string()))?;
            if completion.completed_by == board.rig() {
                return Err(BoardError::SelfAccept(id.to_string()).into());
            }
            board.require_poster(&item, TransitionKind::Accept)?;

            let stamp = Stamp::new(
                board.rig(),
                &completion.completed_by,
                &completion.id,
                input,
                now,
            )?;
            board.db.insert_stamp(&stamp)?;
            completion.validated_by = Some(board.rig().to_string());
            completion.stamp_id = Some(stamp.id.clone());
            completion.validated_at = Some(now);
            board.db.update_completion(&completion)?;

            item.status = next;
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied {
                message: format!("wl accept: {} (stamp {})", id, stamp.id),
                item,
                completion: Some(completion),
                stamp: Some(stamp),
            })
        })
    }

    /// Send an item in review back to its claimer.
    pub fn reject(&self, id: &str, reason: Option<&str>) -> Result<Outcome> {
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            let next = validate_transition(item.status, TransitionKind::Reject)?;
            board.require_poster(&item, TransitionKind::Reject)?;
            board.db.delete_completion(id)?;
            item.status = next;
            item.updated_at = now;
            board.db.update_item(&item)?;
            let message = match reason.map(str::trim).filter(|r| !r.is_empty()) {
                Some(reason) => format!("wl reject: {}: {}", id, reason),
                None => format!("wl reject: {}", id),
            };
            Ok(Applied::item(item, message))
        })
    }

    /// Complete an item in review without issuing a stamp.
    pub fn close(&self, id: &str) -> Result<Outcome> {
        self.run(id, |board, now| {
            let mut item = board.load(id)?;
            let next = validate_transition(item.status, TransitionKind::Close)?;
            board.require_poster(&item, TransitionKind::Close)?;
            let completion = match board.db.completion(id)? {
                Some(mut c) => {
                    c.validated_by = Some(board.rig().to_string());
                    c.validated_at = Some(now);
                    board.db.update_completion(&c)?;
                    Some(c)
                }
                None => None,
            };
            item.status = next;
            item.updated_at = now;
            board.db.update_item(&item)?;
            Ok(Applied {
                message: format!("wl close: {}", id),
                item,
                completion,
                stamp: None,
            })
        })
    }

    /// Where an item currently stands across canonical, fork and branches.
    pub fn status(&self, id: &str) -> Result<ItemLocation> {
        self.db.ensure_available()?;
        LocationResolver::new(self.db).locate(id)
    }

    /// Items this rig posted or holds, each listed once.
    pub fn mine(&self) -> Result<Vec<DashboardEntry>> {
        self.db.ensure_available()?;
        LocationResolver::new(self.db).dashboard(self.rig())
    }

    /// Pull canonical into local main; with `push`, retry pushing main.
    pub fn sync(&self, push: bool) -> Result<SyncReport> {
        self.db.ensure_available()?;
        self.db.checkout_main()?;
        self.db.sync()?;
        let mut report = SyncReport::default();
        if !push {
            return Ok(report);
        }

        let mut progress: Box<dyn wl_store::ProgressSink> = match self.progress {
            Some(sink) => Box::new(sink),
            None => Box::new(wl_store::TracingProgress::new("sync")),
        };
        if self.config.mode == WorkflowMode::WildWest
            && remote_configured(self.db, UPSTREAM, &mut report.warnings)?
        {
            let pushed = settle(
                ErrorClass::Push,
                "push main to upstream",
                self.db.push_with_sync(&mut *progress),
                &mut report.warnings,
            )?;
            if pushed.is_some() {
                report.pushed.push(wl_store::tracking_ref(UPSTREAM, wl_store::MAIN));
            }
        }
        if remote_configured(self.db, ORIGIN, &mut report.warnings)? {
            let pushed = settle(
                ErrorClass::Push,
                "push main to origin",
                self.db.push_main(ORIGIN, &mut *progress),
                &mut report.warnings,
            )?;
            if pushed.is_some() {
                report.pushed.push(wl_store::tracking_ref(ORIGIN, wl_store::MAIN));
            }
        }
        Ok(report)
    }

    /// Open item ids starting with `prefix`, for shell completion. Gives up
    /// quietly (no ids) when the query does not answer in time.
    pub fn suggest_ids(&self, prefix: &str) -> Result<Vec<String>> {
        match self.db.suggest_item_ids(prefix, SUGGEST_TIMEOUT) {
            Ok(ids) => Ok(ids),
            Err(StoreError::Timeout { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}
