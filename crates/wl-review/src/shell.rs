// shell.rs — ReviewShellBuilder: the pull request that mirrors an item branch.
//
// One shell per `wl/<rig>/<item>` branch. Opening is idempotent: the branch
// content is republished and an existing open PR for `<fork-owner>:<branch>`
// is updated in place, so re-running yields the same URL. Approval gating
// is advisory and closing after merge is best-effort; both report problems
// to the caller instead of failing.

use std::collections::BTreeMap;

use wl_board::WorkItem;
use wl_store::DiffSummary;

use crate::error::{Result, ReviewError};
use crate::provider::{
    NewPullRequest, PrHead, PullRequest, RepoRef, Review, ReviewEvent, ReviewProvider,
    ReviewState,
};

/// Directory (inside the shell branch) holding review marker files.
pub const MARKER_DIR: &str = ".wasteland/reviews";

/// Deterministic marker file path for an item.
pub fn marker_path(item_id: &str) -> String {
    format!("{}/{}.md", MARKER_DIR, item_id)
}

pub fn shell_title(item: &WorkItem) -> String {
    format!("[wl] {} ({})", item.title, item.id)
}

/// Markdown body shared by the marker file and the PR description.
pub fn render_body(item: &WorkItem, branch: &str, diff: &DiffSummary) -> String {
    let mut body = format!("## {}\n\n", item.title);
    body.push_str(&format!(
        "- item: `{}`\n- type: {}, priority {}, effort {}\n- posted by: {}\n",
        item.id, item.item_type, item.priority, item.effort_level, item.posted_by
    ));
    if let Some(claimer) = &item.claimed_by {
        body.push_str(&format!("- claimed by: {}\n", claimer));
    }
    body.push_str(&format!("- status on branch: {}\n", item.status));
    if !item.tags.is_empty() {
        body.push_str(&format!("- tags: {}\n", item.tags.join(", ")));
    }
    if !item.description.trim().is_empty() {
        body.push_str(&format!("\n{}\n", item.description.trim()));
    }
    body.push_str(&format!("\n### Changes on `{}`\n\n{}", branch, diff));
    body.push_str(&format!(
        "\n---\nReview with `wl approve {id}` or `wl request-changes {id}`; \
         merge with `wl merge {id}`.\n",
        id = item.id
    ));
    body
}

/// Result of opening a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutcome {
    pub pr: PullRequest,
    /// False when an existing open PR was updated instead.
    pub created: bool,
}

/// Review state folded to the latest verdict per reviewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewGate {
    pub pr: Option<PullRequest>,
    pub approvals: Vec<String>,
    pub changes_requested: Vec<String>,
}

impl ReviewGate {
    /// Fold reviews in submission order. Comments never change a verdict;
    /// a dismissal clears it.
    pub fn from_reviews(pr: Option<PullRequest>, reviews: &[Review]) -> Self {
        let mut ordered: Vec<&Review> = reviews.iter().collect();
        if ordered.iter().all(|r| r.submitted_at.is_some()) {
            ordered.sort_by_key(|r| r.submitted_at);
        }

        let mut latest: BTreeMap<&str, ReviewState> = BTreeMap::new();
        for review in ordered {
            match review.state {
                ReviewState::Commented => {}
                ReviewState::Dismissed => {
                    latest.remove(review.author.as_str());
                }
                state => {
                    latest.insert(review.author.as_str(), state);
                }
            }
        }

        let pick = |wanted: ReviewState| {
            latest
                .iter()
                .filter(|(_, s)| **s == wanted)
                .map(|(a, _)| a.to_string())
                .collect::<Vec<_>>()
        };
        ReviewGate {
            approvals: pick(ReviewState::Approved),
            changes_requested: pick(ReviewState::ChangesRequested),
            pr,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.changes_requested.is_empty() && !self.approvals.is_empty()
    }

    /// Advisory messages to print before merging.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.pr.is_none() {
            out.push("no open review found for this branch".to_string());
        }
        if !self.changes_requested.is_empty() {
            out.push(format!(
                "outstanding change requests from {}",
                self.changes_requested.join(", ")
            ));
        }
        if self.approvals.is_empty() {
            out.push("no approvals".to_string());
        }
        out
    }
}

/// Which best-effort step of closing a shell failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    Find,
    Comment,
    Close,
    DeleteBranch,
}

impl CloseStep {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseStep::Find => "find review",
            CloseStep::Comment => "post closing comment",
            CloseStep::Close => "close review",
            CloseStep::DeleteBranch => "delete review branch",
        }
    }
}

#[derive(Debug, Default)]
pub struct CloseReport {
    pub closed: Option<PullRequest>,
    pub failures: Vec<(CloseStep, ReviewError)>,
}

/// Opens, refreshes, reviews and closes review shells for one
/// upstream/fork pair.
pub struct ReviewShellBuilder<'a> {
    provider: &'a dyn ReviewProvider,
    upstream: RepoRef,
    fork: RepoRef,
}

impl<'a> ReviewShellBuilder<'a> {
    pub fn new(provider: &'a dyn ReviewProvider, upstream: RepoRef, fork: RepoRef) -> Self {
        Self {
            provider,
            upstream,
            fork,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn head(&self, branch: &str) -> PrHead {
        PrHead::new(self.fork.clone(), branch)
    }

    pub fn find(&self, branch: &str) -> Result<Option<PullRequest>> {
        self.provider.find_pr(&self.upstream, &self.head(branch))
    }

    /// Publish the branch shell and open its PR, or update the open one.
    pub fn open(&self, branch: &str, item: &WorkItem, diff: &DiffSummary) -> Result<ShellOutcome> {
        self.provider.ensure_available()?;
        let head = self.head(branch);
        let title = shell_title(item);
        let body = render_body(item, branch, diff);

        self.provider.publish_branch(
            &head,
            &marker_path(&item.id),
            &body,
            &format!("wl review: {}", item.id),
        )?;

        if let Some(pr) = self.provider.find_pr(&self.upstream, &head)? {
            tracing::info!("updating review {} for {}", pr.url, branch);
            self.provider
                .update_pr(&self.upstream, pr.number, &title, &body)?;
            return Ok(ShellOutcome { pr, created: false });
        }

        let pr = self.provider.create_pr(&NewPullRequest {
            base: self.upstream.clone(),
            base_branch: wl_store::MAIN.to_string(),
            head,
            title,
            body,
        })?;
        tracing::info!("opened review {} for {}", pr.url, branch);
        Ok(ShellOutcome { pr, created: true })
    }

    /// Bring an already-open shell up to date; does nothing when no review
    /// has been opened for the branch.
    pub fn refresh(
        &self,
        branch: &str,
        item: &WorkItem,
        diff: &DiffSummary,
    ) -> Result<Option<PullRequest>> {
        if self.find(branch)?.is_none() {
            tracing::debug!("no open review for {}; nothing to refresh", branch);
            return Ok(None);
        }
        self.open(branch, item, diff).map(|o| Some(o.pr))
    }

    /// Submit a verdict on the branch's open review.
    pub fn review(&self, branch: &str, event: ReviewEvent, body: &str) -> Result<PullRequest> {
        let pr = self
            .find(branch)?
            .ok_or_else(|| ReviewError::NotFound(branch.to_string()))?;
        self.provider
            .submit_review(&self.upstream, pr.number, event, body)?;
        tracing::info!("submitted {} on {}", event, pr.url);
        Ok(pr)
    }

    pub fn gate(&self, branch: &str) -> Result<ReviewGate> {
        let Some(pr) = self.find(branch)? else {
            return Ok(ReviewGate::default());
        };
        let reviews = self.provider.list_reviews(&self.upstream, pr.number)?;
        Ok(ReviewGate::from_reviews(Some(pr), &reviews))
    }

    /// Comment on, close, and delete the branch of a merged item's shell.
    /// Every step is attempted; failures are collected, and operations the
    /// provider does not support are skipped.
    pub fn close_after_merge(&self, branch: &str, comment: &str) -> CloseReport {
        let mut report = CloseReport::default();
        let pr = match self.find(branch) {
            Ok(Some(pr)) => pr,
            Ok(None) => return report,
            Err(e) => {
                report.failures.push((CloseStep::Find, e));
                return report;
            }
        };

        if let Err(e) = self.provider.add_comment(&self.upstream, pr.number, comment) {
            report.failures.push((CloseStep::Comment, e));
        }
        match self.provider.close_pr(&self.upstream, pr.number) {
            Ok(()) => report.closed = Some(pr),
            Err(e) => report.failures.push((CloseStep::Close, e)),
        }
        match self.provider.delete_ref(&self.head(branch)) {
            Ok(()) | Err(ReviewError::Unsupported { .. }) => {}
            Err(e) => report.failures.push((CloseStep::DeleteBranch, e)),
        }
        report
    }
}
