// provider.rs — The hosting-provider contract shared by GitHub and DoltHub.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};

/// An `owner/name` repository (or database) on a hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(RepoRef::new(owner, name))
            }
            _ => Err(ReviewError::InvalidRepo(s.to_string())),
        }
    }
}

/// The fork-side end of a cross-fork pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrHead {
    pub fork: RepoRef,
    pub branch: String,
}

impl PrHead {
    pub fn new(fork: RepoRef, branch: impl Into<String>) -> Self {
        Self {
            fork,
            branch: branch.into(),
        }
    }
}

impl fmt::Display for PrHead {
    /// `<fork-owner>:<branch>`, the form providers match open PRs by.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fork.owner, self.branch)
    }
}

/// An open (or just closed) pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
}

/// Everything needed to open a cross-fork pull request.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub base: RepoRef,
    pub base_branch: String,
    pub head: PrHead,
    pub title: String,
    pub body: String,
}

/// A verdict a reviewer can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
}

impl ReviewEvent {
    /// Wire name used by the GitHub reviews API.
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one submitted review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
}

impl ReviewState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "APPROVED" | "APPROVE" => ReviewState::Approved,
            "CHANGES_REQUESTED" | "REQUEST_CHANGES" => ReviewState::ChangesRequested,
            "DISMISSED" => ReviewState::Dismissed,
            _ => ReviewState::Commented,
        }
    }
}

/// One review as reported by the provider, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub author: String,
    pub state: ReviewState,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// A hosting provider that can carry review shells for item branches.
///
/// One implementation per provider; callers pick one from the workspace's
/// provider type and only ever see this trait.
pub trait ReviewProvider: Send + Sync {
    /// Provider display name (for CLI output).
    fn name(&self) -> &str;

    /// Fail with a tool-missing error if the provider cannot be reached
    /// from this machine at all (e.g. its CLI is absent).
    fn ensure_available(&self) -> Result<()>;

    /// Make the fork branch carry `content` at `path` on top of fork main,
    /// creating or force-updating the branch. Providers whose branches are
    /// pushed by the database tool itself treat this as a no-op.
    fn publish_branch(
        &self,
        head: &PrHead,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()>;

    /// The open pull request into `base` whose head is `head`, if any.
    fn find_pr(&self, base: &RepoRef, head: &PrHead) -> Result<Option<PullRequest>>;

    fn create_pr(&self, request: &NewPullRequest) -> Result<PullRequest>;

    fn update_pr(&self, base: &RepoRef, number: u64, title: &str, body: &str) -> Result<()>;

    fn submit_review(
        &self,
        base: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<()>;

    fn list_reviews(&self, base: &RepoRef, number: u64) -> Result<Vec<Review>>;

    fn close_pr(&self, base: &RepoRef, number: u64) -> Result<()>;

    fn add_comment(&self, base: &RepoRef, number: u64, body: &str) -> Result<()>;

    /// Delete the head branch on the fork.
    fn delete_ref(&self, head: &PrHead) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_ref_parses_org_db() {
        let repo: RepoRef = "hop/commons".parse().unwrap();
        assert_eq!(repo, RepoRef::new("hop", "commons"));
        assert_eq!(repo.to_string(), "hop/commons");
        assert!("nodb".parse::<RepoRef>().is_err());
        assert!("a/b/c".parse::<RepoRef>().is_err());
        assert!("/b".parse::<RepoRef>().is_err());
    }

    #[test]
    fn head_renders_owner_colon_branch() {
        let head = PrHead::new(RepoRef::new("bob", "commons"), "wl/bob/w-1");
        assert_eq!(head.to_string(), "bob:wl/bob/w-1");
    }

    #[test]
    fn review_state_accepts_both_spellings() {
        assert_eq!(ReviewState::parse("APPROVED"), ReviewState::Approved);
        assert_eq!(
            ReviewState::parse("REQUEST_CHANGES"),
            ReviewState::ChangesRequested
        );
        assert_eq!(ReviewState::parse("COMMENTED"), ReviewState::Commented);
    }
}
