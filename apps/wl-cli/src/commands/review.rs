// review.rs — Review shell commands: review, approve, request-changes, merge.

use clap::Args;
use wl_review::ReviewEvent;
use wl_workspace::{Board, BranchOwner};

use super::print_warnings;
use super::session::Session;

/// Whose item branch to act on; defaults to your own.
#[derive(Args, Debug)]
pub struct OwnerArgs {
    /// Rig that worked the item.
    #[arg(long)]
    pub rig: Option<String>,
    /// Org holding that rig's fork; defaults to the rig handle.
    #[arg(long, requires = "rig")]
    pub fork_org: Option<String>,
}

impl OwnerArgs {
    fn resolve(&self, board: &Board<'_>) -> BranchOwner {
        match &self.rig {
            Some(rig) => BranchOwner::new(rig, self.fork_org.clone()),
            None => board.own_branch(),
        }
    }
}

#[derive(Args, Debug)]
pub struct VerdictArgs {
    pub id: String,
    #[command(flatten)]
    pub owner: OwnerArgs,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChangesArgs {
    pub id: String,
    #[command(flatten)]
    pub owner: OwnerArgs,
    /// What needs to change.
    #[arg(long)]
    pub comment: String,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    pub id: String,
    #[command(flatten)]
    pub owner: OwnerArgs,
}

pub fn open(commons: Option<&str>, no_push: bool, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let outcome = session.board(no_push).open_review(id)?;
    match &outcome.pr {
        Some(pr) if outcome.created => println!("Opened review for {}: {}", outcome.branch, pr.url),
        Some(pr) => println!("Updated review for {}: {}", outcome.branch, pr.url),
        None => println!("Review for {} not opened (--no-push)", outcome.branch),
    }
    print_warnings(&outcome.warnings);
    Ok(())
}

fn submit(
    commons: Option<&str>,
    no_push: bool,
    id: &str,
    owner: &OwnerArgs,
    event: ReviewEvent,
    body: &str,
) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let board = session.board(no_push);
    let owner = owner.resolve(&board);
    match board.submit_review(id, &owner, event, body)? {
        Some(pr) => println!("Submitted {} on {}", event, pr.url),
        None => println!("Review not submitted (--no-push)"),
    }
    Ok(())
}

pub fn approve(commons: Option<&str>, no_push: bool, args: &VerdictArgs) -> anyhow::Result<()> {
    let body = args.comment.as_deref().unwrap_or("Approved.");
    submit(
        commons,
        no_push,
        &args.id,
        &args.owner,
        ReviewEvent::Approve,
        body,
    )
}

pub fn request_changes(
    commons: Option<&str>,
    no_push: bool,
    args: &ChangesArgs,
) -> anyhow::Result<()> {
    submit(
        commons,
        no_push,
        &args.id,
        &args.owner,
        ReviewEvent::RequestChanges,
        &args.comment,
    )
}

pub fn merge(commons: Option<&str>, no_push: bool, args: &MergeArgs) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let board = session.board(no_push);
    let owner = args.owner.resolve(&board);
    let outcome = board.merge(&args.id, &owner)?;

    println!(
        "Merged {} into main ({} is {})",
        outcome.branch, outcome.item.id, outcome.item.status
    );
    if let Some(gate) = &outcome.gate {
        if !gate.approvals.is_empty() {
            println!("  approved by {}", gate.approvals.join(", "));
        }
    }
    if outcome.push.skipped() {
        println!("  not pushed (--no-push)");
    }
    for pushed in &outcome.push.pushed {
        println!("  pushed {}", pushed);
    }
    if let Some(hint) = outcome.push.hint() {
        println!("  {}", hint);
    }
    if let Some(pr) = &outcome.closed {
        println!("  closed review {}", pr.url);
    }
    print_warnings(&outcome.warnings);
    Ok(())
}
