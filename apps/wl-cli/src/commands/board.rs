// board.rs — Item lifecycle commands: post through close.

use clap::Args;
use wl_board::{EffortLevel, ItemType, ItemUpdate, NewItem, Severity, StampInput};
use wl_workspace::Outcome;

use super::print_warnings;
use super::session::Session;

#[derive(Args)]
pub struct PostArgs {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long)]
    project: Option<String>,
    /// feature, bug, design, rfc, docs, research or community.
    #[arg(long = "type", default_value = "feature")]
    item_type: ItemType,
    /// 0 (highest) to 4.
    #[arg(long, default_value_t = 2)]
    priority: u8,
    /// trivial, small, medium, large or epic.
    #[arg(long, default_value = "medium")]
    effort: EffortLevel,
    /// Comma-separated.
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    project: Option<String>,
    #[arg(long = "type")]
    item_type: Option<ItemType>,
    #[arg(long)]
    priority: Option<u8>,
    #[arg(long)]
    effort: Option<EffortLevel>,
    /// Replaces all tags. Comma-separated.
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,
}

#[derive(Args)]
pub struct AcceptArgs {
    id: String,
    /// 1 to 5.
    #[arg(long)]
    quality: u8,
    /// 1 to 5; defaults to the quality rating.
    #[arg(long)]
    reliability: Option<u8>,
    /// leaf, branch or root.
    #[arg(long, default_value = "leaf")]
    severity: Severity,
    /// Comma-separated skills the work demonstrated.
    #[arg(long, value_delimiter = ',')]
    skills: Vec<String>,
    #[arg(long)]
    message: Option<String>,
}

fn report(verb: &str, outcome: &Outcome) {
    println!("{} {} ({})", verb, outcome.item.id, outcome.item.status);
    if let Some(branch) = &outcome.branch {
        println!("  branch: {}", branch);
    }
    if outcome.push.skipped() {
        println!("  not pushed (--no-push)");
    }
    for pushed in &outcome.push.pushed {
        println!("  pushed {}", pushed);
    }
    if let Some(pr) = &outcome.push.review {
        println!("  review updated: {}", pr.url);
    }
    if let Some(hint) = outcome.push.hint() {
        println!("  {}", hint);
    }
    print_warnings(&outcome.warnings);
}

pub fn post(commons: Option<&str>, no_push: bool, args: PostArgs) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let input = NewItem {
        title: args.title,
        description: args.description,
        project: args.project,
        item_type: args.item_type,
        priority: args.priority,
        effort_level: args.effort,
        tags: args.tags,
    };
    let outcome = session.board(no_push).post(input)?;
    report("Posted", &outcome);
    Ok(())
}

pub fn claim(commons: Option<&str>, no_push: bool, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    report("Claimed", &session.board(no_push).claim(id)?);
    Ok(())
}

pub fn unclaim(commons: Option<&str>, no_push: bool, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    report("Released", &session.board(no_push).unclaim(id)?);
    Ok(())
}

pub fn update(commons: Option<&str>, no_push: bool, args: UpdateArgs) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let change = ItemUpdate {
        title: args.title,
        description: args.description,
        project: args.project,
        item_type: args.item_type,
        priority: args.priority,
        effort_level: args.effort,
        tags: args.tags,
    };
    report("Updated", &session.board(no_push).update(&args.id, change)?);
    Ok(())
}

pub fn delete(commons: Option<&str>, no_push: bool, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    report("Withdrew", &session.board(no_push).delete(id)?);
    Ok(())
}

pub fn done(commons: Option<&str>, no_push: bool, id: &str, evidence: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let outcome = session.board(no_push).done(id, evidence)?;
    report("Submitted", &outcome);
    if let Some(completion) = &outcome.completion {
        println!("  completion: {}", completion.id);
    }
    Ok(())
}

pub fn accept(commons: Option<&str>, no_push: bool, args: AcceptArgs) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let input = StampInput {
        quality: args.quality,
        reliability: args.reliability.unwrap_or(args.quality),
        severity: args.severity,
        skill_tags: args.skills,
        message: args.message,
    };
    let outcome = session.board(no_push).accept(&args.id, input)?;
    report("Accepted", &outcome);
    if let Some(stamp) = &outcome.stamp {
        println!(
            "  stamp {} for {}: quality {}, reliability {} ({})",
            stamp.id, stamp.subject, stamp.quality, stamp.reliability, stamp.severity
        );
    }
    Ok(())
}

pub fn reject(
    commons: Option<&str>,
    no_push: bool,
    id: &str,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    report("Rejected", &session.board(no_push).reject(id, reason)?);
    Ok(())
}

pub fn close(commons: Option<&str>, no_push: bool, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    report("Closed", &session.board(no_push).close(id)?);
    Ok(())
}
