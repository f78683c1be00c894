//! # wl-cli
//!
//! Command-line interface for the wanted board of a joined commons.
//!
//! - `wl join/leave` — record or forget a commons and its local fork clone
//! - `wl post/claim/unclaim/update/delete/done/accept/reject/close` — item
//!   lifecycle, applied to main (wild-west) or the item branch (pr)
//! - `wl review/approve/request-changes/merge` — review shells for item
//!   branches
//! - `wl status/mine/sync` — where items stand, and catching up
//!
//! Every mutating command takes `--no-push` to commit locally only.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{board, review, workspace};

/// Wanted board CLI — post, claim and review work on a shared commons.
#[derive(Parser)]
#[command(name = "wl", version, about)]
struct Cli {
    /// Joined commons to act on (`org/db`); needed when several are joined.
    #[arg(long, global = true)]
    commons: Option<String>,

    /// Commit locally and skip every push and provider call.
    #[arg(long, global = true)]
    no_push: bool,

    /// Debug logging for the wl crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a commons: clone your fork and record the workspace.
    Join(workspace::JoinArgs),
    /// Forget a joined commons (the local clone is left in place).
    Leave {
        /// Commons to leave (`org/db`).
        upstream: String,
    },
    /// Post a new wanted item.
    Post(board::PostArgs),
    /// Claim an open item.
    Claim {
        id: String,
    },
    /// Release a claim (claimer or poster).
    Unclaim {
        id: String,
    },
    /// Change fields of an open item.
    Update(board::UpdateArgs),
    /// Withdraw an open item.
    Delete {
        id: String,
    },
    /// Submit evidence for an item you claimed.
    Done {
        id: String,
        /// Link or description of the finished work.
        #[arg(long)]
        evidence: String,
    },
    /// Accept a completion and stamp the rig that did it (poster only).
    Accept(board::AcceptArgs),
    /// Send an item in review back to its claimer (poster only).
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Complete an item in review without a stamp (poster only).
    Close {
        id: String,
    },
    /// Push your item branch and open or update its review.
    Review {
        id: String,
    },
    /// Approve the review of an item branch.
    Approve(review::VerdictArgs),
    /// Request changes on the review of an item branch.
    RequestChanges(review::ChangesArgs),
    /// Merge an item branch into main and close its review.
    Merge(review::MergeArgs),
    /// Show where an item stands on canonical, fork and branches.
    Status {
        id: String,
    },
    /// List items you posted or hold.
    Mine,
    /// Pull canonical into local main.
    Sync {
        /// Also retry pushing local main.
        #[arg(long)]
        push: bool,
    },
    /// Open item ids for shell completion.
    #[command(hide = true)]
    CompleteIds {
        #[arg(default_value = "")]
        prefix: String,
    },
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        for krate in ["wl_board", "wl_store", "wl_review", "wl_workspace", "wl"] {
            filter = filter.add_directive(format!("{}=debug", krate).parse()?);
        }
    }
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let commons = cli.commons.as_deref();
    let no_push = cli.no_push;

    match cli.command {
        Commands::Join(args) => workspace::join(&args),
        Commands::Leave { upstream } => workspace::leave(&upstream),
        Commands::Post(args) => board::post(commons, no_push, args),
        Commands::Claim { id } => board::claim(commons, no_push, &id),
        Commands::Unclaim { id } => board::unclaim(commons, no_push, &id),
        Commands::Update(args) => board::update(commons, no_push, args),
        Commands::Delete { id } => board::delete(commons, no_push, &id),
        Commands::Done { id, evidence } => board::done(commons, no_push, &id, &evidence),
        Commands::Accept(args) => board::accept(commons, no_push, args),
        Commands::Reject { id, reason } => {
            board::reject(commons, no_push, &id, reason.as_deref())
        }
        Commands::Close { id } => board::close(commons, no_push, &id),
        Commands::Review { id } => review::open(commons, no_push, &id),
        Commands::Approve(args) => review::approve(commons, no_push, &args),
        Commands::RequestChanges(args) => review::request_changes(commons, no_push, &args),
        Commands::Merge(args) => review::merge(commons, no_push, &args),
        Commands::Status { id } => workspace::status(commons, &id),
        Commands::Mine => workspace::mine(commons),
        Commands::Sync { push } => workspace::sync(commons, push && !no_push),
        Commands::CompleteIds { prefix } => {
            workspace::complete_ids(commons, &prefix);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let Some(hint) = commands::hint_for(&e) {
                eprintln!("hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
