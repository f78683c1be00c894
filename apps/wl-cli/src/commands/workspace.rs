// workspace.rs — Joining and leaving a commons, status views, sync.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use wl_review::RepoRef;
use wl_store::DoltStore;
use wl_workspace::{
    config_dir, registry_path, ProviderType, WorkflowMode, WorkspaceConfig, WorkspaceError,
    WorkspaceRegistry,
};

use super::print_warnings;
use super::session::Session;

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Canonical commons, `org/db`.
    pub upstream: String,
    /// Your rig handle on the board.
    #[arg(long)]
    pub handle: String,
    /// Org holding your fork; defaults to the handle.
    #[arg(long = "fork")]
    pub fork_org: Option<String>,
    /// Local clone directory; cloned there when it does not exist.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// wild-west or pr.
    #[arg(long, default_value = "wild-west")]
    pub mode: WorkflowMode,
    /// github or dolthub.
    #[arg(long, default_value = "github")]
    pub provider: ProviderType,
    /// Sign database commits.
    #[arg(long)]
    pub signing: bool,
}

impl JoinArgs {
    fn workspace(&self, default_dir: &Path) -> anyhow::Result<WorkspaceConfig> {
        let repo: RepoRef = self.upstream.parse()?;
        let fork_org = self.fork_org.clone().unwrap_or_else(|| self.handle.clone());
        let dir = self
            .dir
            .clone()
            .unwrap_or_else(|| default_dir.join(&repo.owner).join(&repo.name));
        let mut config =
            WorkspaceConfig::new(&self.upstream, fork_org, &repo.name, dir, &self.handle)
                .with_mode(self.mode);
        config.provider = self.provider;
        config.signing = self.signing;
        config.validate()?;
        Ok(config)
    }
}

pub fn join(args: &JoinArgs) -> anyhow::Result<()> {
    let clones = config_dir()?.join("clones");
    join_into(&registry_path()?, &clones, args, |config| {
        let fork = format!("{}/{}", config.fork_org, config.fork_db);
        println!("Cloning {} into {}", fork, config.local_dir.display());
        DoltStore::clone_fork(&fork, &config.upstream, &config.local_dir)?;
        Ok(())
    })
}

fn join_into(
    registry_file: &Path,
    clones: &Path,
    args: &JoinArgs,
    clone: impl FnOnce(&WorkspaceConfig) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut registry = WorkspaceRegistry::load(registry_file)?;
    let config = args.workspace(clones)?;
    if registry.workspaces.contains_key(&config.upstream) {
        return Err(WorkspaceError::AlreadyJoined(config.upstream).into());
    }
    if !config.local_dir.exists() {
        clone(&config)?;
    }

    println!(
        "Joined {} as {} ({} mode, {} reviews)",
        config.upstream, config.rig_handle, config.mode, config.provider
    );
    registry.join(config)?;
    registry
        .save(registry_file)
        .with_context(|| format!("writing {}", registry_file.display()))?;
    Ok(())
}

pub fn leave(upstream: &str) -> anyhow::Result<()> {
    leave_from(&registry_path()?, upstream)
}

fn leave_from(registry_file: &Path, upstream: &str) -> anyhow::Result<()> {
    let mut registry = WorkspaceRegistry::load(registry_file)?;
    let config = registry.leave(upstream)?;
    registry.save(registry_file)?;
    println!(
        "Left {}; the clone at {} was not removed",
        upstream,
        config.local_dir.display()
    );
    Ok(())
}

pub fn status(commons: Option<&str>, id: &str) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let location = session.board(true).status(id)?;

    match location.effective_status() {
        Some(status) => println!("{}: {}", id, status),
        None => println!("{}: not found", id),
    }
    println!("  canonical ({}): {}", location.canonical_ref, location.canonical);
    println!("  fork: {}", location.fork);
    for b in &location.branches {
        let note = if b.local_only { " (not pushed)" } else { "" };
        println!("  {}: {}{}", b.branch, b.observation, note);
    }
    if location.is_fork_only() {
        println!("  only on your fork so far");
    }
    if let Some(stale) =
        location.stale_claim(chrono::Utc::now(), session.config.stale_after_days)
    {
        println!("  {}", stale);
    }
    Ok(())
}

pub fn mine(commons: Option<&str>) -> anyhow::Result<()> {
    let session = Session::open(commons)?;
    let rig = session.config.rig_handle.clone();
    let entries = session.board(true).mine()?;
    if entries.is_empty() {
        println!("No items posted or held by {}.", rig);
        return Ok(());
    }

    println!("{:<14} {:<10} {:<8} {:<20} TITLE", "ID", "STATUS", "ROLE", "SOURCE");
    for entry in &entries {
        let item = &entry.item;
        let posted = item.posted_by == rig;
        let holds = item.claimed_by.as_deref() == Some(rig.as_str());
        let role = match (posted, holds) {
            (true, true) => "both",
            (true, false) => "poster",
            _ => "claimer",
        };
        println!(
            "{:<14} {:<10} {:<8} {:<20} {}",
            item.id,
            item.status.as_str(),
            role,
            entry.source.to_string(),
            item.title
        );
    }
    Ok(())
}

pub fn sync(commons: Option<&str>, push: bool) -> anyhow::Result<()> {
    let mut session = Session::open(commons)?;
    let report = session.board(false).sync(push)?;
    println!("Synced {} into local main", session.config.upstream);
    for pushed in &report.pushed {
        println!("  pushed {}", pushed);
    }
    print_warnings(&report.warnings);
    session.touch_sync()?;
    Ok(())
}

/// Prints matching ids one per line; prints nothing on any failure.
pub fn complete_ids(commons: Option<&str>, prefix: &str) {
    let ids = Session::open(commons).and_then(|s| Ok(s.board(true).suggest_ids(prefix)?));
    match ids {
        Ok(ids) => {
            for id in ids {
                println!("{}", id);
            }
        }
        Err(e) => tracing::debug!("completion lookup failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: JoinArgs,
    }

    fn args(argv: &[&str]) -> JoinArgs {
        let argv = std::iter::once("wl-join").chain(argv.iter().copied());
        Wrapper::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn join_records_workspace_without_cloning_existing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = tmp.path().join("workspaces.toml");
        let clone_dir = tmp.path().join("clone");
        std::fs::create_dir_all(&clone_dir).unwrap();

        let join = args(&[
            "hop/commons",
            "--handle",
            "bob",
            "--dir",
            clone_dir.to_str().unwrap(),
            "--mode",
            "pr",
        ]);
        join_into(&registry, tmp.path(), &join, |_| panic!("should not clone")).unwrap();

        let loaded = WorkspaceRegistry::load(&registry).unwrap();
        let config = loaded.resolve(None).unwrap();
        assert_eq!(config.fork_org, "bob");
        assert_eq!(config.fork_db, "commons");
        assert_eq!(config.mode, WorkflowMode::Pr);
        assert_eq!(config.local_dir, clone_dir);

        let again = join_into(&registry, tmp.path(), &join, |_| Ok(()));
        assert!(again.is_err());

        leave_from(&registry, "hop/commons").unwrap();
        let loaded = WorkspaceRegistry::load(&registry).unwrap();
        assert!(loaded.workspaces.is_empty());
    }

    #[test]
    fn join_clones_missing_dir_under_default_location() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = tmp.path().join("workspaces.toml");
        let join = args(&["hop/commons", "--handle", "bob", "--fork", "bob-labs"]);

        let mut cloned = None;
        join_into(&registry, tmp.path(), &join, |config| {
            cloned = Some(config.local_dir.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(cloned.unwrap(), tmp.path().join("hop").join("commons"));
        let loaded = WorkspaceRegistry::load(&registry).unwrap();
        assert_eq!(loaded.resolve(Some("hop/commons")).unwrap().fork_org, "bob-labs");
    }

    #[test]
    fn failed_clone_records_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = tmp.path().join("workspaces.toml");
        let join = args(&["hop/commons", "--handle", "bob"]);

        let err = join_into(&registry, tmp.path(), &join, |_| anyhow::bail!("dolt missing"));
        assert!(err.is_err());
        assert!(!registry.exists());
    }
}
