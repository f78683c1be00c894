// dolt.rs — Database backend that drives the `dolt` CLI in a local clone.
//
// Every operation is one or more blocking `dolt` subprocess calls run in the
// clone directory. Reads use `dolt sql -r json`; point-in-time reads use
// `AS OF '<ref>'` with remote-tracking refs written as `remote/branch`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use wl_board::{CompletionRecord, ItemStatus, Stamp, WorkItem};

use crate::diff::{DiffSummary, TableDiff};
use crate::error::{Result, StoreError};
use crate::progress::{forward_lines, ProgressSink};
use crate::sql::{self, quote, Row};
use crate::store::{
    peer_remote, tracking_ref, BranchRef, Database, ItemFilter, MAIN, ORIGIN, UPSTREAM,
};

const INSTALL_HINT: &str =
    "install dolt from https://docs.dolthub.com/introduction/installation and make sure it is on PATH";

/// How often a time-bounded query polls its child process.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Dolt-backed [`Database`] for one clone directory.
pub struct DoltStore {
    dir: PathBuf,
    binary: PathBuf,
    sign_commits: bool,
}

impl DoltStore {
    /// Open the clone at `dir`, running `dolt` from PATH.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            binary: PathBuf::from("dolt"),
            sign_commits: false,
        }
    }

    /// Use a specific `dolt` binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sign every commit this store makes.
    pub fn with_signing(mut self, sign: bool) -> Self {
        self.sign_commits = sign;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Clone the fork (an `org/db` path on the remote host) into `dir` and
    /// add `upstream` when the fork is not the canonical database itself.
    pub fn clone_fork(fork_path: &str, upstream_path: &str, dir: &Path) -> Result<Self> {
        let store = Self::new(dir);
        store.ensure_available()?;
        let parent = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let target = dir.to_string_lossy().to_string();
        run(&store.binary, parent, &["clone", fork_path, &target])?;
        if fork_path != upstream_path {
            store.dolt(&["remote", "add", UPSTREAM, upstream_path])?;
        }
        Ok(store)
    }

    /// Run `dolt` with `args` in the clone directory.
    fn dolt(&self, args: &[&str]) -> Result<String> {
        run(&self.binary, &self.dir, args).map(|(stdout, _)| stdout)
    }

    /// Like [`dolt`](Self::dolt) but also returns stderr, where dolt writes
    /// push progress.
    fn dolt_with_progress(&self, args: &[&str], progress: &mut dyn ProgressSink) -> Result<()> {
        let (stdout, stderr) = run(&self.binary, &self.dir, args)?;
        forward_lines(&stderr, progress);
        forward_lines(&stdout, progress);
        Ok(())
    }

    fn query(&self, query: &str) -> Result<Vec<Row>> {
        let stdout = self.dolt(&["sql", "-r", "json", "-q", query])?;
        sql::parse_rows(&stdout)
    }

    fn exec(&self, statement: &str) -> Result<()> {
        self.dolt(&["sql", "-q", statement]).map(|_| ())
    }

    fn count(&self, query: &str) -> Result<u64> {
        let rows = self.query(query)?;
        let n = rows
            .first()
            .and_then(|r| r.get("n"))
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);
        Ok(n)
    }

    /// Run a read-only query, killing the child if it outlives `timeout`.
    /// Output is drained on reader threads so a large result cannot fill the
    /// pipe and stall the child.
    fn query_with_timeout(&self, query: &str, timeout: Duration) -> Result<Vec<Row>> {
        let args = ["sql", "-r", "json", "-q", query];
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.binary, e))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StoreError::Timeout {
                    command: describe(&self.binary, &args),
                    after: timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        if !status.success() {
            return Err(StoreError::CommandFailed {
                command: describe(&self.binary, &args),
                stderr: stderr.trim().to_string(),
            });
        }
        sql::parse_rows(&stdout)
    }

    fn ensure_remote(&self, remote: &str) -> Result<()> {
        if !self.has_remote(remote)? {
            return Err(StoreError::RemoteMissing(remote.to_string()));
        }
        Ok(())
    }
}

/// Read a child pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                tracing::debug!("reading child output failed: {}", e);
            }
            buf
        })
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn describe(binary: &Path, args: &[&str]) -> String {
    format!("{} {}", binary.display(), args.join(" "))
}

fn spawn_error(binary: &Path, e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StoreError::ToolMissing {
            tool: binary.display().to_string(),
            hint: INSTALL_HINT.to_string(),
        }
    } else {
        StoreError::Io(e)
    }
}

fn run(binary: &Path, dir: &Path, args: &[&str]) -> Result<(String, String)> {
    tracing::debug!("running {}", describe(binary, args));
    let output = Command::new(binary)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| spawn_error(binary, e))?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(StoreError::CommandFailed {
            command: describe(binary, args),
            stderr: if stderr.is_empty() { stdout } else { stderr },
        });
    }
    Ok((stdout, stderr))
}

impl Database for DoltStore {
    fn name(&self) -> &str {
        "dolt"
    }

    fn ensure_available(&self) -> Result<()> {
        which::which(&self.binary)
            .map(|_| ())
            .map_err(|_| StoreError::ToolMissing {
                tool: self.binary.display().to_string(),
                hint: INSTALL_HINT.to_string(),
            })
    }

    fn has_remote(&self, remote: &str) -> Result<bool> {
        let n = self.count(&format!(
            "SELECT COUNT(*) AS n FROM dolt_remotes WHERE name = {}",
            quote(remote)
        ))?;
        Ok(n > 0)
    }

    fn fetch(&self, remote: &str) -> Result<()> {
        self.ensure_remote(remote)?;
        tracing::debug!("fetching {}", remote);
        self.dolt(&["fetch", remote]).map(|_| ())
    }

    fn fetch_peer_branch(&self, fork_org: &str, fork_path: &str, branch: &str) -> Result<String> {
        let remote = peer_remote(fork_org);
        if !self.has_remote(&remote)? {
            tracing::info!("adding remote {} for {}", remote, fork_path);
            self.dolt(&["remote", "add", &remote, fork_path])?;
        }
        tracing::debug!("fetching {} from {}", branch, remote);
        self.dolt(&["fetch", &remote, branch])?;
        Ok(tracking_ref(&remote, branch))
    }

    fn sync(&self) -> Result<()> {
        if !self.has_remote(UPSTREAM)? {
            tracing::debug!("no upstream remote; nothing to sync");
            return Ok(());
        }
        tracing::info!("pulling {}/{}", UPSTREAM, MAIN);
        let out = self.dolt(&["pull", UPSTREAM, MAIN])?;
        if out.contains("CONFLICT") {
            return Err(StoreError::MergeConflict(format!("{}/{}", UPSTREAM, MAIN)));
        }
        Ok(())
    }

    fn push_main(&self, remote: &str, progress: &mut dyn ProgressSink) -> Result<()> {
        self.ensure_remote(remote)?;
        tracing::info!("pushing {} to {}", MAIN, remote);
        self.dolt_with_progress(&["push", remote, MAIN], progress)
    }

    fn push_branch(&self, name: &str, progress: &mut dyn ProgressSink) -> Result<()> {
        self.ensure_remote(ORIGIN)?;
        tracing::info!("pushing {} to {}", name, ORIGIN);
        self.dolt_with_progress(&["push", "--force", ORIGIN, name], progress)
    }

    fn push_with_sync(&self, progress: &mut dyn ProgressSink) -> Result<()> {
        match self.push_main(UPSTREAM, progress) {
            Ok(()) => Ok(()),
            Err(StoreError::CommandFailed { stderr, .. }) => {
                tracing::warn!("push to {} rejected ({}); pulling and retrying", UPSTREAM, stderr);
                self.sync()?;
                self.push_main(UPSTREAM, progress)
            }
            Err(e) => Err(e),
        }
    }

    fn current_branch(&self) -> Result<String> {
        let rows = self.query("SELECT active_branch() AS branch")?;
        rows.first()
            .and_then(|r| r.get("branch"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(StoreError::Parse {
                what: "active branch",
                reason: "no row returned".to_string(),
            })
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        if self.current_branch()? == name {
            return Ok(());
        }
        if self.branch_exists(name)? {
            self.dolt(&["checkout", name])?;
        } else {
            self.dolt(&["checkout", "-b", name])?;
        }
        Ok(())
    }

    fn checkout_main(&self) -> Result<()> {
        self.checkout_branch(MAIN)
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let n = self.count(&format!(
            "SELECT COUNT(*) AS n FROM dolt_branches WHERE name = {}",
            quote(name)
        ))?;
        Ok(n > 0)
    }

    fn list_branches(&self) -> Result<Vec<BranchRef>> {
        let mut out = Vec::new();
        for row in self.query("SELECT name FROM dolt_branches")? {
            if let Some(name) = row.get("name").and_then(|v| v.as_str()) {
                out.push(BranchRef::local(name));
            }
        }
        for row in self.query("SELECT name FROM dolt_remote_branches")? {
            let Some(full) = row.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            // Names look like `remotes/origin/wl/alice/w-1`.
            let trimmed = full.strip_prefix("remotes/").unwrap_or(full);
            if let Some((remote, branch)) = trimmed.split_once('/') {
                out.push(BranchRef::tracking(remote, branch));
            }
        }
        Ok(out)
    }

    fn merge_branch(&self, name: &str) -> Result<()> {
        tracing::info!("merging {}", name);
        let out = self.dolt(&["merge", name])?;
        if out.contains("CONFLICT") {
            return Err(StoreError::MergeConflict(name.to_string()));
        }
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.dolt(&["branch", "-D", name]).map(|_| ())
    }

    fn diff(&self, reference: &str) -> Result<DiffSummary> {
        let rows = self.query(&format!(
            "SELECT table_name, rows_added, rows_modified, rows_deleted \
             FROM dolt_diff_stat({}, {})",
            quote(MAIN),
            quote(reference)
        ))?;
        let num = |r: &Row, c: &str| -> u64 {
            r.get(c)
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(0)
        };
        let tables = rows
            .iter()
            .map(|r| TableDiff {
                table: r
                    .get("table_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                added: num(r, "rows_added"),
                modified: num(r, "rows_modified"),
                removed: num(r, "rows_deleted"),
            })
            .collect();
        Ok(DiffSummary {
            base: MAIN.to_string(),
            target: reference.to_string(),
            tables,
        })
    }

    fn ref_exists(&self, reference: &str) -> Result<bool> {
        if self.branch_exists(reference)? {
            return Ok(true);
        }
        let n = self.count(&format!(
            "SELECT COUNT(*) AS n FROM dolt_remote_branches WHERE name = {}",
            quote(&format!("remotes/{}", reference))
        ))?;
        Ok(n > 0)
    }

    fn item_as_of(&self, reference: &str, id: &str) -> Result<Option<WorkItem>> {
        let rows = self.query(&format!(
            "SELECT {} FROM wanted AS OF {} WHERE id = {}",
            sql::ITEM_COLUMNS,
            sql::as_of(reference),
            quote(id)
        ))?;
        rows.first().map(sql::item_from_row).transpose()
    }

    fn list_items(&self, reference: &str, filter: &ItemFilter) -> Result<Vec<WorkItem>> {
        let mut clauses = Vec::new();
        if let Some(status) = filter.status {
            clauses.push(format!("status = {}", quote(status.as_str())));
        }
        if let Some(rig) = &filter.involving {
            clauses.push(format!("(posted_by = {0} OR claimed_by = {0})", quote(rig)));
        }
        if let Some(prefix) = &filter.id_prefix {
            clauses.push(format!("id LIKE {}", quote(&format!("{}%", prefix))));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let rows = self.query(&format!(
            "SELECT {} FROM wanted AS OF {}{} ORDER BY priority, created_at",
            sql::ITEM_COLUMNS,
            sql::as_of(reference),
            where_clause
        ))?;
        rows.iter().map(sql::item_from_row).collect()
    }

    fn suggest_item_ids(&self, prefix: &str, timeout: Duration) -> Result<Vec<String>> {
        let rows = self.query_with_timeout(
            &format!(
                "SELECT id FROM wanted WHERE status = {} AND id LIKE {} ORDER BY id LIMIT 50",
                quote(ItemStatus::Open.as_str()),
                quote(&format!("{}%", prefix))
            ),
            timeout,
        )?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    fn item(&self, id: &str) -> Result<Option<WorkItem>> {
        let rows = self.query(&format!(
            "SELECT {} FROM wanted WHERE id = {}",
            sql::ITEM_COLUMNS,
            quote(id)
        ))?;
        rows.first().map(sql::item_from_row).transpose()
    }

    fn completion(&self, wanted_id: &str) -> Result<Option<CompletionRecord>> {
        let rows = self.query(&format!(
            "SELECT {} FROM completions WHERE wanted_id = {} ORDER BY completed_at DESC LIMIT 1",
            sql::COMPLETION_COLUMNS,
            quote(wanted_id)
        ))?;
        rows.first().map(sql::completion_from_row).transpose()
    }

    fn stamps_for(&self, subject: &str) -> Result<Vec<Stamp>> {
        let rows = self.query(&format!(
            "SELECT {} FROM stamps WHERE subject = {} ORDER BY created_at",
            sql::STAMP_COLUMNS,
            quote(subject)
        ))?;
        rows.iter().map(sql::stamp_from_row).collect()
    }

    fn insert_item(&self, item: &WorkItem) -> Result<()> {
        self.exec(&sql::insert_item(item)?)
    }

    fn update_item(&self, item: &WorkItem) -> Result<()> {
        if self.item(&item.id)?.is_none() {
            return Err(StoreError::RowNotFound(item.id.clone()));
        }
        self.exec(&sql::update_item(item)?)
    }

    fn insert_completion(&self, completion: &CompletionRecord) -> Result<()> {
        self.exec(&sql::insert_completion(completion))
    }

    fn update_completion(&self, completion: &CompletionRecord) -> Result<()> {
        self.exec(&sql::update_completion(completion))
    }

    fn delete_completion(&self, wanted_id: &str) -> Result<()> {
        self.exec(&format!(
            "DELETE FROM completions WHERE wanted_id = {}",
            quote(wanted_id)
        ))
    }

    fn insert_stamp(&self, stamp: &Stamp) -> Result<()> {
        self.exec(&sql::insert_stamp(stamp)?)
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.dolt(&["add", "."])?;
        let mut args = vec!["commit", "-m", message];
        if self.sign_commits {
            args.push("-S");
        }
        self.dolt(&args).map(|_| ())
    }
}
