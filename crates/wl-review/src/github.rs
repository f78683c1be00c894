// github.rs — GitHub provider: review shells built from git objects.
//
// A wanted-board branch lives in the database, not in git, so a GitHub PR is
// only a shell that mirrors it. The shell branch is fork main plus one marker
// file (the rendered review summary), built through the git-object API:
//
//   fork HEAD → its tree → blob(marker) → tree(base + marker) → commit
//     → create or force-update refs/heads/<branch> → open/update the PR
//
// All calls go through a `GhTransport`. The default transport shells out to
// `gh api`, which handles authentication.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::{json, Value};

use crate::error::{Result, ReviewError};
use crate::provider::{
    NewPullRequest, PrHead, PullRequest, RepoRef, Review, ReviewEvent, ReviewProvider,
    ReviewState,
};

const PROVIDER: &str = "github";

const GH_HINT: &str =
    "install the GitHub CLI from https://cli.github.com and run `gh auth login`";

/// Sends one GitHub REST call and returns the decoded JSON response
/// (`Value::Null` for empty bodies).
pub trait GhTransport: Send + Sync {
    fn api(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value>;

    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }
}

/// Transport that runs `gh api`.
pub struct GhCli {
    binary: PathBuf,
}

impl GhCli {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("gh"),
        }
    }
}

impl Default for GhCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GhTransport for GhCli {
    fn ensure_available(&self) -> Result<()> {
        which::which(&self.binary)
            .map(|_| ())
            .map_err(|_| ReviewError::ToolMissing {
                tool: "gh".to_string(),
                hint: GH_HINT.to_string(),
            })
    }

    fn api(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("gh api -X {} {}", method, path);
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "api",
            "-X",
            method,
            path,
            "-H",
            "Accept: application/vnd.github+json",
        ]);
        if body.is_some() {
            cmd.args(["--input", "-"]).stdin(Stdio::piped());
        }
        let mut child = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ReviewError::ToolMissing {
                        tool: "gh".to_string(),
                        hint: GH_HINT.to_string(),
                    }
                } else {
                    ReviewError::Io(e)
                }
            })?;

        if let Some(body) = body {
            let mut stdin = child.stdin.take().ok_or_else(|| ReviewError::Response {
                provider: PROVIDER,
                reason: "gh stdin unavailable".to_string(),
            })?;
            stdin.write_all(&serde_json::to_vec(body)?)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ReviewError::Api {
                provider: PROVIDER,
                call: format!("{} {}", method, path),
                message: stderr,
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&stdout)?)
    }
}

fn is_not_found(err: &ReviewError) -> bool {
    matches!(err, ReviewError::Api { message, .. }
        if message.contains("404") || message.contains("Not Found"))
}

fn field<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value> {
    value.pointer(pointer).ok_or_else(|| ReviewError::Response {
        provider: PROVIDER,
        reason: format!("missing {}", pointer),
    })
}

fn str_field(value: &Value, pointer: &str) -> Result<String> {
    field(value, pointer)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ReviewError::Response {
            provider: PROVIDER,
            reason: format!("{} is not a string", pointer),
        })
}

fn pull_from(value: &Value) -> Result<PullRequest> {
    Ok(PullRequest {
        number: field(value, "/number")?
            .as_u64()
            .ok_or_else(|| ReviewError::Response {
                provider: PROVIDER,
                reason: "pull number is not an integer".to_string(),
            })?,
        url: str_field(value, "/html_url")?,
    })
}

/// GitHub [`ReviewProvider`].
pub struct GitHubProvider<T: GhTransport = GhCli> {
    transport: T,
}

impl GitHubProvider<GhCli> {
    pub fn new() -> Self {
        Self::with_transport(GhCli::new())
    }
}

impl Default for GitHubProvider<GhCli> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: GhTransport> GitHubProvider<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ── git-object primitives ──────────────────────────────────────

    /// Commit sha a branch points at, or `None` if the branch is absent.
    pub fn get_ref(&self, repo: &RepoRef, branch: &str) -> Result<Option<String>> {
        match self
            .transport
            .api("GET", &format!("repos/{}/git/ref/heads/{}", repo, branch), None)
        {
            Ok(v) => Ok(Some(str_field(&v, "/object/sha")?)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_commit_tree(&self, repo: &RepoRef, commit: &str) -> Result<String> {
        let v = self
            .transport
            .api("GET", &format!("repos/{}/git/commits/{}", repo, commit), None)?;
        str_field(&v, "/tree/sha")
    }

    pub fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String> {
        let body = json!({ "content": content, "encoding": "utf-8" });
        let v = self
            .transport
            .api("POST", &format!("repos/{}/git/blobs", repo), Some(&body))?;
        str_field(&v, "/sha")
    }

    /// A tree equal to `base_tree` with one extra (or replaced) file.
    pub fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        path: &str,
        blob: &str,
    ) -> Result<String> {
        let body = json!({
            "base_tree": base_tree,
            "tree": [{ "path": path, "mode": "100644", "type": "blob", "sha": blob }],
        });
        let v = self
            .transport
            .api("POST", &format!("repos/{}/git/trees", repo), Some(&body))?;
        str_field(&v, "/sha")
    }

    pub fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree: &str,
        parent: &str,
    ) -> Result<String> {
        let body = json!({ "message": message, "tree": tree, "parents": [parent] });
        let v = self
            .transport
            .api("POST", &format!("repos/{}/git/commits", repo), Some(&body))?;
        str_field(&v, "/sha")
    }

    pub fn create_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        self.transport
            .api("POST", &format!("repos/{}/git/refs", repo), Some(&body))
            .map(|_| ())
    }

    /// Force-move a branch to `sha`.
    pub fn update_ref(&self, repo: &RepoRef, branch: &str, sha: &str) -> Result<()> {
        let body = json!({ "sha": sha, "force": true });
        self.transport
            .api(
                "PATCH",
                &format!("repos/{}/git/refs/heads/{}", repo, branch),
                Some(&body),
            )
            .map(|_| ())
    }
}

impl<T: GhTransport> ReviewProvider for GitHubProvider<T> {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn ensure_available(&self) -> Result<()> {
        self.transport.ensure_available()
    }

    fn publish_branch(
        &self,
        head: &PrHead,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()> {
        let fork = &head.fork;
        let base_commit = self
            .get_ref(fork, "main")?
            .ok_or_else(|| ReviewError::Api {
                provider: PROVIDER,
                call: format!("GET repos/{}/git/ref/heads/main", fork),
                message: "fork has no main branch".to_string(),
            })?;
        let base_tree = self.get_commit_tree(fork, &base_commit)?;
        let blob = self.create_blob(fork, content)?;
        let tree = self.create_tree(fork, &base_tree, path, &blob)?;
        let commit = self.create_commit(fork, message, &tree, &base_commit)?;

        if self.get_ref(fork, &head.branch)?.is_some() {
            self.update_ref(fork, &head.branch, &commit)?;
        } else {
            self.create_ref(fork, &head.branch, &commit)?;
        }
        tracing::debug!("shell branch {} now at {}", head, commit);
        Ok(())
    }

    fn find_pr(&self, base: &RepoRef, head: &PrHead) -> Result<Option<PullRequest>> {
        let v = self.transport.api(
            "GET",
            &format!("repos/{}/pulls?state=open&head={}", base, head),
            None,
        )?;
        match v.as_array().and_then(|pulls| pulls.first()) {
            Some(pull) => Ok(Some(pull_from(pull)?)),
            None => Ok(None),
        }
    }

    fn create_pr(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let body = json!({
            "title": request.title,
            "head": request.head.to_string(),
            "base": request.base_branch,
            "body": request.body,
            "maintainer_can_modify": true,
        });
        let v = self.transport.api(
            "POST",
            &format!("repos/{}/pulls", request.base),
            Some(&body),
        )?;
        pull_from(&v)
    }

    fn update_pr(&self, base: &RepoRef, number: u64, title: &str, body: &str) -> Result<()> {
        let payload = json!({ "title": title, "body": body });
        self.transport
            .api(
                "PATCH",
                &format!("repos/{}/pulls/{}", base, number),
                Some(&payload),
            )
            .map(|_| ())
    }

    fn submit_review(
        &self,
        base: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<()> {
        let payload = json!({ "event": event.as_str(), "body": body });
        self.transport
            .api(
                "POST",
                &format!("repos/{}/pulls/{}/reviews", base, number),
                Some(&payload),
            )
            .map(|_| ())
    }

    fn list_reviews(&self, base: &RepoRef, number: u64) -> Result<Vec<Review>> {
        let v = self.transport.api(
            "GET",
            &format!("repos/{}/pulls/{}/reviews", base, number),
            None,
        )?;
        let reviews = v.as_array().cloned().unwrap_or_default();
        reviews
            .iter()
            .map(|r| {
                Ok(Review {
                    author: str_field(r, "/user/login")?,
                    state: ReviewState::parse(&str_field(r, "/state")?),
                    submitted_at: r
                        .get("submitted_at")
                        .and_then(|s| s.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|d| d.with_timezone(&chrono::Utc)),
                })
            })
            .collect()
    }

    fn close_pr(&self, base: &RepoRef, number: u64) -> Result<()> {
        let payload = json!({ "state": "closed" });
        self.transport
            .api(
                "PATCH",
                &format!("repos/{}/pulls/{}", base, number),
                Some(&payload),
            )
            .map(|_| ())
    }

    fn add_comment(&self, base: &RepoRef, number: u64, body: &str) -> Result<()> {
        let payload = json!({ "body": body });
        self.transport
            .api(
                "POST",
                &format!("repos/{}/issues/{}/comments", base, number),
                Some(&payload),
            )
            .map(|_| ())
    }

    fn delete_ref(&self, head: &PrHead) -> Result<()> {
        self.transport
            .api(
                "DELETE",
                &format!("repos/{}/git/refs/heads/{}", head.fork, head.branch),
                None,
            )
            .map(|_| ())
    }
}
