// testing.rs — In-memory GitHub stand-in for tests.
//
// `FakeGitHub` implements `GhTransport` against a small model of the REST
// endpoints the GitHub provider uses: git refs/blobs/trees/commits, pulls,
// reviews and issue comments. Clones share state, so a test can keep a handle
// while the provider owns the transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};

use crate::error::{Result, ReviewError};
use crate::github::GhTransport;
use crate::provider::RepoRef;

/// One pull request as the fake records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakePull {
    pub repo: String,
    pub number: u64,
    pub head: String,
    pub base_branch: String,
    pub title: String,
    pub body: String,
    pub open: bool,
    /// `(login, state)` in submission order.
    pub reviews: Vec<(String, String)>,
    pub comments: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    user: String,
    next_id: u64,
    next_pull: u64,
    refs: BTreeMap<(String, String), String>,
    commits: HashMap<String, String>,
    pulls: Vec<FakePull>,
    calls: Vec<String>,
    failures: Vec<String>,
}

impl FakeState {
    fn mint(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{}{:04}", kind, self.next_id)
    }
}

#[derive(Clone)]
pub struct FakeGitHub {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeGitHub {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(call: &str) -> ReviewError {
    ReviewError::Api {
        provider: "github",
        call: call.to_string(),
        message: "gh: Not Found (HTTP 404)".to_string(),
    }
}

fn body_str(body: Option<&Value>, key: &str) -> String {
    body.and_then(|b| b.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn review_state(event: &str) -> &'static str {
    match event {
        "APPROVE" => "APPROVED",
        "REQUEST_CHANGES" => "CHANGES_REQUESTED",
        _ => "COMMENTED",
    }
}

impl FakeGitHub {
    pub fn new() -> Self {
        let state = FakeState {
            user: "reviewer".to_string(),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Give `repo` a `main` branch with one commit.
    pub fn seed_repo(&self, repo: &RepoRef) {
        let mut state = self.lock();
        let tree = state.mint("tree");
        let commit = state.mint("commit");
        state.commits.insert(commit.clone(), tree);
        state
            .refs
            .insert((repo.to_string(), "main".to_string()), commit);
    }

    /// Login that subsequent reviews are attributed to.
    pub fn set_user(&self, login: &str) {
        self.lock().user = login.to_string();
    }

    /// Fail every call whose `METHOD path` contains `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failures.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Every call made so far, as `METHOD path`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn pulls(&self) -> Vec<FakePull> {
        self.lock().pulls.clone()
    }

    pub fn branch_sha(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        self.lock()
            .refs
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
    }

    fn pull_json(pull: &FakePull) -> Value {
        json!({
            "number": pull.number,
            "html_url": format!("https://github.com/{}/pull/{}", pull.repo, pull.number),
            "state": if pull.open { "open" } else { "closed" },
        })
    }
}

impl GhTransport for FakeGitHub {
    fn api(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        let call = format!("{} {}", method, path);
        let mut state = self.lock();
        state.calls.push(call.clone());
        if state.failures.iter().any(|f| call.contains(f.as_str())) {
            return Err(ReviewError::Api {
                provider: "github",
                call,
                message: "HTTP 500: injected failure".to_string(),
            });
        }

        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let segments: Vec<&str> = route.trim_start_matches("repos/").splitn(3, '/').collect();
        let (repo, rest) = match segments.as_slice() {
            [owner, name, rest] => (format!("{}/{}", owner, name), *rest),
            _ => return Err(not_found(&call)),
        };

        match (method, rest) {
            ("GET", r) if r.starts_with("git/ref/heads/") => {
                let branch = &r["git/ref/heads/".len()..];
                match state.refs.get(&(repo, branch.to_string())) {
                    Some(sha) => Ok(json!({ "object": { "sha": sha } })),
                    None => Err(not_found(&call)),
                }
            }
            ("GET", r) if r.starts_with("git/commits/") => {
                let sha = &r["git/commits/".len()..];
                match state.commits.get(sha) {
                    Some(tree) => Ok(json!({ "sha": sha, "tree": { "sha": tree } })),
                    None => Err(not_found(&call)),
                }
            }
            ("POST", "git/blobs") => Ok(json!({ "sha": state.mint("blob") })),
            ("POST", "git/trees") => Ok(json!({ "sha": state.mint("tree") })),
            ("POST", "git/commits") => {
                let commit = state.mint("commit");
                let tree = body_str(body, "tree");
                state.commits.insert(commit.clone(), tree);
                Ok(json!({ "sha": commit }))
            }
            ("POST", "git/refs") => {
                let full = body_str(body, "ref");
                let branch = full.trim_start_matches("refs/heads/").to_string();
                let key = (repo, branch);
                if state.refs.contains_key(&key) {
                    return Err(ReviewError::Api {
                        provider: "github",
                        call,
                        message: "HTTP 422: Reference already exists".to_string(),
                    });
                }
                state.refs.insert(key, body_str(body, "sha"));
                Ok(Value::Null)
            }
            ("PATCH", r) if r.starts_with("git/refs/heads/") => {
                let key = (repo, r["git/refs/heads/".len()..].to_string());
                if !state.refs.contains_key(&key) {
                    return Err(not_found(&call));
                }
                state.refs.insert(key, body_str(body, "sha"));
                Ok(Value::Null)
            }
            ("DELETE", r) if r.starts_with("git/refs/heads/") => {
                let key = (repo, r["git/refs/heads/".len()..].to_string());
                match state.refs.remove(&key) {
                    Some(_) => Ok(Value::Null),
                    None => Err(not_found(&call)),
                }
            }
            ("GET", "pulls") => {
                let head = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("head="))
                    .unwrap_or_default();
                let open: Vec<Value> = state
                    .pulls
                    .iter()
                    .filter(|p| p.repo == repo && p.open && (head.is_empty() || p.head == head))
                    .map(FakeGitHub::pull_json)
                    .collect();
                Ok(Value::Array(open))
            }
            ("POST", "pulls") => {
                state.next_pull += 1;
                let pull = FakePull {
                    repo,
                    number: state.next_pull,
                    head: body_str(body, "head"),
                    base_branch: body_str(body, "base"),
                    title: body_str(body, "title"),
                    body: body_str(body, "body"),
                    open: true,
                    reviews: Vec::new(),
                    comments: Vec::new(),
                };
                let out = FakeGitHub::pull_json(&pull);
                state.pulls.push(pull);
                Ok(out)
            }
            (method, r) if r.starts_with("pulls/") || r.starts_with("issues/") => {
                let mut parts = r.splitn(3, '/').skip(1);
                let number: u64 = parts
                    .next()
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| not_found(&call))?;
                let tail = parts.next().unwrap_or_default().to_string();
                let user = state.user.clone();
                let pull = state
                    .pulls
                    .iter_mut()
                    .find(|p| p.repo == repo && p.number == number)
                    .ok_or_else(|| not_found(&call))?;
                match (method, tail.as_str()) {
                    ("PATCH", "") => {
                        if let Some(title) = body.and_then(|b| b.get("title")).and_then(|v| v.as_str()) {
                            pull.title = title.to_string();
                        }
                        if let Some(text) = body.and_then(|b| b.get("body")).and_then(|v| v.as_str()) {
                            pull.body = text.to_string();
                        }
                        if body_str(body, "state") == "closed" {
                            pull.open = false;
                        }
                        Ok(FakeGitHub::pull_json(pull))
                    }
                    ("POST", "reviews") => {
                        let event = body_str(body, "event");
                        pull.reviews.push((user, review_state(&event).to_string()));
                        Ok(Value::Null)
                    }
                    ("GET", "reviews") => Ok(Value::Array(
                        pull.reviews
                            .iter()
                            .enumerate()
                            .map(|(i, (login, state))| {
                                json!({
                                    "user": { "login": login },
                                    "state": state,
                                    "submitted_at": format!("2026-01-01T00:00:{:02}Z", i % 60),
                                })
                            })
                            .collect(),
                    )),
                    ("POST", "comments") => {
                        pull.comments.push(body_str(body, "body"));
                        Ok(Value::Null)
                    }
                    _ => Err(not_found(&call)),
                }
            }
            _ => Err(not_found(&call)),
        }
    }
}
