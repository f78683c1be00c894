// dolthub.rs — DoltHub provider: review shells over the hosted-database REST API.
//
// On DoltHub the item branch itself is pushed by `dolt push`, so the shell is
// just a pull request between databases. DoltHub has no review objects;
// verdicts are posted as comments whose first line is a marker
// (`[APPROVE]` / `[REQUEST_CHANGES]`) and read back by scanning comments.

use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{Result, ReviewError};
use crate::provider::{
    NewPullRequest, PrHead, PullRequest, RepoRef, Review, ReviewEvent, ReviewProvider,
    ReviewState,
};

const PROVIDER: &str = "dolthub";

pub const DEFAULT_API_BASE: &str = "https://www.dolthub.com/api/v1alpha1";

/// Sends one DoltHub API call; `path` is relative to the API base.
pub trait DoltHubTransport: Send + Sync {
    fn send(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value>;
}

/// Blocking HTTPS transport.
pub struct DoltHubHttp {
    client: reqwest::blocking::Client,
    base: String,
    token: Option<String>,
}

impl DoltHubHttp {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("wl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base: DEFAULT_API_BASE.to_string(),
            token,
        })
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }
}

impl DoltHubTransport for DoltHubHttp {
    fn send(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}/{}", self.base.trim_end_matches('/'), path);
        tracing::debug!("dolthub {} {}", method, url);
        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PATCH" => self.client.patch(&url),
            "DELETE" => self.client.delete(&url),
            other => {
                return Err(ReviewError::Unsupported {
                    provider: PROVIDER,
                    operation: format!("HTTP method {}", other),
                })
            }
        };
        if let Some(token) = &self.token {
            request = request.header("authorization", format!("token {}", token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(ReviewError::Api {
                provider: PROVIDER,
                call: format!("{} {}", method, path),
                message: format!("HTTP {}: {}", status.as_u16(), text.trim()),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Web URL of a DoltHub pull request.
pub fn pull_url(repo: &RepoRef, id: u64) -> String {
    format!(
        "https://www.dolthub.com/repositories/{}/{}/pulls/{}",
        repo.owner, repo.name, id
    )
}

fn marker(event: ReviewEvent) -> String {
    format!("[{}]", event.as_str())
}

/// Comment text carrying a review verdict.
pub fn review_comment(event: ReviewEvent, body: &str) -> String {
    if body.trim().is_empty() {
        marker(event)
    } else {
        format!("{}\n\n{}", marker(event), body.trim())
    }
}

/// Verdict carried by a comment, if its first line is a review marker.
pub fn parse_review_comment(text: &str) -> Option<ReviewState> {
    let first = text.lines().next()?.trim();
    [ReviewEvent::Approve, ReviewEvent::RequestChanges]
        .into_iter()
        .find(|e| first == marker(*e))
        .map(|e| ReviewState::parse(e.as_str()))
}

// DoltHub sends ids as strings in some responses and numbers in others.
fn pull_id(value: &Value) -> Option<u64> {
    match value.get("pull_id")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn text<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

fn list<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// DoltHub [`ReviewProvider`].
pub struct DoltHubProvider<T: DoltHubTransport = DoltHubHttp> {
    transport: T,
}

impl DoltHubProvider<DoltHubHttp> {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self::with_transport(DoltHubHttp::new(token)?))
    }
}

impl<T: DoltHubTransport> DoltHubProvider<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    fn pulls_path(repo: &RepoRef) -> String {
        format!("{}/{}/pulls", repo.owner, repo.name)
    }

    fn patch_pull(&self, base: &RepoRef, number: u64, body: Value) -> Result<()> {
        self.transport
            .send(
                "PATCH",
                &format!("{}/{}", Self::pulls_path(base), number),
                Some(&body),
            )
            .map(|_| ())
    }
}

impl<T: DoltHubTransport> ReviewProvider for DoltHubProvider<T> {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn publish_branch(&self, head: &PrHead, _: &str, _: &str, _: &str) -> Result<()> {
        tracing::debug!("dolthub branch {} is pushed by dolt itself", head);
        Ok(())
    }

    fn find_pr(&self, base: &RepoRef, head: &PrHead) -> Result<Option<PullRequest>> {
        let listing = self.transport.send("GET", &Self::pulls_path(base), None)?;
        for summary in list(&listing, "pulls") {
            if !text(summary, "state").eq_ignore_ascii_case("open") {
                continue;
            }
            let Some(id) = pull_id(summary) else { continue };
            let detail = self
                .transport
                .send("GET", &format!("{}/{}", Self::pulls_path(base), id), None)?;
            let Some(pull) = list(&detail, "pulls").first() else {
                continue;
            };
            if text(pull, "from_branch_owner") == head.fork.owner
                && text(pull, "from_branch") == head.branch
            {
                return Ok(Some(PullRequest {
                    number: id,
                    url: pull_url(base, id),
                }));
            }
        }
        Ok(None)
    }

    fn create_pr(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let body = json!({
            "title": request.title,
            "description": request.body,
            "fromBranchOwnerName": request.head.fork.owner,
            "fromBranchRepoName": request.head.fork.name,
            "fromBranchName": request.head.branch,
            "toBranchOwnerName": request.base.owner,
            "toBranchRepoName": request.base.name,
            "toBranchName": request.base_branch,
        });
        let v = self
            .transport
            .send("POST", &Self::pulls_path(&request.base), Some(&body))?;
        let id = pull_id(&v).ok_or_else(|| ReviewError::Response {
            provider: PROVIDER,
            reason: "create pull response has no pull_id".to_string(),
        })?;
        Ok(PullRequest {
            number: id,
            url: pull_url(&request.base, id),
        })
    }

    fn update_pr(&self, base: &RepoRef, number: u64, title: &str, body: &str) -> Result<()> {
        self.patch_pull(base, number, json!({ "title": title, "description": body }))
    }

    fn submit_review(
        &self,
        base: &RepoRef,
        number: u64,
        event: ReviewEvent,
        body: &str,
    ) -> Result<()> {
        self.add_comment(base, number, &review_comment(event, body))
    }

    fn list_reviews(&self, base: &RepoRef, number: u64) -> Result<Vec<Review>> {
        let v = self.transport.send(
            "GET",
            &format!("{}/{}/comments", Self::pulls_path(base), number),
            None,
        )?;
        Ok(list(&v, "comments")
            .iter()
            .filter_map(|c| {
                let state = parse_review_comment(text(c, "comment"))?;
                Some(Review {
                    author: text(c, "author").to_string(),
                    state,
                    submitted_at: chrono::DateTime::parse_from_rfc3339(text(c, "created_at"))
                        .ok()
                        .map(|d| d.with_timezone(&chrono::Utc)),
                })
            })
            .collect())
    }

    fn close_pr(&self, base: &RepoRef, number: u64) -> Result<()> {
        self.patch_pull(base, number, json!({ "state": "closed" }))
    }

    fn add_comment(&self, base: &RepoRef, number: u64, body: &str) -> Result<()> {
        let payload = json!({ "comment": body });
        self.transport
            .send(
                "POST",
                &format!("{}/{}/comments", Self::pulls_path(base), number),
                Some(&payload),
            )
            .map(|_| ())
    }

    fn delete_ref(&self, _: &PrHead) -> Result<()> {
        Err(ReviewError::Unsupported {
            provider: PROVIDER,
            operation: "delete branch".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays canned responses keyed by `METHOD path` and records bodies.
    #[derive(Default)]
    struct Scripted {
        responses: HashMap<String, Value>,
        sent: Mutex<Vec<(String, Option<Value>)>>,
    }

    impl Scripted {
        fn on(mut self, call: &str, response: Value) -> Self {
            self.responses.insert(call.to_string(), response);
            self
        }
    }

    impl DoltHubTransport for Scripted {
        fn send(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
            let call = format!("{} {}", method, path);
            self.sent.lock().unwrap().push((call.clone(), body.cloned()));
            Ok(self.responses.get(&call).cloned().unwrap_or(Value::Null))
        }
    }

    fn base() -> RepoRef {
        RepoRef::new("hop", "commons")
    }

    #[test]
    fn review_markers_round_trip_through_comments() {
        let text = review_comment(ReviewEvent::RequestChanges, "needs tests");
        assert!(text.starts_with("[REQUEST_CHANGES]"));
        assert_eq!(
            parse_review_comment(&text),
            Some(ReviewState::ChangesRequested)
        );
        assert_eq!(
            parse_review_comment(&review_comment(ReviewEvent::Approve, "")),
            Some(ReviewState::Approved)
        );
        assert_eq!(parse_review_comment("looks fine [APPROVE]"), None);
    }

    #[test]
    fn find_pr_matches_on_branch_owner_and_name() {
        let transport = Scripted::default()
            .on(
                "GET hop/commons/pulls",
                json!({ "pulls": [
                    { "pull_id": "1", "state": "Open" },
                    { "pull_id": "2", "state": "Closed" },
                    { "pull_id": 3, "state": "open" },
                ]}),
            )
            .on(
                "GET hop/commons/pulls/1",
                json!({ "pulls": [{ "from_branch_owner": "carol", "from_branch": "wl/carol/w-9" }] }),
            )
            .on(
                "GET hop/commons/pulls/3",
                json!({ "pulls": [{ "from_branch_owner": "bob", "from_branch": "wl/bob/w-1" }] }),
            );
        let provider = DoltHubProvider::with_transport(transport);
        let head = PrHead::new(RepoRef::new("bob", "commons"), "wl/bob/w-1");

        let pr = provider.find_pr(&base(), &head).unwrap().unwrap();
        assert_eq!(pr.number, 3);
        assert_eq!(pr.url, "https://www.dolthub.com/repositories/hop/commons/pulls/3");
    }

    #[test]
    fn reviews_are_read_back_from_marked_comments() {
        let transport = Scripted::default().on(
            "GET hop/commons/pulls/4/comments",
            json!({ "comments": [
                { "author": "alice", "comment": "[REQUEST_CHANGES]\n\nplease fix", "created_at": "2026-03-01T10:00:00Z" },
                { "author": "dave", "comment": "drive-by note" },
                { "author": "alice", "comment": "[APPROVE]" },
            ]}),
        );
        let provider = DoltHubProvider::with_transport(transport);
        let reviews = provider.list_reviews(&base(), 4).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].state, ReviewState::ChangesRequested);
        assert!(reviews[0].submitted_at.is_some());
        assert_eq!(reviews[1].author, "alice");
        assert_eq!(reviews[1].state, ReviewState::Approved);
    }

    #[test]
    fn delete_ref_is_unsupported() {
        let provider = DoltHubProvider::with_transport(Scripted::default());
        let head = PrHead::new(RepoRef::new("bob", "commons"), "wl/bob/w-1");
        assert!(matches!(
            provider.delete_ref(&head),
            Err(ReviewError::Unsupported { .. })
        ));
    }
}
