//! # GitHub Forge Client
//!
//! GitHub REST implementation of the [`Forge`] trait: bearer-token auth,
//! rate-limit bookkeeping from the `x-ratelimit-*` headers, paginated list
//! endpoints, and label removal that tolerates already-removed labels.

use crate::error::ForgeError;
use crate::Forge;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::{Item, ItemKind};
use reqwest::{header, Client as HttpClient, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "triage-controller/0.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: usize = 100;

/// GitHub REST API client scoped to one repository.
pub struct GitHubForge {
    http: HttpClient,
    base_url: String,
    token: String,
    owner: String,
    repo: String,
    rate_limit: Mutex<RateLimit>,
}

#[derive(Debug)]
struct RateLimit {
    remaining: i64,
    reset_at: Option<Instant>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    labels: Vec<GitHubLabel>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl GitHubIssue {
    fn into_item(self) -> Item {
        let kind = if self.pull_request.is_some() {
            ItemKind::PullRequest
        } else {
            ItemKind::Issue
        };
        Item {
            number: self.number,
            kind,
            labels: self.labels.into_iter().map(|label| label.name).collect(),
            created_at: self.created_at,
            last_activity: self.updated_at,
            stale_marked_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct IssueEvent {
    event: String,
    #[serde(default)]
    label: Option<GitHubLabel>,
    created_at: DateTime<Utc>,
}

impl GitHubForge {
    /// Create a client for `owner/repo` authenticated with `token`.
    ///
    /// # Errors
    /// Returns `ForgeError::Http` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Result<Self, ForgeError> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            rate_limit: Mutex::new(RateLimit {
                remaining: 5000, // GitHub's default rate limit
                reset_at: None,
            }),
        })
    }

    /// Point the client at a different API root (used by tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_url, self.owner, self.repo, suffix
        )
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, ForgeError> {
        self.check_rate_limit()?;

        let mut request = self
            .http
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        self.update_rate_limit(&response);
        Ok(response)
    }

    /// Turn a non-success response into the matching [`ForgeError`].
    async fn ensure_success(
        response: Response,
        resource: &str,
    ) -> Result<Response, ForgeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            401 => Err(ForgeError::AuthenticationFailed),
            404 => Err(ForgeError::NotFound {
                resource: resource.to_string(),
            }),
            403 | 429 => {
                // A 403 is a rate-limit response when the quota headers say
                // so; otherwise it is an ordinary permission failure.
                if let Some(reset_in) = rate_limit_reset(&response) {
                    Err(ForgeError::RateLimited { reset_in })
                } else if status.as_u16() == 429 {
                    Err(ForgeError::RateLimited {
                        reset_in: Duration::from_secs(60),
                    })
                } else {
                    Err(ForgeError::Api {
                        status: 403,
                        message: error_message(response).await,
                    })
                }
            }
            code => Err(ForgeError::Api {
                status: code,
                message: error_message(response).await,
            }),
        }
    }

    async fn get_paginated<T: DeserializeOwned>(
        &self,
        suffix: &str,
        resource: &str,
    ) -> Result<Vec<T>, ForgeError> {
        let separator = if suffix.contains('?') { '&' } else { '?' };
        let mut all = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}{}per_page={}&page={}",
                self.repo_url(suffix),
                separator,
                PER_PAGE,
                page
            );
            let response = self.request(Method::GET, &url, None).await?;
            let response = Self::ensure_success(response, resource).await?;
            let batch: Vec<T> = response.json().await?;
            let count = batch.len();
            all.extend(batch);

            if count < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }

    fn check_rate_limit(&self) -> Result<(), ForgeError> {
        let Ok(state) = self.rate_limit.lock() else {
            return Ok(());
        };
        if state.remaining <= 0 {
            if let Some(reset_at) = state.reset_at {
                let now = Instant::now();
                if now < reset_at {
                    return Err(ForgeError::RateLimited {
                        reset_in: reset_at - now,
                    });
                }
            }
        }
        Ok(())
    }

    fn update_rate_limit(&self, response: &Response) {
        let Ok(mut state) = self.rate_limit.lock() else {
            return;
        };

        if let Some(remaining) = header_i64(response, "x-ratelimit-remaining") {
            state.remaining = remaining;
        }
        if let Some(reset) = header_i64(response, "x-ratelimit-reset") {
            let now = chrono::Utc::now().timestamp();
            #[allow(clippy::cast_sign_loss)]
            let seconds_until_reset = (reset - now).max(0) as u64;
            state.reset_at = Some(Instant::now() + Duration::from_secs(seconds_until_reset));
        }
    }
}

fn header_i64(response: &Response, name: &str) -> Option<i64> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
}

/// Extract the rate-limit reset delay from a limited response, if the
/// quota headers mark it as exhausted.
fn rate_limit_reset(response: &Response) -> Option<Duration> {
    let remaining = header_i64(response, "x-ratelimit-remaining")?;
    if remaining > 0 {
        return None;
    }
    let reset = header_i64(response, "x-ratelimit-reset")?;
    let now = chrono::Utc::now().timestamp();
    #[allow(clippy::cast_sign_loss)]
    let seconds_until_reset = (reset - now).max(0) as u64;
    Some(Duration::from_secs(seconds_until_reset))
}

async fn error_message(response: Response) -> String {
    response
        .json::<GitHubErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| "no error body".to_string())
}

#[async_trait]
impl Forge for GitHubForge {
    #[instrument(skip(self), fields(pr_number = %pr_number))]
    async fn list_changed_paths(&self, pr_number: u64) -> Result<BTreeSet<String>, ForgeError> {
        let files: Vec<PullRequestFile> = self
            .get_paginated(
                &format!("/pulls/{pr_number}/files"),
                &format!("pull request #{pr_number}"),
            )
            .await?;

        let paths: BTreeSet<String> = files.into_iter().map(|file| file.filename).collect();
        debug!("PR #{} changed {} paths", pr_number, paths.len());
        Ok(paths)
    }

    #[instrument(skip(self), fields(number = %number))]
    async fn get_item(&self, number: u64) -> Result<Item, ForgeError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        let response = self.request(Method::GET, &url, None).await?;
        let response = Self::ensure_success(response, &format!("item #{number}")).await?;
        let issue: GitHubIssue = response.json().await?;
        Ok(issue.into_item())
    }

    #[instrument(skip(self), fields(kind = ?kind))]
    async fn list_open_items(&self, kind: ItemKind) -> Result<Vec<Item>, ForgeError> {
        // The issues endpoint returns pull requests too; filter afterwards.
        let issues: Vec<GitHubIssue> = self
            .get_paginated("/issues?state=open", "open items")
            .await?;

        let items: Vec<Item> = issues
            .into_iter()
            .map(GitHubIssue::into_item)
            .filter(|item| item.kind == kind)
            .collect();
        debug!("Listed {} open items of kind {:?}", items.len(), kind);
        Ok(items)
    }

    #[instrument(skip(self), fields(number = %number, labels = ?labels))]
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ForgeError> {
        if labels.is_empty() {
            return Ok(());
        }

        let url = self.repo_url(&format!("/issues/{number}/labels"));
        let body = serde_json::json!({ "labels": labels });
        let response = self.request(Method::POST, &url, Some(body)).await?;
        Self::ensure_success(response, &format!("item #{number}")).await?;
        debug!("Added {} labels to #{}", labels.len(), number);
        Ok(())
    }

    #[instrument(skip(self), fields(number = %number, label = %label))]
    async fn remove_label(&self, number: u64, label: &str) -> Result<(), ForgeError> {
        let url = self.repo_url(&format!(
            "/issues/{number}/labels/{}",
            urlencoding::encode(label)
        ));
        let response = self.request(Method::DELETE, &url, None).await?;

        if response.status().as_u16() == 404 {
            // Already removed, which is fine.
            debug!("Label '{}' not present on #{} (already removed)", label, number);
            return Ok(());
        }
        Self::ensure_success(response, &format!("item #{number}")).await?;
        debug!("Removed label '{}' from #{}", label, number);
        Ok(())
    }

    #[instrument(skip(self, body), fields(number = %number))]
    async fn post_comment(&self, number: u64, body: &str) -> Result<(), ForgeError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let payload = serde_json::json!({ "body": body });
        let response = self.request(Method::POST, &url, Some(payload)).await?;
        Self::ensure_success(response, &format!("item #{number}")).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(number = %number))]
    async fn close_item(&self, number: u64) -> Result<(), ForgeError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        let body = serde_json::json!({ "state": "closed" });
        let response = self.request(Method::PATCH, &url, Some(body)).await?;
        Self::ensure_success(response, &format!("item #{number}")).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(number = %number, label = %label))]
    async fn label_applied_at(
        &self,
        number: u64,
        label: &str,
    ) -> Result<Option<DateTime<Utc>>, ForgeError> {
        let events: Vec<IssueEvent> = self
            .get_paginated(
                &format!("/issues/{number}/events"),
                &format!("item #{number}"),
            )
            .await?;

        // The label may have been applied and removed repeatedly; the most
        // recent application is the one that matters.
        let applied_at = events
            .into_iter()
            .filter(|event| {
                event.event == "labeled"
                    && event.label.as_ref().is_some_and(|l| l.name == label)
            })
            .map(|event| event.created_at)
            .max();
        Ok(applied_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> GitHubForge {
        GitHubForge::new("test-token", "acme", "widgets")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn issue_json(number: u64, labels: &[&str], pull_request: bool) -> serde_json::Value {
        let mut value = json!({
            "number": number,
            "labels": labels.iter().map(|name| json!({"name": name})).collect::<Vec<_>>(),
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-03-01T00:00:00Z",
        });
        if pull_request {
            value["pull_request"] = json!({"url": "https://example.invalid"});
        }
        value
    }

    #[tokio::test]
    async fn test_get_item_maps_pull_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(7, &["bug"], true)))
            .mount(&server)
            .await;

        let item = client(&server).await.get_item(7).await.unwrap();
        assert_eq!(item.number, 7);
        assert_eq!(item.kind, ItemKind::PullRequest);
        assert!(item.labels.contains("bug"));
        assert!(item.stale_marked_at.is_none());
    }

    #[tokio::test]
    async fn test_list_changed_paths_paginates() {
        let server = MockServer::start().await;
        let first_page: Vec<_> = (0..100)
            .map(|index| json!({"filename": format!("src/file_{index}.rs")}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/5/files"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls/5/files"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"filename": "README.md"}])),
            )
            .mount(&server)
            .await;

        let paths = client(&server).await.list_changed_paths(5).await.unwrap();
        assert_eq!(paths.len(), 101);
        assert!(paths.contains("README.md"));
    }

    #[tokio::test]
    async fn test_list_open_items_filters_by_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues"))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                issue_json(1, &[], false),
                issue_json(2, &[], true),
                issue_json(3, &["stale"], false),
            ])))
            .mount(&server)
            .await;

        let forge = client(&server).await;
        let issues = forge.list_open_items(ItemKind::Issue).await.unwrap();
        assert_eq!(
            issues.iter().map(|item| item.number).collect::<Vec<_>>(),
            vec![1, 3]
        );

        let prs = forge.list_open_items(ItemKind::PullRequest).await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 2);
    }

    #[tokio::test]
    async fn test_add_labels_empty_slice_is_a_noop() {
        // No mock is mounted, so any request would fail the test.
        let server = MockServer::start().await;
        client(&server).await.add_labels(9, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_label_tolerates_missing_label() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widgets/issues/4/labels/stale"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server).await.remove_label(4, "stale").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_item_patches_state() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/widgets/issues/11"))
            .and(body_json(json!({"state": "closed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.close_item(11).await.unwrap();
    }

    #[tokio::test]
    async fn test_exhausted_quota_maps_to_rate_limited() {
        let server = MockServer::start().await;
        let reset = chrono::Utc::now().timestamp() + 120;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/2"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                    .set_body_json(json!({"message": "API rate limit exceeded"})),
            )
            .mount(&server)
            .await;

        let error = client(&server).await.get_item(2).await.unwrap_err();
        assert!(matches!(error, ForgeError::RateLimited { .. }));
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn test_missing_item_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let error = client(&server).await.get_item(404).await.unwrap_err();
        assert!(matches!(error, ForgeError::NotFound { .. }));
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn test_label_applied_at_takes_latest_application() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/6/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"event": "labeled", "label": {"name": "stale"}, "created_at": "2024-01-05T00:00:00Z"},
                {"event": "unlabeled", "label": {"name": "stale"}, "created_at": "2024-01-10T00:00:00Z"},
                {"event": "labeled", "label": {"name": "stale"}, "created_at": "2024-02-01T00:00:00Z"},
                {"event": "labeled", "label": {"name": "bug"}, "created_at": "2024-03-01T00:00:00Z"},
                {"event": "closed", "created_at": "2024-03-02T00:00:00Z"}
            ])))
            .mount(&server)
            .await;

        let applied = client(&server)
            .await
            .label_applied_at(6, "stale")
            .await
            .unwrap();
        assert_eq!(
            applied,
            Some("2024-02-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap())
        );
    }
}
