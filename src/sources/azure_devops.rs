use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Config, TOKEN_ENV};
use crate::error::{Error, Result};

use super::{CommentThread, PullRequestId, ReviewSource};

const LIST_API_VERSION: &str = "7.1";
const THREADS_API_VERSION: &str = "7.1-preview.1";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Status and body of a single GET against the review system.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Transport abstraction (for testability)
// ---------------------------------------------------------------------------

pub trait AdoHttp: Send + Sync {
    /// Issue a GET with the given `Authorization` header value. Non-success
    /// statuses are returned as replies, only transport failures are errors.
    fn get(&self, url: &str, authorization: &str) -> Result<HttpReply>;
}

struct UreqHttp {
    agent: ureq::Agent,
}

impl UreqHttp {
    fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build(),
        }
    }
}

impl AdoHttp for UreqHttp {
    fn get(&self, url: &str, authorization: &str) -> Result<HttpReply> {
        match self
            .agent
            .get(url)
            .set("Authorization", authorization)
            .set("Accept", "application/json")
            .call()
        {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .map_err(|e| Error::ReviewApi(format!("failed to read response body: {e}")))?;
                Ok(HttpReply { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpReply {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(e)) => {
                Err(Error::ReviewApi(format!("request to review api failed: {e}")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestRef {
    pull_request_id: PullRequestId,
}

// ---------------------------------------------------------------------------
// AzureDevOpsSource
// ---------------------------------------------------------------------------

pub struct AzureDevOpsSource {
    base_url: String,
    project: String,
    repository: String,
    config_token: Option<String>,
    token_env: String,
    thread_log_dir: Option<PathBuf>,
    http: Arc<dyn AdoHttp>,
}

impl AzureDevOpsSource {
    pub fn new(config: &Config) -> Self {
        Self::with_http(config, Arc::new(UreqHttp::new()))
    }

    pub fn with_http(config: &Config, http: Arc<dyn AdoHttp>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            project: config.project.clone(),
            repository: config.repository.clone(),
            config_token: config.ado_pat.clone(),
            token_env: TOKEN_ENV.to_string(),
            thread_log_dir: config.thread_log_dir.clone(),
            http,
        }
    }

    /// Read the token from a different environment variable.
    pub fn with_token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = name.into();
        self
    }

    /// Resolve the access token: environment first, then the config file.
    fn resolve_token(&self) -> Result<String> {
        if let Ok(token) = std::env::var(&self.token_env)
            && !token.is_empty()
        {
            return Ok(token);
        }
        if let Some(ref token) = self.config_token {
            debug!("using access token from config file");
            return Ok(token.clone());
        }
        Err(Error::MissingCredential(format!(
            "{} environment variable or ado_pat config key not set",
            self.token_env
        )))
    }

    /// `Basic` auth with an empty user name and the token as password.
    fn authorization(&self) -> Result<String> {
        let token = self.resolve_token()?;
        Ok(format!("Basic {}", STANDARD.encode(format!(":{token}"))))
    }

    fn repository_api(&self) -> String {
        format!(
            "{}/{}/_apis/git/repositories/{}",
            self.base_url, self.project, self.repository
        )
    }

    pub fn pull_requests_url(&self, since: DateTime<Utc>, max_results: u32) -> String {
        format!(
            "{}/pullRequests?searchCriteria.status=completed&searchCriteria.minTime={}&api-version={LIST_API_VERSION}&$top={max_results}",
            self.repository_api(),
            since.format("%Y-%m-%dT%H:%M:%SZ"),
        )
    }

    pub fn threads_url(&self, pr_id: PullRequestId) -> String {
        format!(
            "{}/pullRequests/{pr_id}/threads?api-version={THREADS_API_VERSION}",
            self.repository_api()
        )
    }

    async fn get(&self, url: String) -> Result<HttpReply> {
        let authorization = self.authorization()?;
        let http = Arc::clone(&self.http);
        tokio::task::spawn_blocking(move || http.get(&url, &authorization))
            .await
            .map_err(|e| Error::ReviewApi(format!("request task failed: {e}")))?
    }

    fn log_threads(&self, pr_id: PullRequestId, body: &str) {
        let Some(ref dir) = self.thread_log_dir else {
            return;
        };
        let path = dir.join(format!("comments_log_pr_{pr_id}.json"));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, body)) {
            warn!(pr_id, path = %path.display(), error = %e, "failed to write thread log");
        }
    }
}

impl ReviewSource for AzureDevOpsSource {
    async fn list_completed_prs(
        &self,
        days_back: u32,
        max_results: u32,
    ) -> Result<Vec<PullRequestId>> {
        let since = Utc::now() - chrono::Duration::days(i64::from(days_back));
        let url = self.pull_requests_url(since, max_results);
        info!(url = %url, "fetching completed pull requests");

        let reply = self.get(url).await?;
        if !reply.is_success() {
            warn!(
                status = reply.status,
                body = %reply.body,
                "error fetching pull requests"
            );
            return Ok(Vec::new());
        }

        let parsed: ValueList<PullRequestRef> = serde_json::from_str(&reply.body)
            .map_err(|e| Error::ReviewApi(format!("failed to parse pull request list: {e}")))?;
        let ids: Vec<PullRequestId> = parsed.value.into_iter().map(|pr| pr.pull_request_id).collect();

        info!(count = ids.len(), ids = ?ids.iter().take(10).collect::<Vec<_>>(), "found pull requests");
        Ok(ids)
    }

    async fn fetch_threads(&self, pr_id: PullRequestId) -> Result<Option<Vec<CommentThread>>> {
        info!(pr_id, "fetching threads");

        let reply = self.get(self.threads_url(pr_id)).await?;
        if !reply.is_success() {
            warn!(pr_id, status = reply.status, "error fetching threads");
            return Ok(None);
        }

        self.log_threads(pr_id, &reply.body);

        let parsed: ValueList<CommentThread> = serde_json::from_str(&reply.body).map_err(|e| {
            Error::ReviewApi(format!("failed to parse threads for PR #{pr_id}: {e}"))
        })?;
        Ok(Some(parsed.value))
    }

    fn pr_link(&self, pr_id: PullRequestId) -> String {
        format!(
            "{}/{}/_git/{}/pullrequest/{pr_id}",
            self.base_url, self.project, self.repository
        )
    }
}
