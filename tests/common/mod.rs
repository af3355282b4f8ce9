#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pr_digest::classifier::Classifier;
use pr_digest::config::{ClassifierConfig, Config};
use pr_digest::error::{Error, Result};
use pr_digest::filter::DEFAULT_BOILERPLATE;
use pr_digest::sources::{Author, Comment, CommentThread, PullRequestId, ReviewSource};

pub const NO_CONTENT: &str = "No important content";

/// Sensible default `Config` for tests, writing everything under `dir`.
/// Callers can override fields via struct update syntax.
pub fn default_test_config(dir: &Path) -> Config {
    Config {
        base_url: "https://dev.azure.com/contoso".to_string(),
        project: "Platform".to_string(),
        repository: "api".to_string(),
        ado_pat: None,
        days_back: 7,
        max_prs: 15,
        chunk_size: 10,
        batch_delay_secs: 0,
        max_concurrent_classifications: 8,
        min_comment_length: 20,
        boilerplate: DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        output_path: dir.join("important_comments.md"),
        index_path: dir.join("index.html"),
        thread_log_dir: None,
        prompt_dir: None,
        refresh_window_secs: 300,
        refresh_timeout_secs: 30,
        classifier: ClassifierConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            deployment: "gpt-5-nano".to_string(),
            api_version: "2024-10-21".to_string(),
            api_key_env: "PR_DIGEST_TEST_UNSET_KEY".to_string(),
            temperature: 1.0,
            timeout_secs: 60,
        },
        port: 0,
        hosted: false,
    }
}

pub fn comment(id: u64, content: &str) -> Comment {
    Comment {
        id,
        content: Some(content.to_string()),
        author: Author {
            email: Some("dev@contoso.com".to_string()),
            unique_name: None,
        },
        published_date: None,
    }
}

pub fn thread(id: u64, comments: Vec<Comment>) -> CommentThread {
    CommentThread { id, comments }
}

// --- Review source stub ---

#[derive(Default)]
pub struct StubSource {
    prs: Vec<PullRequestId>,
    threads: HashMap<PullRequestId, Vec<CommentThread>>,
    delays: HashMap<PullRequestId, Duration>,
    fail_listing: bool,
    pub fetched: Arc<Mutex<Vec<PullRequestId>>>,
    pub list_calls: Arc<AtomicUsize>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr(mut self, pr_id: PullRequestId, threads: Vec<CommentThread>) -> Self {
        self.prs.push(pr_id);
        self.threads.insert(pr_id, threads);
        self
    }

    /// Delay `fetch_threads` for one pull request.
    pub fn with_delay(mut self, pr_id: PullRequestId, delay: Duration) -> Self {
        self.delays.insert(pr_id, delay);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_listing = true;
        self
    }
}

impl ReviewSource for StubSource {
    async fn list_completed_prs(&self, _days_back: u32, max_results: u32) -> Result<Vec<PullRequestId>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(Error::ReviewApi("malformed pull request listing".to_string()));
        }
        Ok(self.prs.iter().copied().take(max_results as usize).collect())
    }

    async fn fetch_threads(&self, pr_id: PullRequestId) -> Result<Option<Vec<CommentThread>>> {
        if let Some(delay) = self.delays.get(&pr_id) {
            tokio::time::sleep(*delay).await;
        }
        self.fetched.lock().unwrap().push(pr_id);
        Ok(self.threads.get(&pr_id).cloned())
    }

    fn pr_link(&self, pr_id: PullRequestId) -> String {
        format!("https://dev.azure.com/contoso/Platform/_git/api/pullrequest/{pr_id}")
    }
}

// --- Classifier stub ---

/// Answers by the first keyword found in the user prompt, otherwise with
/// the no-content sentinel.
#[derive(Default)]
pub struct StubClassifier {
    replies: Vec<(String, String)>,
    failures: Vec<String>,
    not_ready: bool,
    delay: Option<Duration>,
    pub calls: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

impl StubClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_when(mut self, keyword: &str, reply: &str) -> Self {
        self.replies.push((keyword.to_string(), reply.to_string()));
        self
    }

    pub fn fail_when(mut self, keyword: &str) -> Self {
        self.failures.push(keyword.to_string());
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.not_ready = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Classifier for StubClassifier {
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failures.iter().any(|k| user.contains(k.as_str())) {
            return Err(Error::Classifier("classifier returned status 429".to_string()));
        }
        Ok(self
            .replies
            .iter()
            .find(|(k, _)| user.contains(k.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| NO_CONTENT.to_string()))
    }

    fn check_ready(&self) -> Result<()> {
        if self.not_ready {
            return Err(Error::MissingCredential(
                "PR_DIGEST_TEST_UNSET_KEY environment variable not set".to_string(),
            ));
        }
        Ok(())
    }
}
