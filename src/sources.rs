pub mod azure_devops;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::Result;

/// Pull request identifier as issued by the review system.
pub type PullRequestId = u64;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
}

impl Author {
    /// The author's email, falling back to the account's unique name.
    pub fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.unique_name.as_deref())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CommentThread {
    pub id: u64,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

pub trait ReviewSource: Send + Sync {
    /// List completed pull requests created within the last `days_back` days,
    /// capped at `max_results`. A non-success status yields an empty list.
    fn list_completed_prs(
        &self,
        days_back: u32,
        max_results: u32,
    ) -> impl Future<Output = Result<Vec<PullRequestId>>> + Send;

    /// Fetch every comment thread of a pull request. `None` when the review
    /// system answers with a non-success status.
    fn fetch_threads(
        &self,
        pr_id: PullRequestId,
    ) -> impl Future<Output = Result<Option<Vec<CommentThread>>>> + Send;

    /// Browser link for a pull request.
    fn pr_link(&self, pr_id: PullRequestId) -> String;
}
