use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::error::Result;
use crate::filter::CommentFilter;
use crate::insight::InsightExtractor;
use crate::sources::{Comment, CommentThread, PullRequestId, ReviewSource};

/// Outcome of digesting one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub pr_id: PullRequestId,
    pub has_content: bool,
    pub content: String,
}

impl ProcessResult {
    pub fn empty(pr_id: PullRequestId) -> Self {
        Self {
            pr_id,
            has_content: false,
            content: String::new(),
        }
    }
}

/// Collapsible section wrapping every fragment found in one pull request.
pub fn render_section(pr_id: PullRequestId, link: &str, fragments: &str) -> String {
    format!(
        "<details>\n<summary>PR {pr_id} - Link: <a href=\"{link}\">{link}</a></summary>\n\n### Important Comments\n\n{fragments}</details>\n\n"
    )
}

pub struct PrProcessor<S, C> {
    source: Arc<S>,
    extractor: InsightExtractor<C>,
    filter: CommentFilter,
}

impl<S: ReviewSource, C: Classifier> PrProcessor<S, C> {
    pub fn new(source: Arc<S>, extractor: InsightExtractor<C>, filter: CommentFilter) -> Self {
        Self {
            source,
            extractor,
            filter,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn classifier(&self) -> &C {
        self.extractor.classifier()
    }

    /// Digest one pull request. Never fails: fetch or parse errors are
    /// logged and reported as a result without content.
    pub async fn process(&self, pr_id: PullRequestId) -> ProcessResult {
        match self.try_process(pr_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(pr_id, error = %e, "failed to process pull request");
                ProcessResult::empty(pr_id)
            }
        }
    }

    async fn try_process(&self, pr_id: PullRequestId) -> Result<ProcessResult> {
        let Some(threads) = self.source.fetch_threads(pr_id).await? else {
            return Ok(ProcessResult::empty(pr_id));
        };

        let candidates: Vec<(&CommentThread, &Comment)> = threads
            .iter()
            .flat_map(|thread| thread.comments.iter().map(move |c| (thread, c)))
            .filter(|(_, comment)| self.filter.should_process(comment.text()))
            .collect();

        debug!(
            pr_id,
            threads = threads.len(),
            candidates = candidates.len(),
            "classifying comments"
        );

        let fragments = join_all(
            candidates
                .iter()
                .map(|&(thread, comment)| self.classify(pr_id, thread, comment)),
        )
        .await;

        let body = fragments.concat();
        if body.is_empty() {
            return Ok(ProcessResult::empty(pr_id));
        }

        info!(pr_id, "found important comments");
        let link = self.source.pr_link(pr_id);
        Ok(ProcessResult {
            pr_id,
            has_content: true,
            content: render_section(pr_id, &link, &body),
        })
    }

    async fn classify(
        &self,
        pr_id: PullRequestId,
        thread: &CommentThread,
        comment: &Comment,
    ) -> String {
        match self.extractor.extract(thread, comment).await {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!(
                    pr_id,
                    thread_id = thread.id,
                    comment_id = comment.id,
                    error = %e,
                    "failed to classify comment"
                );
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::Error;
    use crate::prompts::PromptEngine;
    use crate::test_helpers::{make_comment, make_thread};

    struct MapSource {
        threads: HashMap<PullRequestId, Option<Vec<CommentThread>>>,
    }

    impl ReviewSource for MapSource {
        async fn list_completed_prs(&self, _days: u32, _max: u32) -> Result<Vec<PullRequestId>> {
            Ok(self.threads.keys().copied().collect())
        }

        async fn fetch_threads(&self, pr_id: PullRequestId) -> Result<Option<Vec<CommentThread>>> {
            match self.threads.get(&pr_id) {
                Some(t) => Ok(t.clone()),
                None => Err(Error::ReviewApi(format!("no such pull request {pr_id}"))),
            }
        }

        fn pr_link(&self, pr_id: PullRequestId) -> String {
            format!("https://example.test/pr/{pr_id}")
        }
    }

    /// Replies keyed on a word in the user prompt; records every prompt.
    struct KeywordClassifier {
        prompts: Mutex<Vec<String>>,
    }

    impl Classifier for KeywordClassifier {
        async fn complete(&self, _system: &str, user: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            if user.contains("explode") {
                return Err(Error::Classifier("boom".to_string()));
            }
            if user.contains("kubectl") {
                return Ok("Category: Troubleshooting\nSummary: List pods with kubectl.".to_string());
            }
            if user.contains("pgbouncer") {
                return Ok("Category: Definition\nSummary: PgBouncer pools connections.".to_string());
            }
            Ok("No important content".to_string())
        }
    }

    fn processor(
        threads: HashMap<PullRequestId, Option<Vec<CommentThread>>>,
    ) -> PrProcessor<MapSource, KeywordClassifier> {
        PrProcessor::new(
            Arc::new(MapSource { threads }),
            InsightExtractor::new(
                KeywordClassifier {
                    prompts: Mutex::new(Vec::new()),
                },
                PromptEngine::new(None),
                4,
            ),
            CommentFilter::default(),
        )
    }

    #[test]
    fn test_render_section() {
        let section = render_section(7, "https://x/pr/7", "### Thread 1, Comment 2\n\n");
        assert_eq!(
            section,
            "<details>\n<summary>PR 7 - Link: <a href=\"https://x/pr/7\">https://x/pr/7</a></summary>\n\n### Important Comments\n\n### Thread 1, Comment 2\n\n</details>\n\n"
        );
    }

    #[tokio::test]
    async fn test_process_no_threads_makes_no_calls() {
        let p = processor(HashMap::from([(1, Some(vec![]))]));
        let result = p.process(1).await;
        assert_eq!(result, ProcessResult::empty(1));
        assert!(p.classifier().prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_process_non_success_fetch_is_empty() {
        let p = processor(HashMap::from([(2, None)]));
        assert!(!p.process(2).await.has_content);
    }

    #[tokio::test]
    async fn test_process_fetch_error_is_swallowed() {
        let p = processor(HashMap::new());
        assert_eq!(p.process(3).await, ProcessResult::empty(3));
    }

    #[tokio::test]
    async fn test_process_filters_before_classifying() {
        let threads = vec![make_thread(
            1,
            vec![
                make_comment(1, "short"),
                make_comment(2, "Ownership Enforcer: approvals are missing for this path"),
                make_comment(3, "Nothing of note in this rather long comment"),
            ],
        )];
        let p = processor(HashMap::from([(4, Some(threads))]));
        let result = p.process(4).await;
        assert!(!result.has_content);
        let prompts = p.classifier().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Nothing of note"));
    }

    #[tokio::test]
    async fn test_process_preserves_comment_order_and_isolates_failures() {
        let threads = vec![
            make_thread(
                10,
                vec![
                    make_comment(1, "Run kubectl get pods -n staging to see it"),
                    make_comment(2, "This one will explode inside the classifier"),
                ],
            ),
            make_thread(20, vec![make_comment(3, "We put pgbouncer in front of the db")]),
        ];
        let p = processor(HashMap::from([(5, Some(threads))]));
        let result = p.process(5).await;
        assert!(result.has_content);

        let content = &result.content;
        assert!(content.starts_with("<details>\n<summary>PR 5 - Link: "));
        assert!(content.contains("https://example.test/pr/5"));
        let first = content.find("### Thread 10, Comment 1").unwrap();
        let second = content.find("### Thread 20, Comment 3").unwrap();
        assert!(first < second);
        assert!(!content.contains("Comment 2"));
        assert!(content.ends_with("</details>\n\n"));
    }
}
