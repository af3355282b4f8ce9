use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::Result;
use crate::filter::CommentFilter;
use crate::insight::InsightExtractor;
use crate::pr_processor::{PrProcessor, ProcessResult};
use crate::progress::ProgressTracker;
use crate::prompts::PromptEngine;
use crate::sources::{PullRequestId, ReviewSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub found: usize,
}

/// Drives a whole digest run: list pull requests once, then process them in
/// sequential chunks, appending each chunk's findings to the artifact.
pub struct Orchestrator<S, C> {
    processor: PrProcessor<S, C>,
    artifact: Artifact,
    progress: Arc<ProgressTracker>,
    chunk_size: usize,
    batch_delay: Duration,
}

impl<S: ReviewSource, C: Classifier> Orchestrator<S, C> {
    pub fn new(
        processor: PrProcessor<S, C>,
        artifact: Artifact,
        progress: Arc<ProgressTracker>,
        chunk_size: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            processor,
            artifact,
            progress,
            chunk_size: chunk_size.max(1),
            batch_delay,
        }
    }

    /// Wire up the processing pipeline from resolved configuration.
    pub fn from_config(
        config: &Config,
        source: Arc<S>,
        classifier: C,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        let extractor = InsightExtractor::new(
            classifier,
            PromptEngine::new(config.prompt_dir.clone()),
            config.max_concurrent_classifications,
        );
        let filter = CommentFilter::new(config.min_comment_length, config.boilerplate.clone());
        Self::new(
            PrProcessor::new(source, extractor, filter),
            Artifact::new(config.output_path.clone()),
            progress,
            config.chunk_size,
            Duration::from_secs(config.batch_delay_secs),
        )
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    /// Run once. Progress is reset up front and settled on failure, so the
    /// tracker never reports a listing still in flight after an error.
    pub async fn run(&self, days_back: u32, max_prs: u32) -> Result<RunSummary> {
        self.progress.begin_fetch();
        let outcome = self.execute(days_back, max_prs).await;
        if let Err(ref e) = outcome {
            self.progress.settle();
            warn!(error = %e, "run failed");
        }
        outcome
    }

    async fn execute(&self, days_back: u32, max_prs: u32) -> Result<RunSummary> {
        let started = Instant::now();
        self.processor.classifier().check_ready()?;

        info!(days_back, max_prs, "fetching completed pull requests");
        let pr_ids = self
            .processor
            .source()
            .list_completed_prs(days_back, max_prs)
            .await?;
        if pr_ids.is_empty() {
            info!("no completed pull requests found");
            self.progress.set_total(0);
            return Ok(RunSummary {
                total: 0,
                processed: 0,
                found: 0,
            });
        }

        self.artifact.ensure_header(days_back)?;
        self.progress.set_total(pr_ids.len());
        info!(count = pr_ids.len(), chunk_size = self.chunk_size, "processing pull requests");

        let chunks: Vec<&[PullRequestId]> = pr_ids.chunks(self.chunk_size).collect();
        let mut found = 0;
        for (index, chunk) in chunks.iter().enumerate() {
            let results = join_all(chunk.iter().map(|&pr_id| self.process_one(pr_id))).await;

            let sections: Vec<&str> = results
                .iter()
                .filter(|r| r.has_content)
                .map(|r| r.content.as_str())
                .collect();
            found += sections.len();
            self.artifact.append(sections)?;

            if index + 1 < chunks.len() && !self.batch_delay.is_zero() {
                info!(
                    delay_secs = self.batch_delay.as_secs(),
                    "chunk complete, waiting before next chunk"
                );
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        let summary = RunSummary {
            total: pr_ids.len(),
            processed: pr_ids.len(),
            found,
        };
        info!(
            found = summary.found,
            processed = summary.processed,
            elapsed_secs = started.elapsed().as_secs(),
            path = %self.artifact.path().display(),
            "run complete"
        );
        Ok(summary)
    }

    async fn process_one(&self, pr_id: PullRequestId) -> ProcessResult {
        let result = self.processor.process(pr_id).await;
        self.progress.record(&result);
        let snapshot = self.progress.snapshot();
        if result.has_content {
            info!(
                pr_id,
                found = snapshot.found,
                processed = snapshot.processed,
                "found important comments"
            );
        } else {
            debug!(pr_id, processed = snapshot.processed, "no important comments");
        }
        result
    }
}
