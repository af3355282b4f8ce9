use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::pr_processor::ProcessResult;
use crate::sources::PullRequestId;

/// Live counters for the run in flight, read by the progress endpoint.
///
/// `total` is -1 while the pull request list is being fetched.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicI64,
    processed: AtomicU64,
    found: AtomicU64,
    current: AtomicU64,
    has_current: AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: i64,
    pub processed: u64,
    pub found: u64,
    #[serde(rename = "currentPR")]
    pub current_pr: Option<PullRequestId>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters at the start of a run.
    pub fn begin_fetch(&self) {
        self.total.store(-1, Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);
        self.found.store(0, Ordering::SeqCst);
        self.has_current.store(false, Ordering::SeqCst);
        self.current.store(0, Ordering::SeqCst);
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total as i64, Ordering::SeqCst);
    }

    /// Leave the fetching state after a run fails, so readers do not see a
    /// listing that never finishes. Counters already recorded are kept.
    pub fn settle(&self) {
        let processed = self.processed.load(Ordering::SeqCst) as i64;
        let _ = self
            .total
            .compare_exchange(-1, processed, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Count one finished pull request.
    pub fn record(&self, result: &ProcessResult) {
        self.current.store(result.pr_id, Ordering::SeqCst);
        self.has_current.store(true, Ordering::SeqCst);
        if result.has_content {
            self.found.fetch_add(1, Ordering::SeqCst);
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let current = self
            .has_current
            .load(Ordering::SeqCst)
            .then(|| self.current.load(Ordering::SeqCst));
        ProgressSnapshot {
            total: self.total.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            found: self.found.load(Ordering::SeqCst),
            current_pr: current,
        }
    }
}

/// Single-flight gate: at most one fetch run at a time.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of a run; releases the guard on drop. Owned so it
/// can move into a spawned task.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another run already holds the guard.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
