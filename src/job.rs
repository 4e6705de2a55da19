//! Per-download job state and the forward-only state machine that governs
//! it. A [`DownloadJob`] is created at `download()` entry and destroyed on
//! return (success or failure); its `Drop` impl guarantees the abort-path
//! cleanup runs exactly once even on early `?` propagation or a panic
//! unwind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::hash::HashAlgorithm;
use crate::partition::ChunkRange;

/// Forward-only lifecycle of a single download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    Probed,
    Planned,
    Allocated,
    Fetching,
    Completed,
    Aborted,
}

impl JobState {
    /// Whether `self -> next` is a legal forward transition (or a
    /// transition to `Aborted`, which is always legal from any
    /// non-terminal state).
    fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        if next == Aborted {
            return self != Completed && self != Aborted;
        }
        matches!(
            (self, next),
            (Init, Probed) | (Probed, Planned) | (Planned, Allocated) | (Allocated, Fetching) | (Fetching, Completed)
        )
    }
}

/// Mutable, per-call job state: the coordinator's exclusive owner of the
/// output file handle, worker set and cleanup list while the job is active.
pub struct DownloadJob {
    state: JobState,
    /// Resolved output path (final destination, after collision resolution).
    pub output_path: PathBuf,
    /// Ranges assigned to workers.
    pub ranges: Vec<ChunkRange>,
    /// Expected digest, if hash verification was requested.
    pub expected_hash: Option<String>,
    /// Algorithm to verify `expected_hash` with.
    pub hash_algorithm: HashAlgorithm,
    /// Cancellation token honored at every suspension point.
    pub cancel: CancellationToken,
    /// Paths to unlink if the job aborts. Typically just `output_path`, but
    /// kept as a list so future multi-file cleanup (e.g. stray `.part`
    /// files) has somewhere to register.
    cleanup_paths: Vec<PathBuf>,
    completed: AtomicBool,
}

impl DownloadJob {
    /// Creates a new job in the `Init` state.
    pub fn new(output_path: PathBuf, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            state: JobState::Init,
            output_path: output_path.clone(),
            ranges: Vec::new(),
            expected_hash: None,
            hash_algorithm,
            cancel: CancellationToken::new(),
            cleanup_paths: vec![output_path],
            completed: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Advances to `next`. Panics on an illegal transition: a skipped or
    /// backward move is a programming error in the coordinator, not a
    /// recoverable runtime condition.
    pub fn transition(&mut self, next: JobState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal job transition: {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "job state transition");
        self.state = next;
    }

    /// Registers an additional path to unlink on abort.
    pub fn register_cleanup_path(&mut self, path: PathBuf) {
        self.cleanup_paths.push(path);
    }

    /// Marks the job as successfully completed, disarming the `Drop`
    /// cleanup so the finished output file is left in place.
    pub fn mark_completed(&mut self) {
        self.transition(JobState::Completed);
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Requests cancellation; honored at every suspension point by workers
    /// holding a clone of `cancel`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn run_cleanup(&self) {
        for path in &self.cleanup_paths {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::info!(?path, "removed partial output on abort"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(?path, error = %e, "failed to remove partial output"),
            }
        }
    }
}

impl Drop for DownloadJob {
    fn drop(&mut self) {
        if !self.completed.load(Ordering::SeqCst) {
            self.run_cleanup();
        }
    }
}
