//! Progress sink: an output-only capability the fetch engine reports into.
//!
//! Rendering a terminal progress bar is out of scope for this crate —
//! callers that want a visible progress bar implement [`ProgressSink`]
//! themselves (e.g. wrapping `indicatif`, or forwarding into a GUI event
//! channel). All that's required here is the trait contract and a no-op
//! default.

use std::sync::atomic::{AtomicU64, Ordering};

/// A task handle returned by [`ProgressSink::add_task`].
pub type TaskId = u64;

/// Output-only capability for reporting incremental byte progress.
///
/// Implementations must tolerate concurrent `advance` calls from multiple
/// workers (the fetch coordinator spawns one task per range and each
/// reports independently).
pub trait ProgressSink: Send + Sync {
    /// Register a new task with the given total size (in bytes), returning
    /// an id to use in subsequent `advance`/`finish` calls.
    fn add_task(&self, total: u64) -> TaskId;

    /// Report that `n` additional bytes have been processed for `task`.
    fn advance(&self, task: TaskId, n: u64);

    /// Mark `task` as complete.
    fn finish(&self, task: TaskId);
}

/// A sink that discards all progress reports. The default for callers that
/// don't care about progress display.
#[derive(Debug, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn add_task(&self, _total: u64) -> TaskId {
        0
    }

    fn advance(&self, _task: TaskId, _n: u64) {}

    fn finish(&self, _task: TaskId) {}
}

/// A minimal sink that just accumulates total bytes reported, useful for
/// tests and for embedding behind a channel-based renderer.
#[derive(Debug, Default)]
pub struct CountingProgressSink {
    total: AtomicU64,
}

impl CountingProgressSink {
    /// Bytes advanced across all tasks so far.
    pub fn total_advanced(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ProgressSink for CountingProgressSink {
    fn add_task(&self, _total: u64) -> TaskId {
        0
    }

    fn advance(&self, _task: TaskId, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    fn finish(&self, _task: TaskId) {}
}
