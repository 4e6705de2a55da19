//! High-throughput single-file downloader core.
//!
//! Accelerates retrieval of one known remote resource by issuing multiple
//! concurrent HTTP byte-range requests against the same URL and assembling
//! the result into one local file, with optional post-download hash
//! verification. Three cooperating subsystems: the planner
//! ([`probe`] + [`sizing`] + [`partition`]), the parallel fetch engine
//! ([`coordinator`] + [`writer`] + [`buffer`]), and the integrity pipeline
//! ([`fsguard`] + [`hash`]).
//!
//! No CLI, no terminal progress rendering, no resumable-across-restart
//! downloads: embed this as a library and drive it from your own surface.

mod buffer;
mod constants;
mod coordinator;
mod downloader;
mod error;
mod fsguard;
mod hash;
mod job;
mod partition;
mod probe;
mod progress;
mod sizing;
mod writer;

pub use downloader::{ConnectionMode, DownloadOutcome, DownloadRequest, Downloader, DownloaderBuilder, RamBufferMode};
pub use error::{DownloadError, Result};
pub use hash::HashAlgorithm;
pub use partition::ChunkRange;
pub use probe::RemoteFileInfo;
pub use progress::{CountingProgressSink, NoopProgressSink, ProgressSink, TaskId};
