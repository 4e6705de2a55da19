//! Error taxonomy for the download core.
//!
//! Every failure path surfaces exactly one [`DownloadError`] variant, named
//! after what went wrong rather than any particular transport detail, so
//! callers can match on outcomes without depending on `reqwest`.

use std::path::PathBuf;

/// The error type returned by every fallible operation this crate exposes.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Bad user input: empty URL, an out-of-range `max_connections`, a
    /// non-positive connection speed, or an attempt to override a reserved
    /// header.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server returned an unusable response to the probe (HEAD and the
    /// ranged-GET fallback both failed).
    #[error("remote file error: {0}")]
    RemoteFile(String),

    /// The server advertised a non-positive or missing size.
    #[error("invalid file size reported by server: {0:?}")]
    InvalidFileSize(Option<i64>),

    /// The size of the remote object could not be determined at all; this
    /// core rejects such downloads outright (no unknown-size support).
    #[error("could not determine remote file size for {url}")]
    UnidentifiedFileSize {
        /// The URL that was probed.
        url: String,
    },

    /// The free-space check failed for the destination filesystem.
    #[error("not enough space at {path}: need {required} bytes, {available} available")]
    NotEnoughSpace {
        /// Destination path that was checked.
        path: PathBuf,
        /// Bytes required (file size plus the safety margin).
        required: u64,
        /// Bytes actually free.
        available: u64,
    },

    /// A mid-stream failure after a worker exhausted its retry budget.
    #[error("download failed: {0}")]
    Download(String),

    /// The assembled file's digest did not match the caller-supplied digest.
    #[error("hash verification failed ({algorithm}): expected {expected}, got {actual}")]
    HashVerification {
        /// The algorithm used for verification.
        algorithm: String,
        /// The digest the caller expected.
        expected: String,
        /// The digest actually computed.
        actual: String,
    },

    /// The download was cancelled by the caller (via the job's cancellation
    /// token) before it completed.
    #[error("download interrupted")]
    DownloadInterrupted,

    /// An I/O failure not otherwise classified above (file creation,
    /// pre-allocation, mmap setup, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DownloadError>;
