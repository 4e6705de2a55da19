//! Sizing, chunking and connection constants shared by the planner,
//! partitioner and fetch engine.

/// One mebibyte.
pub const ONE_MB: u64 = 1 << 20;
/// One gibibyte.
pub const ONE_GB: u64 = 1 << 30;

/// Smallest byte range a worker is ever assigned.
pub const MIN_CHUNK_SIZE: u64 = 16 * ONE_MB;
/// Largest byte range a worker is ever assigned.
pub const MAX_CHUNK_SIZE: u64 = 256 * ONE_MB;
/// Default target size for a single coalesced buffered-writer emission.
pub const DEFAULT_CHUNK_BUFFER_SIZE: u64 = 256 * ONE_MB;
/// Upper bound on a single worker's RAM staging buffer, before the 30%
/// of available-RAM cap is applied.
pub const MAX_BUFFER_SIZE: u64 = 2 * ONE_GB;
/// Fraction of available system RAM a single worker's buffer may claim.
pub const MAX_BUFFER_RAM_FRACTION: f64 = 0.30;

/// Lower bound on the number of concurrent range workers.
pub const MIN_CONNECTIONS: u32 = 2;
/// Upper bound on the number of concurrent range workers.
pub const MAX_CONNECTIONS: u32 = 24;

/// Minimum free space, beyond the file's own size, required before a
/// download is allowed to start.
pub const FREE_SPACE_SAFETY_MARGIN: u64 = ONE_GB;

/// Filesystem types treated as volatile/RAM-backed.
pub const RAM_FILESYSTEMS: &[&str] = &["tmpfs", "ramfs", "devtmpfs"];

/// Per-worker network read chunk size cap (direct and buffered writers alike).
pub const NETWORK_READ_CHUNK_SIZE: u64 = ONE_MB;

/// Worker-local retry budget for transient HTTP/connect/timeout errors.
pub const WORKER_MAX_RETRIES: u32 = 5;
/// Probe-level retry budget (HEAD/ranged-GET resolution).
pub const PROBE_MAX_RETRIES: u32 = 3;

/// Default inactivity (read/write idle) timeout.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 120;

/// Headers the caller is never allowed to override.
pub const RESERVED_HEADERS: &[&str] = &["accept-encoding", "range", "connection"];
