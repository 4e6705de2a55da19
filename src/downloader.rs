//! Public entry point: the `Downloader` builder and the `download()`
//! orchestration that ties the planner, fetch engine and integrity
//! pipeline together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;

use crate::constants::{DEFAULT_INACTIVITY_TIMEOUT_SECS, RESERVED_HEADERS};
use crate::coordinator;
use crate::error::{DownloadError, Result};
use crate::fsguard;
use crate::hash::{self, HashAlgorithm};
use crate::job::{DownloadJob, JobState};
use crate::partition::generate_chunk_ranges;
use crate::probe::{self, RemoteFileInfo};
use crate::progress::{NoopProgressSink, ProgressSink};
use crate::sizing::calculate_connections;

/// How many concurrent range workers to use.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionMode {
    /// Resolve the worker count from [`crate::sizing::calculate_connections`].
    Auto,
    /// Use exactly this many workers, clamped to `1..=32`.
    Explicit(u8),
}

/// Whether the fetch engine stages writes through a RAM-backed
/// [`crate::buffer::ChunkBuffer`] + mmap, or writes directly under a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamBufferMode {
    /// Enable RAM staging only when the output path is not itself on a
    /// volatile RAM-backed filesystem (no point double-buffering tmpfs).
    Auto,
    Always,
    Never,
}

/// Builder for a [`Downloader`]: the long-lived, reusable client plus the
/// tuning knobs that apply to every download it performs.
pub struct DownloaderBuilder {
    max_connections: ConnectionMode,
    connection_speed_mbps: f64,
    ram_buffer: RamBufferMode,
    headers: HeaderMap,
    progress: Arc<dyn ProgressSink>,
}

impl Default for DownloaderBuilder {
    fn default() -> Self {
        Self {
            max_connections: ConnectionMode::Auto,
            connection_speed_mbps: 100.0,
            ram_buffer: RamBufferMode::Auto,
            headers: HeaderMap::new(),
            progress: Arc::new(NoopProgressSink),
        }
    }
}

impl DownloaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, mode: ConnectionMode) -> Self {
        self.max_connections = mode;
        self
    }

    pub fn connection_speed_mbps(mut self, mbps: f64) -> Self {
        self.connection_speed_mbps = mbps;
        self
    }

    pub fn ram_buffer(mut self, mode: RamBufferMode) -> Self {
        self.ram_buffer = mode;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Adds a custom header sent with every probe and fetch request.
    /// Rejects any name in [`RESERVED_HEADERS`].
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        if RESERVED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return Err(DownloadError::InvalidArgument(format!("header {name:?} is reserved")));
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DownloadError::InvalidArgument(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| DownloadError::InvalidArgument(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn build(self) -> Result<Downloader> {
        if self.connection_speed_mbps <= 0.0 {
            return Err(DownloadError::InvalidArgument("connection_speed_mbps must be positive".into()));
        }
        if let ConnectionMode::Explicit(n) = self.max_connections {
            if !(1..=32).contains(&n) {
                return Err(DownloadError::InvalidArgument(format!(
                    "max_connections must be in 1..=32, got {n}"
                )));
            }
        }

        let mut headers = self.headers.clone();
        headers.insert(reqwest::header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| DownloadError::InvalidArgument(e.to_string()))?;

        Ok(Downloader {
            client,
            headers,
            max_connections: self.max_connections,
            connection_speed_mbps: self.connection_speed_mbps,
            ram_buffer: self.ram_buffer,
            progress: self.progress,
        })
    }
}

/// Per-download options, mirroring the Python original's keyword-argument
/// surface.
pub struct DownloadRequest {
    pub url: String,
    pub output_path: PathBuf,
    pub pre_allocate_space: bool,
    pub overwrite: bool,
    pub inactivity_timeout: Duration,
    pub timeout: Option<Duration>,
    pub expected_hash: Option<String>,
    pub hash_algorithm: HashAlgorithm,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_path: output_path.into(),
            pre_allocate_space: true,
            overwrite: true,
            inactivity_timeout: Duration::from_secs(DEFAULT_INACTIVITY_TIMEOUT_SECS),
            timeout: None,
            expected_hash: None,
            hash_algorithm: HashAlgorithm::Md5,
        }
    }

    pub fn pre_allocate_space(mut self, v: bool) -> Self {
        self.pre_allocate_space = v;
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.overwrite = v;
        self
    }

    pub fn inactivity_timeout(mut self, d: Duration) -> Self {
        self.inactivity_timeout = d;
        self
    }

    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    pub fn expect_hash(mut self, digest: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        self.expected_hash = Some(digest.into());
        self.hash_algorithm = algorithm;
        self
    }
}

/// What a successful `download()` call produced.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub file_info: RemoteFileInfo,
}

/// The reusable, thread-safe download engine. Construct once via
/// [`DownloaderBuilder`] and issue many [`Downloader::download`] calls.
pub struct Downloader {
    client: Client,
    headers: HeaderMap,
    max_connections: ConnectionMode,
    connection_speed_mbps: f64,
    ram_buffer: RamBufferMode,
    progress: Arc<dyn ProgressSink>,
}

impl Downloader {
    pub fn builder() -> DownloaderBuilder {
        DownloaderBuilder::new()
    }

    /// Runs the full planner → fetch → integrity pipeline for one request.
    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome> {
        if request.url.trim().is_empty() {
            return Err(DownloadError::InvalidArgument("url must not be empty".into()));
        }

        tracing::info!(url = %request.url, "probing remote file");
        let info = probe::fetch_file_info(&self.client, &request.url, &self.headers).await?;

        let output_path = coordinator::resolve_output_path(&request.output_path, &info, request.overwrite);
        let mut job = DownloadJob::new(output_path.clone(), request.hash_algorithm);
        job.transition(JobState::Probed);

        fsguard::ensure_enough_space(&output_path, info.size)?;

        let connections = match self.max_connections {
            ConnectionMode::Auto => calculate_connections(info.size, self.connection_speed_mbps),
            ConnectionMode::Explicit(n) => n as u32,
        };
        let ranges = generate_chunk_ranges(info.size, connections);
        job.ranges = ranges.clone();
        job.transition(JobState::Planned);

        let use_ram_buffer = match self.ram_buffer {
            RamBufferMode::Always => true,
            RamBufferMode::Never => false,
            RamBufferMode::Auto => !fsguard::is_ram_backed(&output_path),
        };

        crate::writer::prepare_output_file(&output_path, info.size, request.pre_allocate_space).await?;
        job.transition(JobState::Allocated);

        tracing::info!(url = %request.url, connections, size = info.size, ram_buffer = use_ram_buffer, "starting fetch");
        job.transition(JobState::Fetching);

        let fetch = coordinator::run(
            self.client.clone(),
            info.url.clone(),
            self.headers.clone(),
            ranges,
            &output_path,
            info.size,
            use_ram_buffer,
            self.progress.clone(),
            job.cancel.clone(),
            request.inactivity_timeout,
        );

        let bytes_written = match request.timeout {
            Some(overall) => match tokio::time::timeout(overall, fetch).await {
                Ok(result) => result?,
                Err(_) => {
                    job.cancel();
                    return Err(DownloadError::DownloadInterrupted);
                }
            },
            None => fetch.await?,
        };

        if let Some(expected) = &request.expected_hash {
            tracing::debug!(algorithm = %request.hash_algorithm, "verifying hash");
            hash::verify_hash(&output_path, expected, request.hash_algorithm)?;
        }

        job.mark_completed();

        Ok(DownloadOutcome {
            output_path,
            bytes_written,
            file_info: info,
        })
    }
}
