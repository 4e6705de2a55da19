//! Fetch coordinator: spawns one task per [`ChunkRange`], drives worker
//! retries, honors cancellation, and performs filename resolution plus
//! partial-failure cleanup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::buffer::ChunkBuffer;
use crate::constants::WORKER_MAX_RETRIES;
use crate::error::{DownloadError, Result};
use crate::partition::ChunkRange;
use crate::probe::RemoteFileInfo;
use crate::progress::ProgressSink;
use crate::writer::buffered::BufferedFileMap;
use crate::writer::direct::DirectFileWriter;

/// Either writer a worker can target; chosen once per job.
enum WriterTarget {
    Direct(Arc<DirectFileWriter>),
    Buffered(Arc<BufferedFileMap>),
}

async fn backoff_sleep(attempt: u32) {
    let ms = (1000u64 * 2u64.pow(attempt.saturating_sub(1))).clamp(1000, 10_000);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Drives a single worker's range to completion, retrying transient
/// failures by resuming the `Range` request from the last durably-written
/// offset rather than restarting the whole range.
#[allow(clippy::too_many_arguments)]
async fn run_range_worker(
    client: Client,
    url: String,
    headers: header::HeaderMap,
    range: ChunkRange,
    writer: WriterTarget,
    progress: Arc<dyn ProgressSink>,
    task_id: crate::progress::TaskId,
    cancel: CancellationToken,
    downloaded_total: Arc<AtomicU64>,
    inactivity_timeout: Duration,
) -> Result<()> {
    let mut cursor = range.start;
    // Relative offset into the worker's own range where the next emitted
    // (buffered mode) or written (direct mode) byte lands.
    let mut write_position: u64 = 0;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::DownloadInterrupted);
        }
        attempt += 1;

        let remaining_len = range.end - cursor + 1;
        let header_value = if cursor == range.start {
            range.as_header_value()
        } else {
            Some(format!("bytes={}-{}", cursor, range.end))
        };

        let mut req = client.get(&url).headers(headers.clone());
        if let Some(h) = header_value {
            req = req.header(header::RANGE, h);
        }

        // The inactivity timeout bounds every suspension point, not just the
        // body stream: a server that accepts the connection but never sends
        // response headers must be treated the same as a stalled read.
        let send_result = tokio::time::timeout(inactivity_timeout, req.send()).await;

        let resp = match send_result {
            Ok(Ok(resp)) if resp.status().is_success() || resp.status() == StatusCode::PARTIAL_CONTENT => resp,
            Ok(Ok(resp)) if resp.status().is_server_error() => {
                if attempt >= WORKER_MAX_RETRIES {
                    return Err(DownloadError::Download(format!(
                        "worker for range {}-{} got server error {}",
                        range.start, range.end, resp.status()
                    )));
                }
                tracing::warn!(range_start = range.start, attempt, status = %resp.status(), "worker got server error, retrying");
                backoff_sleep(attempt).await;
                continue;
            }
            Ok(Ok(resp)) => {
                return Err(DownloadError::Download(format!(
                    "worker for range {}-{} got unexpected status {}",
                    range.start, range.end, resp.status()
                )))
            }
            Ok(Err(e)) if is_retryable(&e) => {
                if attempt >= WORKER_MAX_RETRIES {
                    return Err(DownloadError::Download(e.to_string()));
                }
                tracing::warn!(range_start = range.start, attempt, error = %e, "worker request failed, retrying");
                backoff_sleep(attempt).await;
                continue;
            }
            Ok(Err(e)) => return Err(DownloadError::Download(e.to_string())),
            Err(_elapsed) => {
                if attempt >= WORKER_MAX_RETRIES {
                    return Err(DownloadError::Download(format!(
                        "worker for range {}-{} timed out waiting for response headers",
                        range.start, range.end
                    )));
                }
                tracing::warn!(range_start = range.start, attempt, "worker timed out waiting for response headers, retrying");
                backoff_sleep(attempt).await;
                continue;
            }
        };

        let mut buffer = matches!(writer, WriterTarget::Buffered(_)).then(|| {
            ChunkBuffer::with_sizes(crate::constants::DEFAULT_CHUNK_BUFFER_SIZE, crate::constants::MAX_BUFFER_SIZE)
        });

        let stream_result = drive_stream(
            resp,
            &range,
            &writer,
            buffer.as_mut(),
            &mut cursor,
            &mut write_position,
            remaining_len,
            &progress,
            task_id,
            &cancel,
            &downloaded_total,
            inactivity_timeout,
        )
        .await;

        match stream_result {
            Ok(()) => return Ok(()),
            Err(WorkerError::Cancelled) => return Err(DownloadError::DownloadInterrupted),
            Err(WorkerError::Transient(msg)) => {
                if attempt >= WORKER_MAX_RETRIES {
                    return Err(DownloadError::Download(msg));
                }
                tracing::warn!(range_start = range.start, attempt, %msg, "worker stream failed, retrying from cursor");
                backoff_sleep(attempt).await;
            }
            Err(WorkerError::Fatal(msg)) => return Err(DownloadError::Download(msg)),
        }
    }
}

enum WorkerError {
    Cancelled,
    Transient(String),
    Fatal(String),
}

#[allow(clippy::too_many_arguments)]
async fn drive_stream(
    resp: reqwest::Response,
    range: &ChunkRange,
    writer: &WriterTarget,
    mut buffer: Option<&mut ChunkBuffer>,
    cursor: &mut u64,
    write_position: &mut u64,
    remaining_len: u64,
    progress: &Arc<dyn ProgressSink>,
    task_id: crate::progress::TaskId,
    cancel: &CancellationToken,
    downloaded_total: &Arc<AtomicU64>,
    inactivity_timeout: Duration,
) -> std::result::Result<(), WorkerError> {
    let mut stream = resp.bytes_stream();

    loop {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        let next = match tokio::time::timeout(inactivity_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Err(WorkerError::Transient("inactivity timeout waiting for next chunk".into())),
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) if is_retryable(&e) => return Err(WorkerError::Transient(e.to_string())),
            Some(Err(e)) => return Err(WorkerError::Fatal(e.to_string())),
            None => break,
        };

        let len = chunk.len() as u64;
        downloaded_total.fetch_add(len, Ordering::Relaxed);
        progress.advance(task_id, len);

        match writer {
            WriterTarget::Direct(w) => {
                w.write_at(*cursor, &chunk).await.map_err(|e| WorkerError::Fatal(e.to_string()))?;
                *cursor += len;
            }
            WriterTarget::Buffered(map) => {
                let buffer = buffer.as_deref_mut().expect("buffered writer always has a buffer");
                if let Some(blob) = buffer.write_blocking(&chunk, remaining_len).await {
                    map.write_at(range.start + *write_position, &blob)
                        .await
                        .map_err(|e| WorkerError::Fatal(e.to_string()))?;
                    *write_position += blob.len() as u64;
                    *cursor = range.start + *write_position;
                }
            }
        }
    }

    if let WriterTarget::Buffered(map) = writer {
        let buffer = buffer.as_deref_mut().expect("buffered writer always has a buffer");
        if let Some(residual) = buffer.flush() {
            map.write_at(range.start + *write_position, &residual)
                .await
                .map_err(|e| WorkerError::Fatal(e.to_string()))?;
            *write_position += residual.len() as u64;
            *cursor = range.start + *write_position;
        }
    }

    Ok(())
}

/// Spawns one task per range, awaits them all, and cancels the rest on the
/// first failure. Returns the total bytes durably written.
pub async fn run(
    client: Client,
    url: String,
    headers: header::HeaderMap,
    ranges: Vec<ChunkRange>,
    output_path: &Path,
    total_size: u64,
    use_ram_buffer: bool,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    inactivity_timeout: Duration,
) -> Result<u64> {
    let writer_template: WriterTarget = if use_ram_buffer {
        WriterTarget::Buffered(Arc::new(BufferedFileMap::open(output_path, total_size)?))
    } else {
        WriterTarget::Direct(Arc::new(DirectFileWriter::open(output_path).await?))
    };

    let downloaded_total = Arc::new(AtomicU64::new(0));
    let task_id = progress.add_task(total_size);

    let mut futs = FuturesUnordered::new();
    for range in &ranges {
        let writer = match &writer_template {
            WriterTarget::Direct(w) => WriterTarget::Direct(w.clone()),
            WriterTarget::Buffered(m) => WriterTarget::Buffered(m.clone()),
        };
        let client = client.clone();
        let url = url.clone();
        let headers = headers.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        let downloaded_total = downloaded_total.clone();
        let range = *range;

        futs.push(tokio::spawn(async move {
            run_range_worker(
                client,
                url,
                headers,
                range,
                writer,
                progress,
                task_id,
                cancel,
                downloaded_total,
                inactivity_timeout,
            )
            .await
        }));
    }

    let mut first_error: Option<DownloadError> = None;
    while let Some(joined) = futs.next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(DownloadError::Download(join_err.to_string()));
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    progress.finish(task_id);

    let written = downloaded_total.load(Ordering::Relaxed);
    if written != total_size {
        return Err(DownloadError::Download(format!(
            "final size mismatch: wrote {written}, expected {total_size}"
        )));
    }
    Ok(written)
}

/// Resolves the final output path: appends the server-suggested filename
/// if `requested` is a directory, then applies the overwrite/collision
/// policy (append `_1`, `_2`, ... before the extension).
pub fn resolve_output_path(requested: &Path, info: &RemoteFileInfo, overwrite: bool) -> PathBuf {
    let mut path = if requested.is_dir() {
        requested.join(&info.filename)
    } else {
        requested.to_path_buf()
    };

    if overwrite {
        return path;
    }

    if !path.exists() {
        return path;
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path.extension().map(|s| s.to_string_lossy().into_owned());
    let parent = path.parent().map(|p| p.to_path_buf()).unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate_name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            path = candidate;
            break;
        }
        counter += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_info(filename: &str) -> RemoteFileInfo {
        RemoteFileInfo {
            url: "https://example.com/x".into(),
            filename: filename.into(),
            mimetype: "application/octet-stream".into(),
            size: 100,
        }
    }

    #[test]
    fn appends_filename_when_output_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_output_path(dir.path(), &dummy_info("video.mp4"), true);
        assert_eq!(resolved, dir.path().join("video.mp4"));
    }

    #[test]
    fn overwrite_false_appends_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x.bin");
        std::fs::write(&target, b"one").unwrap();
        std::fs::write(dir.path().join("x_1.bin"), b"two").unwrap();

        let resolved = resolve_output_path(&target, &dummy_info("x.bin"), false);
        assert_eq!(resolved, dir.path().join("x_2.bin"));
    }

    #[test]
    fn overwrite_true_keeps_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x.bin");
        std::fs::write(&target, b"one").unwrap();

        let resolved = resolve_output_path(&target, &dummy_info("x.bin"), true);
        assert_eq!(resolved, target);
    }

    #[test]
    fn no_collision_returns_requested_path_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("fresh.bin");
        let resolved = resolve_output_path(&target, &dummy_info("fresh.bin"), false);
        assert_eq!(resolved, target);
    }
}
