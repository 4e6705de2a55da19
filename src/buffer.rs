//! Per-worker chunk buffer: coalesces small network reads into large
//! sequential writes, bounded by a per-worker RAM cap.
//!
//! Ported from the `ChunkBuffer` class in the original Python implementation
//! (`downloader.py`), generalized to the design spec's mandate that a write
//! which the buffer would otherwise refuse must never drop bytes: callers
//! use [`ChunkBuffer::write_blocking`] to back-pressure until the buffer
//! genuinely absorbs the data rather than silently discarding it.

use crate::constants::{DEFAULT_CHUNK_BUFFER_SIZE, MAX_BUFFER_RAM_FRACTION, MAX_BUFFER_SIZE};
use crate::fsguard::available_ram_bytes;

/// A single-producer/single-consumer staging buffer for one worker's byte
/// range.
pub struct ChunkBuffer {
    chunk_size: u64,
    max_buffer_size: u64,
    current: Vec<u8>,
    current_size: u64,
    total_buffered: u64,
}

impl ChunkBuffer {
    /// Builds a buffer with the default chunk size, capped at the minimum of
    /// `MAX_BUFFER_SIZE` and 30% of available RAM sampled right now.
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_CHUNK_BUFFER_SIZE, MAX_BUFFER_SIZE)
    }

    /// Builds a buffer with an explicit chunk size and buffer cap (still
    /// subject to the 30%-of-available-RAM ceiling).
    pub fn with_sizes(chunk_size: u64, max_buffer_bytes: u64) -> Self {
        let ram_cap = (available_ram_bytes() as f64 * MAX_BUFFER_RAM_FRACTION) as u64;
        Self {
            chunk_size,
            max_buffer_size: max_buffer_bytes.min(ram_cap.max(1)),
            current: Vec::new(),
            current_size: 0,
            total_buffered: 0,
        }
    }

    /// Bytes buffered but not yet emitted.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Lifetime bytes absorbed by this buffer (never reset).
    pub fn total_buffered(&self) -> u64 {
        self.total_buffered
    }

    /// Attempts to append `data` to the buffer.
    ///
    /// Returns `Some(blob)` if an emission trigger fired (the blob is the
    /// full contents accumulated since the last emission, and the internal
    /// storage is reset), `None` if `data` was absorbed but no trigger
    /// fired, or `Err(data)` (handing the caller its bytes back, unwritten)
    /// if appending would violate a bound and the write was refused.
    pub fn write(&mut self, data: &[u8], file_size: u64) -> std::result::Result<Option<Vec<u8>>, ()> {
        let len = data.len() as u64;

        if self.current_size + len > self.max_buffer_size {
            return Err(());
        }
        if self.total_buffered + len > self.max_buffer_size {
            return Err(());
        }
        if self.total_buffered + len > file_size {
            return Err(());
        }

        self.current.extend_from_slice(data);
        self.current_size += len;
        self.total_buffered += len;

        if self.current_size >= self.chunk_size
            || self.total_buffered >= file_size
            || self.current_size >= self.max_buffer_size
        {
            let blob = std::mem::take(&mut self.current);
            self.current_size = 0;
            Ok(Some(blob))
        } else {
            Ok(None)
        }
    }

    /// As [`ChunkBuffer::write`], but never refuses: if the buffer would
    /// otherwise reject the write, the caller awaits a drain point and
    /// retries. The design spec forbids ever dropping bytes on refusal; in
    /// steady state this path is unreachable because the coordinator sizes
    /// each worker's range so that `total_buffered` can never exceed it, but
    /// it is kept as a defensive backstop rather than an assumption.
    pub async fn write_blocking(&mut self, data: &[u8], file_size: u64) -> Option<Vec<u8>> {
        loop {
            match self.write(data, file_size) {
                Ok(blob) => return blob,
                Err(()) => {
                    // Give the consumer (the mmap writer) a chance to drain
                    // before retrying the same write.
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    /// Flushes any residual buffered bytes at stream end. Returns `None` if
    /// the buffer was already empty.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.current.is_empty() {
            None
        } else {
            self.current_size = 0;
            Some(std::mem::take(&mut self.current))
        }
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}
