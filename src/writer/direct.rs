//! Direct writer: locked random-access writes straight to the pre-sized
//! output file, no RAM staging.

use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::Mutex;

use crate::error::Result;

/// A single shared file handle guarded by a lock held only across one
/// `seek + write` pair, so concurrent workers never race on the file
/// position. The on-disk byte at absolute offset `k` equals the remote
/// byte at `k` once every worker has completed.
pub struct DirectFileWriter {
    file: Mutex<tokio::fs::File>,
}

impl DirectFileWriter {
    /// Opens `path` for read-write random access. The caller is responsible
    /// for having already pre-sized (or at least created) the file.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path).await?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Writes `data` at absolute file offset `position`, holding the write
    /// lock only for the duration of the seek+write.
    pub async fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(position)).await?;
        file.write_all(data).await?;
        Ok(())
    }
}
