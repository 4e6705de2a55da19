//! Buffered (RAM-staged) writer: each worker stages its reads in a
//! [`crate::buffer::ChunkBuffer`] and emits coalesced blobs into a single
//! memory map shared (read disjointly) across all workers.

use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;
use tokio::sync::Mutex;

use crate::error::Result;

/// A memory map over the whole output file, opened once by the coordinator
/// and shared (via `Arc`) across workers. Each worker writes into its own
/// disjoint byte range; the platform guarantees safe concurrent writes to
/// non-overlapping regions of the same mapping, so the only synchronization
/// needed here is around the (cheap) `flush` call.
pub struct BufferedFileMap {
    mmap: Mutex<MmapMut>,
}

impl BufferedFileMap {
    /// Opens `path` for read-write mmap access, truncating/extending it to
    /// exactly `size` bytes first (mmap requires a backing file of the
    /// target length).
    pub fn open(path: &Path, size: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        let current_len = file.metadata()?.len();
        if current_len != size {
            file.set_len(size)?;
        }
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { mmap: Mutex::new(mmap) })
    }

    /// Writes `data` at absolute file offset `position` and flushes just
    /// that byte range.
    pub async fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut mmap = self.mmap.lock().await;
        let start = position as usize;
        let end = start + data.len();
        mmap[start..end].copy_from_slice(data);
        mmap.flush_range(start, data.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disjoint_writes_land_at_correct_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.bin");
        let map = BufferedFileMap::open(&path, 100).unwrap();

        map.write_at(0, &[1u8; 40]).await.unwrap();
        map.write_at(40, &[2u8; 60]).await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 100);
        assert!(contents[0..40].iter().all(|&b| b == 1));
        assert!(contents[40..100].iter().all(|&b| b == 2));
    }

    #[tokio::test]
    async fn reopen_on_existing_file_resizes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.bin");
        std::fs::write(&path, vec![9u8; 10]).unwrap();

        let map = BufferedFileMap::open(&path, 50).unwrap();
        map.write_at(0, &[7u8; 5]).await.unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 50);
    }
}
