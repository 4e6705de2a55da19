//! Output writers: the two strategies the fetch coordinator chooses between
//! to get bytes from the network onto disk.

pub mod buffered;
pub mod direct;

use std::path::Path;

use tokio::fs::OpenOptions;

use crate::error::Result;

/// Pre-sizes the output file: truncates to `size` if `pre_allocate` is
/// requested, otherwise just ensures the file exists empty (lazy
/// extension handled by each writer's own seeks/mmap length).
pub async fn prepare_output_file(path: &Path, size: u64, pre_allocate: bool) -> Result<()> {
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path).await?;

    if pre_allocate {
        file.set_len(size).await?;
    }
    Ok(())
}
