//! File-backed convenience constructors layered on top of [`ShmQueue`].
//!
//! `ShmQueue` itself only knows about an in-process byte slice; it has no
//! opinion on where that slice comes from. For the common case of two
//! processes sharing a queue through a memory-mapped file, [`MappedQueue`]
//! owns the [`memmap2::MmapMut`] and hands `ShmQueue` a view into it.

use crate::error::QueueError;
use crate::layout::MIN_REGION_SIZE;
use crate::metrics::MetricsSnapshot;
use crate::ring::ShmQueue;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// Errors from the file-backed convenience constructors.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Opening, sizing, or mapping the backing file failed.
    #[error("I/O error mapping the backing file: {0}")]
    Io(#[from] io::Error),

    /// The mapped region itself was rejected by [`ShmQueue`].
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// An [`ShmQueue`] whose region is a memory-mapped file.
///
/// Dropping a `MappedQueue` unmaps the file but leaves its contents on disk,
/// so a peer process (or a later `restore_mapped` call) can still attach to
/// it.
pub struct MappedQueue {
    // Kept alive so the mapping backing `queue` stays valid; never read
    // directly once `queue` is constructed.
    _mmap: MmapMut,
    queue: ShmQueue,
}

impl MappedQueue {
    /// Creates (or truncates) the file at `path` to `region_len` bytes, maps
    /// it, and initializes a fresh queue over the mapping.
    ///
    /// `region_len` must be at least [`crate::MIN_REGION_SIZE`].
    pub fn create_mapped(path: impl AsRef<Path>, region_len: usize) -> Result<Self, MappingError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(region_len as u64)?;

        // SAFETY: the file was just created/truncated by us and is not
        // concurrently mapped elsewhere in this process; memmap2's usual
        // caveat about external truncation applies to the backing file for
        // the lifetime of the mapping, same as any mmap-based IPC.
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        let queue = ShmQueue::create(&mut mmap)?;
        Ok(Self { _mmap: mmap, queue })
    }

    /// Maps the already-initialized file at `path` and attaches to its
    /// existing queue state via [`ShmQueue::restore`].
    pub fn restore_mapped(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < MIN_REGION_SIZE {
            return Err(MappingError::Queue(QueueError::RegionTooSmall {
                actual: len,
                required: MIN_REGION_SIZE,
            }));
        }

        // SAFETY: see `create_mapped`.
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        let queue = ShmQueue::restore(&mut mmap)?;
        Ok(Self { _mmap: mmap, queue })
    }

    /// Borrows the underlying queue handle.
    #[must_use]
    pub fn queue(&self) -> &ShmQueue {
        &self.queue
    }

    /// Flushes pending writes to the backing file.
    pub fn flush(&self) -> io::Result<()> {
        self._mmap.flush()
    }
}

impl std::ops::Deref for MappedQueue {
    type Target = ShmQueue;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}
