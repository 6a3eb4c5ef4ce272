//! File-backed storage implementation.

use std::path::{Path, PathBuf};

use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{Storage, check_live_run, check_run_len, find_free_run};
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// File-backed storage implementation.
///
/// Stores pages as contiguous 8KB blocks in a single file.
/// Uses `tokio::fs` for async file I/O.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// # Liveness
///
/// Which pages are allocated is tracked in memory only. Every page present
/// in the file when it is opened counts as live; deallocated pages are
/// zeroed on disk and their slots reused by later allocations.
pub struct FileStorage {
    /// Path to the storage file
    path: PathBuf,
    /// File handle and liveness map, serialized behind one async mutex
    inner: Mutex<FileInner>,
}

struct FileInner {
    file: TokioFile,
    live: Vec<bool>,
}

impl FileInner {
    async fn write_at(&mut self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        self.file
            .seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        self.file.write_all(buf).await?;
        Ok(())
    }

    async fn zero_run(&mut self, first: PageId, count: usize) -> Result<(), StorageError> {
        let zeros = vec![0u8; PAGE_SIZE];
        for n in 0..count as u64 {
            self.write_at(first.offset(n), &zeros).await?;
        }
        Ok(())
    }

    fn is_live(&self, page_id: PageId) -> bool {
        self.live
            .get(page_id.page_num() as usize)
            .copied()
            .unwrap_or(false)
    }
}

impl FileStorage {
    /// Opens or creates a storage file at the given path.
    ///
    /// If the file exists, its page count is calculated from file size.
    /// If the file doesn't exist, it is created empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a multiple
    /// of PAGE_SIZE.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        let page_count = (file_size / PAGE_SIZE as u64) as usize;
        tracing::debug!(path = %path.display(), page_count, "opened file storage");

        Ok(Self {
            path,
            inner: Mutex::new(FileInner {
                file,
                live: vec![true; page_count],
            }),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock().await;
        if !inner.is_live(page_id) {
            return Err(StorageError::PageNotFound(page_id));
        }

        inner
            .file
            .seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        inner.file.read_exact(buf).await?;

        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut inner = self.inner.lock().await;
        if !inner.is_live(page_id) {
            return Err(StorageError::PageNotFound(page_id));
        }

        inner.write_at(page_id, buf).await
    }

    async fn allocate_pages(&self, count: usize) -> Result<PageId, StorageError> {
        check_run_len(count)?;

        let mut inner = self.inner.lock().await;
        let run = find_free_run(&inner.live, count)?;
        let first = PageId::new(run.start as u64);

        // Writing the run also grows the file for slots past the end.
        inner.zero_run(first, count).await?;

        if inner.live.len() < run.end {
            inner.live.resize(run.end, false);
        }
        inner.live[run].fill(true);

        Ok(first)
    }

    async fn deallocate_pages(&self, first: PageId, count: usize) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        check_live_run(&inner.live, first, count)?;

        inner.zero_run(first, count).await?;

        let start = first.page_num() as usize;
        inner.live[start..start + count].fill(false);
        Ok(())
    }

    async fn page_count(&self) -> usize {
        self.inner.lock().await.live.iter().filter(|&&l| l).count()
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let inner = self.inner.lock().await;
        inner.file.sync_all().await?;
        Ok(())
    }
}
