//! Page I/O backend implementations.
//!
//! This module provides the `Storage` trait the buffer pool reads through,
//! along with MemoryStorage and FileStorage implementations.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use super::page::{PAGE_SIZE, PageId};
use crate::storage::error::StorageError;

/// Page I/O backend trait for page-based storage.
///
/// Reads and writes whole pages using caller-owned buffers and manages the
/// lifetime of page identifiers through `allocate_pages` and
/// `deallocate_pages`.
///
/// # Contract
///
/// Every call completes or fails as a unit from the caller's point of view.
/// The buffer pool never retries a failed call.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Sync + Send). The buffer pool
/// serializes its own calls; this trait handles only raw I/O.
pub trait Storage: Send + Sync {
    /// Reads a page into caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page is not live.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Overwrites a page in place from caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page is not live.
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn write_page(
        &self,
        page_id: PageId,
        buf: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Reserves `count` contiguous zeroed pages and returns the first id.
    ///
    /// The first allocation on an empty storage is guaranteed to start at
    /// `PageId(0)`. Runs released by `deallocate_pages` may be handed out
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPageCount` if `count` is 0 or exceeds
    /// [`MAX_RUN_PAGES`].
    /// Returns `StorageError::StorageFull` if storage limit is reached.
    fn allocate_pages(
        &self,
        count: usize,
    ) -> impl std::future::Future<Output = Result<PageId, StorageError>> + Send;

    /// Releases `count` pages starting at `first`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` naming the first page of the run
    /// that is not live. In that case nothing is released.
    fn deallocate_pages(
        &self,
        first: PageId,
        count: usize,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Returns the number of live pages.
    fn page_count(&self) -> impl std::future::Future<Output = usize> + Send;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For io::MemoryStorage, this is a no-op.
    fn sync_all(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// Largest run a single `allocate_pages` call may reserve (512MB of pages).
pub const MAX_RUN_PAGES: usize = 1 << 16;

/// Rejects run lengths no backend should try to satisfy.
fn check_run_len(count: usize) -> Result<(), StorageError> {
    if count == 0 || count > MAX_RUN_PAGES {
        return Err(StorageError::InvalidPageCount(count));
    }
    Ok(())
}

/// First-fit search for `count` consecutive free slots in a liveness map.
///
/// Returns the slot range of the run. It starts at `live.len()`, or inside a
/// trailing free hole, when the run has to be appended at the end. Fails
/// with `StorageFull` if the end of the run is not addressable.
fn find_free_run(live: &[bool], count: usize) -> Result<std::ops::Range<usize>, StorageError> {
    let start = first_fit(live, count);
    let end = start
        .checked_add(count)
        .filter(|&end| end as u64 <= u64::MAX / PAGE_SIZE as u64)
        .ok_or(StorageError::StorageFull)?;
    Ok(start..end)
}

fn first_fit(live: &[bool], count: usize) -> usize {
    let mut run_start = 0;
    let mut run_len = 0;
    for (index, &is_live) in live.iter().enumerate() {
        if is_live {
            run_len = 0;
            run_start = index + 1;
        } else {
            run_len += 1;
            if run_len == count {
                return run_start;
            }
        }
    }
    // A trailing free run can be extended by growing the store.
    run_start
}

/// Checks that `first..first + count` is entirely live.
fn check_live_run(live: &[bool], first: PageId, count: usize) -> Result<(), StorageError> {
    if count == 0 {
        return Err(StorageError::InvalidPageCount(count));
    }
    for n in 0..count as u64 {
        let Some(page_num) = first.page_num().checked_add(n) else {
            return Err(StorageError::PageNotFound(first));
        };
        let page_id = PageId::new(page_num);
        match usize::try_from(page_num).ok().and_then(|index| live.get(index)) {
            Some(true) => {}
            _ => return Err(StorageError::PageNotFound(page_id)),
        }
    }
    Ok(())
}
