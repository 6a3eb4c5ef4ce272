//! In-memory page storage implementation.

use parking_lot::Mutex;

use super::{Storage, check_live_run, check_run_len, find_free_run};
use crate::storage::error::StorageError;
use crate::storage::page::PageData;
use crate::storage::page::{PAGE_SIZE, PageId};

/// In-memory page storage for testing and development.
///
/// PageIds are indices into a slot vector; a deallocated slot holds `None`
/// until an allocation reuses it. All operations are synchronous but wrapped
/// in async for trait compatibility.
pub struct MemoryStorage {
    pages: Mutex<Vec<Option<PageData>>>,
    max_pages: Option<usize>,
}

impl MemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            max_pages: None,
        }
    }

    /// Creates a storage that refuses to hold more than `max_pages` live pages.
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            max_pages: Some(max_pages),
        }
    }

    /// Returns whether `page_id` is currently allocated.
    pub fn is_live(&self, page_id: PageId) -> bool {
        let pages = self.pages.lock();
        matches!(pages.get(page_id.page_num() as usize), Some(Some(_)))
    }
}

fn check_buffer(len: usize) -> Result<(), StorageError> {
    if len != PAGE_SIZE {
        return Err(StorageError::InvalidBufferSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

impl Storage for MemoryStorage {
    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        check_buffer(buf.len())?;

        let pages = self.pages.lock();
        let page = pages
            .get(page_id.page_num() as usize)
            .and_then(Option::as_ref)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        check_buffer(buf.len())?;

        let mut pages = self.pages.lock();
        let page = pages
            .get_mut(page_id.page_num() as usize)
            .and_then(Option::as_mut)
            .ok_or(StorageError::PageNotFound(page_id))?;

        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_pages(&self, count: usize) -> Result<PageId, StorageError> {
        check_run_len(count)?;

        let mut pages = self.pages.lock();
        if let Some(max) = self.max_pages {
            let live = pages.iter().filter(|p| p.is_some()).count();
            if live + count > max {
                return Err(StorageError::StorageFull);
            }
        }

        let live: Vec<bool> = pages.iter().map(Option::is_some).collect();
        let run = find_free_run(&live, count)?;
        if pages.len() < run.end {
            pages.resize_with(run.end, || None);
        }
        let first = PageId::new(run.start as u64);
        for slot in &mut pages[run] {
            *slot = Some(PageData::new());
        }

        Ok(first)
    }

    async fn deallocate_pages(&self, first: PageId, count: usize) -> Result<(), StorageError> {
        let mut pages = self.pages.lock();
        let live: Vec<bool> = pages.iter().map(Option::is_some).collect();
        check_live_run(&live, first, count)?;

        let start = first.page_num() as usize;
        for slot in &mut pages[start..start + count] {
            *slot = None;
        }
        Ok(())
    }

    async fn page_count(&self) -> usize {
        self.pages.lock().iter().filter(|p| p.is_some()).count()
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
