//! Guards for in-place page access.
//!
//! A guard borrows the frame buffer directly; there is no copy in or out.
//! Guards do not own a pin. The pin belongs to the [`PageHandle`] the guard
//! was obtained from and is released only by an explicit `unpin`.
//!
//! Drop every guard before calling back into the pool: the pool takes its
//! state mutex before frame locks, so holding a guard across a pool call can
//! deadlock against an eviction of the same frame.
//!
//! [`PageHandle`]: super::PageHandle

use std::ops::{Deref, DerefMut};

use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameData;
use crate::storage::PageId;

/// Shared access to a pinned page's bytes.
///
/// Any number of read guards for the same page may coexist.
///
/// # Example
///
/// ```no_run
/// # use pagepool::storage::{MemoryStorage, BufferPool, PageId};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let bpm = BufferPool::with_capacity(MemoryStorage::new(), 16)?;
/// let handle = bpm.pin(PageId::new(0), false).await?;
/// {
///     let page = bpm.read(&handle).await?;
///     println!("First byte: {}", page[0]);
/// }
/// bpm.unpin(handle.page_id(), false).await?;
/// # Ok(())
/// # }
/// ```
pub struct PageReadGuard<'a> {
    page_id: PageId,
    data: RwLockReadGuard<'a, FrameData>,
}

impl<'a> PageReadGuard<'a> {
    pub(super) fn new(page_id: PageId, data: RwLockReadGuard<'a, FrameData>) -> Self {
        Self { page_id, data }
    }

    /// Returns the `PageId` of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Access the page data as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }
}

/// Exclusive access to a pinned page's bytes.
///
/// Writing through the guard does not mark the page dirty; report that with
/// `unpin(id, true)`.
///
/// # Example
///
/// ```no_run
/// # use pagepool::storage::{MemoryStorage, BufferPool, PageId};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let bpm = BufferPool::with_capacity(MemoryStorage::new(), 16)?;
/// let handle = bpm.pin(PageId::new(0), false).await?;
/// let mut page = bpm.write(&handle).await?;
/// page[0] = 42;
/// drop(page);
/// bpm.unpin(handle.page_id(), true).await?;
/// # Ok(())
/// # }
/// ```
pub struct PageWriteGuard<'a> {
    page_id: PageId,
    data: RwLockWriteGuard<'a, FrameData>,
}

impl<'a> PageWriteGuard<'a> {
    pub(super) fn new(page_id: PageId, data: RwLockWriteGuard<'a, FrameData>) -> Self {
        Self { page_id, data }
    }

    /// Returns the `PageId` of the guarded page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Access the page data as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Access the page data as a mutable byte slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}
