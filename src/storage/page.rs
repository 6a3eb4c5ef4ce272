//! Page identifier, page buffer, and size constants.

mod data;

pub use data::PageData;

/// 8KB page size, shared by the buffer pool and every storage backend.
pub const PAGE_SIZE: usize = 8192;

/// Unique identifier for a page within the storage system.
///
/// Ids are unique per live page. A backend may hand out an id again only
/// after it has been deallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u64);

impl PageId {
    /// Creates a new PageId from a page number.
    pub const fn new(page_num: u64) -> Self {
        Self(page_num)
    }

    /// Returns the page number.
    pub const fn page_num(&self) -> u64 {
        self.0
    }

    /// Byte offset of this page in a single-file backend.
    pub const fn byte_offset(&self) -> u64 {
        self.0 * PAGE_SIZE as u64
    }

    /// Returns the id `n` pages after this one.
    pub const fn offset(&self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page#{}", self.0)
    }
}
