//! Storage layer errors.

use crate::storage::PageId;

/// Storage layer errors.
#[derive(Debug)]
pub enum StorageError {
    /// Page is not live in storage.
    ///
    /// Returned for ids that were never allocated and for ids that have been
    /// deallocated since. Use `allocate_pages` to obtain live pages.
    PageNotFound(PageId),

    /// Invalid buffer size provided to read_page or write_page.
    ///
    /// Buffers must be exactly PAGE_SIZE bytes.
    InvalidBufferSize {
        /// Expected buffer size (PAGE_SIZE)
        expected: usize,
        /// Actual buffer size provided
        actual: usize,
    },

    /// `allocate_pages` or `deallocate_pages` was asked for zero pages.
    InvalidPageCount(usize),

    /// I/O error from underlying file system.
    Io(std::io::Error),

    /// Storage is full (cannot allocate new pages).
    ///
    /// MemoryStorage returns this once its `max_pages` limit is reached.
    StorageFull,

    /// Data corruption detected.
    ///
    /// This indicates that the storage file has an invalid format or size.
    Corrupted(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::PageNotFound(id) => write!(f, "page not found: {}", id),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::InvalidPageCount(count) => {
                write!(f, "invalid page count: {}", count)
            }
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::StorageFull => write!(f, "storage is full"),
            StorageError::Corrupted(msg) => write!(f, "data corruption: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}
