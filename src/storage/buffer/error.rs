//! Buffer pool errors.

use crate::storage::{PageId, StorageError};

/// Buffer pool errors.
///
/// This error type wraps storage-level errors and adds buffer-pool-specific
/// error conditions. Nothing is retried or swallowed inside the pool; every
/// failure reaches the caller as one of these variants.
#[derive(Debug)]
pub enum BufferPoolError {
    /// The pool was configured with zero frames.
    InvalidCapacity,

    /// The configured replacement policy name has no implementation.
    ReplacerNotFound(String),

    /// No idle frame is available: every frame is pinned.
    ///
    /// Recoverable by unpinning pages and retrying.
    PoolExhausted,

    /// The page has no frame in the pool.
    NotResident(PageId),

    /// `unpin` was called on a page whose pin count is already zero.
    ///
    /// This signals a pin/unpin mismatch in the caller.
    AlreadyUnpinned(PageId),

    /// `free` was called on a page that other callers still hold.
    PagePinned {
        page_id: PageId,
        pin_count: u32,
    },

    /// A page handle no longer refers to the frame contents it was issued
    /// for (the page was unpinned, evicted, or freed).
    StaleHandle(PageId),

    /// Underlying storage error.
    Storage(StorageError),

    /// `new_pages` could not pin the first page and releasing the
    /// allocation afterwards failed as well. Both causes are kept.
    RollbackFailed {
        cause: Box<BufferPoolError>,
        rollback: StorageError,
    },
}

impl std::fmt::Display for BufferPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferPoolError::InvalidCapacity => {
                write!(f, "invalid capacity: buffer pool needs at least one frame")
            }
            BufferPoolError::ReplacerNotFound(name) => {
                write!(f, "replacement policy not found: {:?}", name)
            }
            BufferPoolError::PoolExhausted => {
                write!(f, "buffer pool exhausted: all frames are pinned")
            }
            BufferPoolError::NotResident(id) => write!(f, "{} is not resident", id),
            BufferPoolError::AlreadyUnpinned(id) => write!(f, "{} is not pinned", id),
            BufferPoolError::PagePinned { page_id, pin_count } => {
                write!(f, "{} is pinned {} times", page_id, pin_count)
            }
            BufferPoolError::StaleHandle(id) => write!(f, "stale handle for {}", id),
            BufferPoolError::Storage(e) => write!(f, "storage error: {}", e),
            BufferPoolError::RollbackFailed { cause, rollback } => {
                write!(f, "{} (rollback also failed: {})", cause, rollback)
            }
        }
    }
}

impl std::error::Error for BufferPoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferPoolError::Storage(e) => Some(e),
            BufferPoolError::RollbackFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for BufferPoolError {
    fn from(e: StorageError) -> Self {
        BufferPoolError::Storage(e)
    }
}
