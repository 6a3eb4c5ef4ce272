//! Storage layer for page-based I/O.
//!
//! Persistent data lives in 8KB pages. The buffer pool caches a fixed number
//! of them in memory and hands out pinned, in-place references.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! | Buffer Pool       |  <- buffer
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | Storage Trait     |  <- io
//! +-------------------+
//!       /      \
//!      v        v
//! +--------------+ +-------------+
//! | MemoryStorage| | FileStorage |
//! +--------------+ +-------------+
//! ```

pub mod buffer;
pub mod error;
pub mod io;
pub mod page;

pub use buffer::{
    BufferPool, BufferPoolConfig, BufferPoolError, FifoReplacer, FrameId, PageHandle,
    PageReadGuard, PageWriteGuard, ReplacementPolicy, Replacer,
};
pub use error::StorageError;
pub use io::{FileStorage, MAX_RUN_PAGES, MemoryStorage, Storage};
pub use page::{PAGE_SIZE, PageData, PageId};
