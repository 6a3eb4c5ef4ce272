//! Buffer pool for caching pages in memory.
//!
//! The buffer pool sits between the storage layer and its callers, keeping a
//! fixed number of pages in memory and loaning out pinned, in-place access.
//!
//! # Components
//!
//! - [`BufferPool`]: pin/unpin/allocate/free/flush
//! - [`PageDirectory`]: page id to frame index
//! - [`Replacer`]: idle frames eligible for reuse; [`FifoReplacer`] serves
//!   the `Clock` policy
//! - [`PageHandle`], [`PageReadGuard`], [`PageWriteGuard`]: access to a
//!   pinned page's bytes
//!
//! # Latch Hierarchy
//!
//! 1. Pool state mutex (descriptors, directory, replacer)
//! 2. Frame data RwLocks
//!
//! See [`BufferPool`] documentation for detailed latch ordering rules.
//!
//! # Example
//!
//! ```no_run
//! use pagepool::storage::{BufferPool, BufferPoolConfig, MemoryStorage};
//!
//! # async fn example() -> Result<(), pagepool::storage::BufferPoolError> {
//! let bpm = BufferPool::new(MemoryStorage::new(), BufferPoolConfig::with_capacity(100))?;
//!
//! // Create a new page
//! let handle = bpm.new_pages(1).await?;
//! bpm.write(&handle).await?.as_mut_slice()[0] = 42;
//! let page_id = handle.page_id();
//! bpm.unpin(page_id, true).await?;
//!
//! // Pin it again later
//! let handle = bpm.pin(page_id, false).await?;
//! assert_eq!(bpm.read(&handle).await?[0], 42);
//! bpm.unpin(page_id, false).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod directory;
mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use config::BufferPoolConfig;
pub use directory::{DIRECTORY_BUCKETS, PageDirectory};
pub use error::BufferPoolError;
pub use frame::FrameId;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use pool::{BufferPool, PageHandle};
pub use replacer::{FifoReplacer, ReplacementPolicy, Replacer};
