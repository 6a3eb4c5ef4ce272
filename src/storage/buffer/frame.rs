//! Buffer pool frame management.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::{PageData, PageId};

/// Identifier for a frame within the buffer pool.
///
/// FrameId is an index into the pool's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(usize);

impl FrameId {
    /// Creates a new FrameId.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the frame index.
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Per-frame bookkeeping, owned by the pool's state mutex.
///
/// `page_id == None` means the frame holds no meaningful page. That is the
/// initial state, and the state a frame returns to when its page is freed.
/// A pinned frame is always occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameDescriptor {
    pub page_id: Option<PageId>,
    pub pin_count: u32,
    pub dirty: bool,
    /// Bumped every time the frame is rebound or reset. Handles carry the
    /// epoch they were issued under.
    pub epoch: u64,
}

impl FrameDescriptor {
    /// Creates an empty, unpinned descriptor.
    pub fn new() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            dirty: false,
            epoch: 0,
        }
    }

    pub fn occupied(&self) -> bool {
        self.page_id.is_some()
    }

    /// Replaces the descriptor wholesale for a freshly loaded page, pinned
    /// once and clean.
    pub fn bind(&mut self, page_id: PageId) {
        self.page_id = Some(page_id);
        self.pin_count = 1;
        self.dirty = false;
        self.epoch += 1;
    }

    /// Returns the frame to the empty state.
    pub fn reset(&mut self) {
        debug_assert_eq!(self.pin_count, 0, "reset of a pinned frame");
        self.page_id = None;
        self.pin_count = 0;
        self.dirty = false;
        self.epoch += 1;
    }
}

impl Default for FrameDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame contents: the page bytes plus the epoch they were loaded under.
pub struct FrameData {
    pub(crate) epoch: u64,
    pub(crate) page: PageData,
}

impl FrameData {
    pub fn as_slice(&self) -> &[u8] {
        self.page.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.page.as_mut_slice()
    }
}

/// One fixed, page-sized slot of the pool.
///
/// The buffer is never resized or dropped while the pool lives; only its
/// contents are replaced. Access goes through the frame's own RwLock, which
/// sits below the pool's state mutex in the latch hierarchy.
pub(crate) struct Frame {
    data: RwLock<FrameData>,
}

impl Frame {
    /// Creates a new zero-filled frame.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(FrameData {
                epoch: 0,
                page: PageData::new(),
            }),
        }
    }

    /// Acquires a read lock on the frame data.
    pub async fn read(&self) -> RwLockReadGuard<'_, FrameData> {
        self.data.read().await
    }

    /// Acquires a write lock on the frame data.
    pub async fn write(&self) -> RwLockWriteGuard<'_, FrameData> {
        self.data.write().await
    }
}
