//! Buffer pool manager for caching pages in memory.
//!
//! The buffer pool sits between the storage layer and higher-level
//! components, caching a fixed number of pages and loaning out pinned,
//! in-place access to them.

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::storage::{PageId, Storage};

use super::config::BufferPoolConfig;
use super::directory::PageDirectory;
use super::error::BufferPoolError;
use super::frame::{Frame, FrameDescriptor, FrameId};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::{ReplacementPolicy, Replacer};

/// A pin on a resident page.
///
/// Returned by [`BufferPool::pin`] and [`BufferPool::new_pages`]. The handle
/// names the frame and the epoch it was issued under; [`BufferPool::read`]
/// and [`BufferPool::write`] resolve it to the frame's bytes. Once the frame
/// is fully unpinned, evicted, or freed, the handle is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHandle {
    page_id: PageId,
    frame_id: FrameId,
    epoch: u64,
}

impl PageHandle {
    /// Returns the pinned page's id.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the frame the page occupies.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

/// Buffer pool manager for caching pages in memory.
///
/// The buffer pool owns a fixed array of frames and maps pages from storage
/// into them on demand. When every frame holds a page, the replacement
/// policy picks an idle frame to reuse.
///
/// # Architecture
///
/// ```text
/// +------------------+     +------------------+
/// | pin() / unpin()  |---->| Page Directory   |
/// | new_pages()      |     | (PageId->FrameId)|
/// | free() / flush() |     +------------------+
/// +------------------+              |
///          |                        v
///          v               +------------------+
/// +------------------+     | Frame Array      |
/// | Replacer (FIFO   |     | [Frame; capacity]|
/// | idle frames)     |     +------------------+
/// +------------------+              |
///                                   v
///                          +------------------+
///                          | Storage Trait    |
///                          +------------------+
/// ```
///
/// # Serialization
///
/// Frame descriptors, the page directory, and the replacer form one unit
/// behind a single state mutex. Every operation holds it from start to
/// finish, including the storage calls it makes, so operations never
/// interleave and each store call is atomic from the pool's point of view.
///
/// Pin counts track interest only. Two holders of the same page see each
/// other's writes immediately; coordinating those writes is up to them.
///
/// # Latch Hierarchy
///
/// 1. State mutex
/// 2. Frame data RwLock
///
/// **NEVER** call into the pool while holding a page guard.
pub struct BufferPool<S: Storage> {
    /// The underlying storage backend.
    storage: S,

    /// Frame array. The Vec is immutable after construction; each frame
    /// has its own RwLock for the page bytes.
    frames: Vec<Frame>,

    /// Descriptors, directory, and replacer.
    state: Mutex<PoolState>,

    policy: ReplacementPolicy,

    zero_fill_fresh: bool,
}

/// Mutable state protected by the state mutex.
struct PoolState {
    /// Metadata for each frame (indexed by FrameId).
    descriptors: Vec<FrameDescriptor>,

    /// Maps PageId -> FrameId for resident pages.
    directory: PageDirectory,

    /// Frames with pin count zero, in replacement order.
    replacer: Box<dyn Replacer>,
}

impl PoolState {
    fn descriptor(&self, frame_id: FrameId) -> &FrameDescriptor {
        &self.descriptors[frame_id.index()]
    }

    fn descriptor_mut(&mut self, frame_id: FrameId) -> &mut FrameDescriptor {
        &mut self.descriptors[frame_id.index()]
    }

    fn resident(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        self.directory
            .lookup(page_id)
            .ok_or(BufferPoolError::NotResident(page_id))
    }

    fn unpin(&mut self, page_id: PageId, dirty: bool) -> Result<(), BufferPoolError> {
        let frame_id = self.resident(page_id)?;
        let desc = self.descriptor_mut(frame_id);
        if desc.pin_count == 0 {
            return Err(BufferPoolError::AlreadyUnpinned(page_id));
        }

        desc.pin_count -= 1;
        // Sticky: only a flush clears it.
        if dirty {
            desc.dirty = true;
        }
        let now_idle = desc.pin_count == 0;
        if now_idle {
            self.replacer.enqueue(frame_id);
        }

        trace!(%page_id, %frame_id, dirty, now_idle, "unpinned page");
        Ok(())
    }

    /// Unbinds a frame whose page no longer exists in storage.
    ///
    /// The frame must already be idle; it stays in the replacer as an empty
    /// candidate.
    fn retire(&mut self, frame_id: FrameId, page_id: PageId) {
        debug_assert!(self.descriptor(frame_id).occupied());
        self.directory.remove(page_id);
        self.descriptor_mut(frame_id).reset();
        debug!(%page_id, %frame_id, "retired frame");
    }
}

impl<S: Storage> BufferPool<S> {
    /// Creates a new buffer pool.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::InvalidCapacity` if `config.capacity` is 0
    /// - `BufferPoolError::ReplacerNotFound` if `config.policy` names no
    ///   implemented policy
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pagepool::storage::{BufferPool, BufferPoolConfig, MemoryStorage};
    ///
    /// let config = BufferPoolConfig::with_capacity(64);
    /// let bpm = BufferPool::new(MemoryStorage::new(), config).unwrap();
    /// assert_eq!(bpm.capacity(), 64);
    /// ```
    pub fn new(storage: S, config: BufferPoolConfig) -> Result<Self, BufferPoolError> {
        let policy = config.validate()?;
        let replacer = policy.build(config.capacity)?;

        let frames = (0..config.capacity).map(|_| Frame::new()).collect();
        let descriptors = (0..config.capacity)
            .map(|_| FrameDescriptor::new())
            .collect();

        debug!(
            capacity = config.capacity,
            policy = policy.name(),
            zero_fill_fresh = config.zero_fill_fresh,
            "created buffer pool"
        );

        Ok(Self {
            storage,
            frames,
            state: Mutex::new(PoolState {
                descriptors,
                directory: PageDirectory::new(),
                replacer,
            }),
            policy,
            zero_fill_fresh: config.zero_fill_fresh,
        })
    }

    /// Creates a pool with `capacity` frames and the default policy.
    pub fn with_capacity(storage: S, capacity: usize) -> Result<Self, BufferPoolError> {
        Self::new(storage, BufferPoolConfig::with_capacity(capacity))
    }

    /// Returns the underlying storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the number of frames in the pool.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Returns the replacement policy in use.
    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    /// Returns the number of frames available for new pins.
    ///
    /// Exact only between operations.
    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.replacer.len()
    }

    /// Returns the number of pages currently in the pool.
    pub async fn resident_count(&self) -> usize {
        self.state.lock().await.directory.len()
    }

    /// Returns whether `page_id` currently has a frame.
    pub async fn is_resident(&self, page_id: PageId) -> bool {
        self.state.lock().await.directory.lookup(page_id).is_some()
    }

    /// Returns the pin count of a resident page.
    pub async fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock().await;
        let frame_id = state.directory.lookup(page_id)?;
        Some(state.descriptor(frame_id).pin_count)
    }

    /// Returns the dirty flag of a resident page.
    pub async fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock().await;
        let frame_id = state.directory.lookup(page_id)?;
        Some(state.descriptor(frame_id).dirty)
    }

    /// Pins a page, loading it into a frame if it is not resident.
    ///
    /// On a hit the pin count is incremented, and a previously idle frame
    /// stops being a replacement candidate. On a miss the replacer supplies
    /// a victim frame; a dirty victim is written back first, then the page
    /// is read from storage into the frame.
    ///
    /// `want_fresh` tells the pool the caller does not care about the
    /// page's stored contents. It is accepted but never skips the read: the
    /// pool cannot tell whether an arbitrary id was allocated, and binding
    /// one that was not would only fail later, at write-back. Zero-filling
    /// is limited to [`BufferPool::new_pages`], see
    /// [`BufferPoolConfig::zero_fill_fresh`].
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::PoolExhausted` if the page is not resident and
    ///   every frame is pinned
    /// - `BufferPoolError::Storage` if the write-back or the read fails
    pub async fn pin(
        &self,
        page_id: PageId,
        want_fresh: bool,
    ) -> Result<PageHandle, BufferPoolError> {
        trace!(%page_id, want_fresh, "pin requested");
        let mut state = self.state.lock().await;
        self.pin_locked(&mut state, page_id, false).await
    }

    /// `zero_fill` replaces the store read on a miss. Only pass it for ids
    /// the store has just allocated.
    async fn pin_locked(
        &self,
        state: &mut PoolState,
        page_id: PageId,
        zero_fill: bool,
    ) -> Result<PageHandle, BufferPoolError> {
        if let Some(frame_id) = state.directory.lookup(page_id) {
            let desc = &mut state.descriptors[frame_id.index()];
            if desc.pin_count == 0 {
                state.replacer.remove(frame_id);
            }
            desc.pin_count += 1;

            trace!(%page_id, %frame_id, pin_count = desc.pin_count, "buffer pool hit");
            return Ok(PageHandle {
                page_id,
                frame_id,
                epoch: desc.epoch,
            });
        }

        let frame_id = state
            .replacer
            .dequeue_victim()
            .ok_or(BufferPoolError::PoolExhausted)?;
        let mut data = self.frames[frame_id.index()].write().await;
        let desc = &mut state.descriptors[frame_id.index()];
        debug_assert_eq!(desc.pin_count, 0, "victim frame is pinned");

        if let Some(old_page_id) = desc.page_id {
            if desc.dirty {
                if let Err(e) = self.storage.write_page(old_page_id, data.as_slice()).await {
                    // The victim keeps its page; put it back as a candidate.
                    state.replacer.enqueue(frame_id);
                    return Err(e.into());
                }
                debug!(page_id = %old_page_id, %frame_id, "wrote back dirty victim");
            }
            state.directory.remove(old_page_id);
            desc.reset();
            trace!(page_id = %old_page_id, %frame_id, "evicted page");
        }

        if zero_fill {
            data.page.zero();
        } else if let Err(e) = self.storage.read_page(page_id, data.as_mut_slice()).await {
            // The frame is empty now; keep it available.
            state.replacer.enqueue(frame_id);
            return Err(e.into());
        }

        desc.bind(page_id);
        data.epoch = desc.epoch;
        state.directory.insert(page_id, frame_id);

        debug!(%page_id, %frame_id, zero_fill, "buffer pool miss, loaded page");
        Ok(PageHandle {
            page_id,
            frame_id,
            epoch: desc.epoch,
        })
    }

    /// Releases one pin on a page.
    ///
    /// `dirty` records that the caller modified the page. The dirty flag is
    /// sticky: a later clean unpin does not clear it. When the pin count
    /// reaches zero the frame becomes a replacement candidate.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NotResident` if the page has no frame
    /// - `BufferPoolError::AlreadyUnpinned` if its pin count is already zero
    pub async fn unpin(&self, page_id: PageId, dirty: bool) -> Result<(), BufferPoolError> {
        self.state.lock().await.unpin(page_id, dirty)
    }

    /// Allocates `count` contiguous pages in storage and pins the first.
    ///
    /// The first page is loaded through the normal miss path; with
    /// `zero_fill_fresh` configured its frame is zero-filled instead of
    /// read back. If pinning fails the allocation is released again.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::Storage` if allocation fails
    /// - the pin error, if pinning fails and the allocation was released
    /// - `BufferPoolError::RollbackFailed` if pinning failed and releasing
    ///   the allocation failed too
    pub async fn new_pages(&self, count: usize) -> Result<PageHandle, BufferPoolError> {
        let mut state = self.state.lock().await;
        let first = self.storage.allocate_pages(count).await?;
        debug!(page_id = %first, count, "allocated pages");

        let cause = match self
            .pin_locked(&mut state, first, self.zero_fill_fresh)
            .await
        {
            Ok(handle) => return Ok(handle),
            Err(cause) => cause,
        };

        match self.storage.deallocate_pages(first, count).await {
            Ok(()) => {
                debug!(page_id = %first, count, error = %cause, "rolled back allocation");
                Err(cause)
            }
            Err(rollback) => {
                warn!(
                    page_id = %first,
                    count,
                    error = %cause,
                    rollback_error = %rollback,
                    "failed to roll back allocation"
                );
                Err(BufferPoolError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                })
            }
        }
    }

    /// Deletes a page from storage and drops it from the pool.
    ///
    /// - Pinned exactly once (the caller's own pin): the page is deallocated,
    ///   that pin is released, and the frame is emptied.
    /// - Pinned more than once: fails with `PagePinned`.
    /// - Not resident, or resident but idle: the page is pinned transiently
    ///   (loading it if needed), deallocated, unpinned, and its frame emptied.
    ///
    /// In every successful case the page is no longer resident afterwards.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::PagePinned` if other callers hold the page
    /// - `BufferPoolError::PoolExhausted` if the page must be loaded and
    ///   every frame is pinned
    /// - `BufferPoolError::Storage` if loading or deallocation fails
    pub async fn free(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let resident = state
            .directory
            .lookup(page_id)
            .map(|frame_id| (frame_id, state.descriptor(frame_id).pin_count));

        let frame_id = match resident {
            Some((_, pin_count)) if pin_count > 1 => {
                return Err(BufferPoolError::PagePinned { page_id, pin_count });
            }
            Some((frame_id, 1)) => {
                self.storage.deallocate_pages(page_id, 1).await?;
                state.unpin(page_id, false)?;
                frame_id
            }
            _ => {
                let handle = self.pin_locked(state, page_id, false).await?;
                if let Err(e) = self.storage.deallocate_pages(page_id, 1).await {
                    state.unpin(page_id, false)?;
                    return Err(e.into());
                }
                state.unpin(page_id, false)?;
                handle.frame_id
            }
        };

        state.retire(frame_id, page_id);
        debug!(%page_id, "freed page");
        Ok(())
    }

    /// Writes a resident page's current bytes to storage and clears its
    /// dirty flag.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NotResident` if the page has no frame
    /// - `BufferPoolError::Storage` if the write fails
    pub async fn flush(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state, page_id).await
    }

    async fn flush_locked(
        &self,
        state: &mut PoolState,
        page_id: PageId,
    ) -> Result<(), BufferPoolError> {
        let frame_id = state.resident(page_id)?;
        {
            let data = self.frames[frame_id.index()].read().await;
            self.storage.write_page(page_id, data.as_slice()).await?;
        }
        state.descriptor_mut(frame_id).dirty = false;

        trace!(%page_id, %frame_id, "flushed page");
        Ok(())
    }

    /// Flushes every resident page, each under its own id, then syncs
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Storage` on the first failed write. Pages
    /// flushed before the failure stay flushed.
    pub async fn flush_all(&self) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock().await;
        let page_ids = state.directory.all_resident_ids();
        for &page_id in &page_ids {
            self.flush_locked(&mut state, page_id).await?;
        }
        self.storage.sync_all().await?;

        debug!(pages = page_ids.len(), "flushed all pages");
        Ok(())
    }

    /// Resolves a handle to shared access to the page's bytes.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::StaleHandle` if the handle's pin is gone.
    pub async fn read(&self, handle: &PageHandle) -> Result<PageReadGuard<'_>, BufferPoolError> {
        self.check_handle(handle).await?;
        let data = self.frames[handle.frame_id.index()].read().await;
        if data.epoch != handle.epoch {
            return Err(BufferPoolError::StaleHandle(handle.page_id));
        }
        Ok(PageReadGuard::new(handle.page_id, data))
    }

    /// Resolves a handle to exclusive access to the page's bytes.
    ///
    /// Writing does not mark the page dirty; pass `dirty = true` to
    /// [`BufferPool::unpin`] for that.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::StaleHandle` if the handle's pin is gone.
    pub async fn write(
        &self,
        handle: &PageHandle,
    ) -> Result<PageWriteGuard<'_>, BufferPoolError> {
        self.check_handle(handle).await?;
        let data = self.frames[handle.frame_id.index()].write().await;
        if data.epoch != handle.epoch {
            return Err(BufferPoolError::StaleHandle(handle.page_id));
        }
        Ok(PageWriteGuard::new(handle.page_id, data))
    }

    async fn check_handle(&self, handle: &PageHandle) -> Result<(), BufferPoolError> {
        let state = self.state.lock().await;
        let live = state
            .descriptors
            .get(handle.frame_id.index())
            .is_some_and(|desc| {
                desc.epoch == handle.epoch
                    && desc.pin_count > 0
                    && desc.page_id == Some(handle.page_id)
            });
        if live {
            Ok(())
        } else {
            Err(BufferPoolError::StaleHandle(handle.page_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::storage::{MemoryStorage, PAGE_SIZE, StorageError};

    /// MemoryStorage wrapper that records page I/O and injects failures.
    #[derive(Default)]
    struct FaultyStorage {
        inner: MemoryStorage,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        fail_deallocs: AtomicBool,
        reads: parking_lot::Mutex<Vec<PageId>>,
        writes: parking_lot::Mutex<Vec<PageId>>,
    }

    fn injected(op: &str) -> StorageError {
        StorageError::Io(std::io::Error::other(format!("injected {} failure", op)))
    }

    impl FaultyStorage {
        fn reads(&self) -> Vec<PageId> {
            self.reads.lock().clone()
        }

        fn writes(&self) -> Vec<PageId> {
            self.writes.lock().clone()
        }
    }

    impl Storage for FaultyStorage {
        async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
            self.reads.lock().push(page_id);
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(injected("read"));
            }
            self.inner.read_page(page_id, buf).await
        }

        async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
            self.writes.lock().push(page_id);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(injected("write"));
            }
            self.inner.write_page(page_id, buf).await
        }

        async fn allocate_pages(&self, count: usize) -> Result<PageId, StorageError> {
            self.inner.allocate_pages(count).await
        }

        async fn deallocate_pages(&self, first: PageId, count: usize) -> Result<(), StorageError> {
            if self.fail_deallocs.load(Ordering::SeqCst) {
                return Err(injected("deallocate"));
            }
            self.inner.deallocate_pages(first, count).await
        }

        async fn page_count(&self) -> usize {
            self.inner.page_count().await
        }

        async fn sync_all(&self) -> Result<(), StorageError> {
            self.inner.sync_all().await
        }
    }

    async fn pool_with_pages(capacity: usize, pages: usize) -> BufferPool<FaultyStorage> {
        let storage = FaultyStorage::default();
        if pages > 0 {
            storage.inner.allocate_pages(pages).await.unwrap();
        }
        BufferPool::with_capacity(storage, capacity).unwrap()
    }

    fn pid(n: u64) -> PageId {
        PageId::new(n)
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert!(matches!(
            BufferPool::with_capacity(MemoryStorage::new(), 0),
            Err(BufferPoolError::InvalidCapacity)
        ));

        for name in ["LRU", "MRU", "LH", "Random", ""] {
            let config = BufferPoolConfig::with_capacity(4).policy(name);
            assert!(matches!(
                BufferPool::new(MemoryStorage::new(), config),
                Err(BufferPoolError::ReplacerNotFound(n)) if n == name
            ));
        }
    }

    #[tokio::test]
    async fn test_new_buffer_pool() {
        let bpm = BufferPool::with_capacity(MemoryStorage::new(), 10).unwrap();

        assert_eq!(bpm.capacity(), 10);
        assert_eq!(bpm.policy(), ReplacementPolicy::Clock);
        assert_eq!(bpm.idle_count().await, 10);
        assert_eq!(bpm.resident_count().await, 0);
    }

    #[tokio::test]
    async fn test_pin_miss_then_hit() {
        let bpm = pool_with_pages(4, 1).await;

        let h1 = bpm.pin(pid(0), false).await.unwrap();
        assert_eq!(bpm.storage().reads(), vec![pid(0)]);
        assert_eq!(bpm.pin_count(pid(0)).await, Some(1));
        assert_eq!(bpm.idle_count().await, 3);

        let h2 = bpm.pin(pid(0), false).await.unwrap();
        assert_eq!(h1, h2);
        assert_eq!(bpm.storage().reads().len(), 1);
        assert_eq!(bpm.pin_count(pid(0)).await, Some(2));
        assert_eq!(bpm.idle_count().await, 3);
    }

    #[tokio::test]
    async fn test_hit_on_idle_frame_removes_candidate() {
        let bpm = pool_with_pages(2, 1).await;

        bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        assert_eq!(bpm.idle_count().await, 2);
        assert_eq!(bpm.pin_count(pid(0)).await, Some(0));
        assert!(bpm.is_resident(pid(0)).await);

        bpm.pin(pid(0), false).await.unwrap();
        assert_eq!(bpm.idle_count().await, 1);
        assert_eq!(bpm.storage().reads().len(), 1);
    }

    #[tokio::test]
    async fn test_two_frame_scenario() {
        let bpm = pool_with_pages(2, 3).await;
        let (a, b, c) = (pid(0), pid(1), pid(2));

        bpm.pin(a, false).await.unwrap();
        bpm.pin(b, false).await.unwrap();
        assert!(matches!(
            bpm.pin(c, false).await,
            Err(BufferPoolError::PoolExhausted)
        ));

        bpm.unpin(a, false).await.unwrap();
        bpm.pin(c, false).await.unwrap();
        assert!(!bpm.is_resident(a).await);
        assert!(bpm.storage().writes().is_empty());

        bpm.unpin(c, false).await.unwrap();
        bpm.pin(a, false).await.unwrap();
        assert_eq!(bpm.storage().reads(), vec![a, b, c, a]);
    }

    #[tokio::test]
    async fn test_resident_page_never_exhausts() {
        let bpm = pool_with_pages(2, 2).await;

        bpm.pin(pid(0), false).await.unwrap();
        bpm.pin(pid(1), false).await.unwrap();
        for _ in 0..5 {
            bpm.pin(pid(1), false).await.unwrap();
        }
        assert_eq!(bpm.pin_count(pid(1)).await, Some(6));
    }

    #[tokio::test]
    async fn test_unpin_errors() {
        let bpm = pool_with_pages(2, 1).await;

        assert!(matches!(
            bpm.unpin(pid(0), false).await,
            Err(BufferPoolError::NotResident(id)) if id == pid(0)
        ));

        bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        assert!(matches!(
            bpm.unpin(pid(0), true).await,
            Err(BufferPoolError::AlreadyUnpinned(id)) if id == pid(0)
        ));
        // The failed unpin must not have marked the page dirty.
        assert_eq!(bpm.is_dirty(pid(0)).await, Some(false));
        assert_eq!(bpm.idle_count().await, 2);
    }

    #[tokio::test]
    async fn test_dirty_flag_is_sticky() {
        let bpm = pool_with_pages(1, 2).await;

        bpm.pin(pid(0), false).await.unwrap();
        bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), true).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        assert_eq!(bpm.is_dirty(pid(0)).await, Some(true));

        bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        assert_eq!(bpm.is_dirty(pid(0)).await, Some(true));

        // Eviction writes it back.
        bpm.pin(pid(1), false).await.unwrap();
        assert_eq!(bpm.storage().writes(), vec![pid(0)]);
    }

    #[tokio::test]
    async fn test_eviction_round_trip() {
        let capacity = 3;
        let bpm = pool_with_pages(capacity, 1 + capacity).await;

        let handle = bpm.pin(pid(0), false).await.unwrap();
        bpm.write(&handle).await.unwrap()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        bpm.unpin(pid(0), true).await.unwrap();

        for n in 1..=capacity as u64 {
            bpm.pin(pid(n), false).await.unwrap();
            bpm.unpin(pid(n), false).await.unwrap();
        }
        assert!(!bpm.is_resident(pid(0)).await);

        let handle = bpm.pin(pid(0), false).await.unwrap();
        assert_eq!(&bpm.read(&handle).await.unwrap()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[tokio::test]
    async fn test_pins_alias_the_same_bytes() {
        let bpm = pool_with_pages(2, 1).await;

        let h1 = bpm.pin(pid(0), false).await.unwrap();
        let h2 = bpm.pin(pid(0), false).await.unwrap();
        bpm.write(&h1).await.unwrap()[10] = 7;
        assert_eq!(bpm.read(&h2).await.unwrap()[10], 7);
    }

    #[tokio::test]
    async fn test_flush_clears_dirty() {
        let bpm = pool_with_pages(2, 1).await;

        assert!(matches!(
            bpm.flush(pid(0)).await,
            Err(BufferPoolError::NotResident(_))
        ));

        let handle = bpm.pin(pid(0), false).await.unwrap();
        bpm.write(&handle).await.unwrap()[0] = 9;
        bpm.unpin(pid(0), true).await.unwrap();

        bpm.flush(pid(0)).await.unwrap();
        assert_eq!(bpm.is_dirty(pid(0)).await, Some(false));

        let mut buf = vec![0u8; PAGE_SIZE];
        bpm.storage().inner.read_page(pid(0), &mut buf).await.unwrap();
        assert_eq!(buf[0], 9);
    }

    #[tokio::test]
    async fn test_flush_all_addresses_pages_by_id() {
        let bpm = pool_with_pages(5, 50).await;
        let dirty_ids: Vec<PageId> = (40..44).map(pid).collect();

        for &id in &dirty_ids {
            let handle = bpm.pin(id, false).await.unwrap();
            bpm.write(&handle).await.unwrap()[0] = id.page_num() as u8;
            bpm.unpin(id, true).await.unwrap();
        }
        bpm.pin(pid(10), false).await.unwrap();
        bpm.unpin(pid(10), false).await.unwrap();

        bpm.flush_all().await.unwrap();

        let mut written = bpm.storage().writes();
        written.sort();
        assert_eq!(written, vec![pid(10), pid(40), pid(41), pid(42), pid(43)]);

        let mut buf = vec![0u8; PAGE_SIZE];
        for &id in &dirty_ids {
            bpm.storage().inner.read_page(id, &mut buf).await.unwrap();
            assert_eq!(buf[0], id.page_num() as u8);
            assert_eq!(bpm.is_dirty(id).await, Some(false));
        }
        // Frame indices are not page ids: low pages stay untouched.
        for n in 0..5 {
            bpm.storage().inner.read_page(pid(n), &mut buf).await.unwrap();
            assert_eq!(buf[0], 0);
        }
    }

    #[tokio::test]
    async fn test_flush_all_stops_at_first_failure() {
        let bpm = pool_with_pages(3, 3).await;
        for n in 0..3 {
            bpm.pin(pid(n), false).await.unwrap();
            bpm.unpin(pid(n), true).await.unwrap();
        }

        bpm.storage().fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            bpm.flush_all().await,
            Err(BufferPoolError::Storage(StorageError::Io(_)))
        ));
        assert_eq!(bpm.storage().writes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_back_failure_keeps_victim() {
        let bpm = pool_with_pages(1, 2).await;

        let handle = bpm.pin(pid(0), false).await.unwrap();
        bpm.write(&handle).await.unwrap()[0] = 5;
        bpm.unpin(pid(0), true).await.unwrap();

        bpm.storage().fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(
            bpm.pin(pid(1), false).await,
            Err(BufferPoolError::Storage(_))
        ));
        assert!(bpm.is_resident(pid(0)).await);
        assert_eq!(bpm.is_dirty(pid(0)).await, Some(true));
        assert_eq!(bpm.idle_count().await, 1);

        bpm.storage().fail_writes.store(false, Ordering::SeqCst);
        bpm.pin(pid(1), false).await.unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        bpm.storage().inner.read_page(pid(0), &mut buf).await.unwrap();
        assert_eq!(buf[0], 5);
    }

    #[tokio::test]
    async fn test_read_failure_returns_frame() {
        let bpm = pool_with_pages(2, 1).await;

        assert!(matches!(
            bpm.pin(pid(99), false).await,
            Err(BufferPoolError::Storage(StorageError::PageNotFound(id))) if id == pid(99)
        ));
        assert_eq!(bpm.idle_count().await, 2);
        assert!(!bpm.is_resident(pid(99)).await);

        bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        bpm.storage().fail_reads.store(true, Ordering::SeqCst);
        // Forces the idle frame holding page 0 to be reused too.
        assert!(bpm.pin(pid(5), false).await.is_err());
        assert!(bpm.pin(pid(6), false).await.is_err());
        assert_eq!(bpm.idle_count().await, 2);
        assert_eq!(bpm.resident_count().await, 0);
        assert!(!bpm.is_resident(pid(0)).await);
    }

    #[tokio::test]
    async fn test_stale_handles() {
        let bpm = pool_with_pages(1, 2).await;

        let handle = bpm.pin(pid(0), false).await.unwrap();
        bpm.unpin(pid(0), false).await.unwrap();
        assert!(matches!(
            bpm.read(&handle).await,
            Err(BufferPoolError::StaleHandle(id)) if id == pid(0)
        ));

        bpm.pin(pid(1), false).await.unwrap();
        assert!(matches!(
            bpm.write(&handle).await,
            Err(BufferPoolError::StaleHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_new_pages_pins_first_page() {
        let bpm = BufferPool::with_capacity(FaultyStorage::default(), 4).unwrap();

        let handle = bpm.new_pages(3).await.unwrap();
        assert_eq!(handle.page_id(), pid(0));
        assert_eq!(bpm.pin_count(pid(0)).await, Some(1));
        assert!(!bpm.is_resident(pid(1)).await);
        assert!(bpm.read(&handle).await.unwrap().iter().all(|&b| b == 0));
        // Default configuration still reads the fresh page back.
        assert_eq!(bpm.storage().reads(), vec![pid(0)]);

        let next = bpm.new_pages(1).await.unwrap();
        assert_eq!(next.page_id(), pid(3));
    }

    #[tokio::test]
    async fn test_new_pages_rolls_back_on_pin_failure() {
        let bpm = BufferPool::with_capacity(FaultyStorage::default(), 1).unwrap();
        bpm.new_pages(1).await.unwrap();

        assert!(matches!(
            bpm.new_pages(2).await,
            Err(BufferPoolError::PoolExhausted)
        ));
        assert_eq!(bpm.storage().page_count().await, 1);
    }

    #[tokio::test]
    async fn test_new_pages_rollback_failure_keeps_both_errors() {
        let bpm = BufferPool::with_capacity(FaultyStorage::default(), 1).unwrap();
        bpm.new_pages(1).await.unwrap();
        bpm.storage().fail_deallocs.store(true, Ordering::SeqCst);

        match bpm.new_pages(2).await {
            Err(BufferPoolError::RollbackFailed { cause, rollback }) => {
                assert!(matches!(*cause, BufferPoolError::PoolExhausted));
                assert!(matches!(rollback, StorageError::Io(_)));
            }
            other => panic!("expected RollbackFailed, got {:?}", other),
        }
        assert_eq!(bpm.storage().page_count().await, 3);
    }

    #[tokio::test]
    async fn test_free_respects_other_pins() {
        let bpm = pool_with_pages(2, 1).await;

        bpm.pin(pid(0), false).await.unwrap();
        bpm.pin(pid(0), false).await.unwrap();
        assert!(matches!(
            bpm.free(pid(0)).await,
            Err(BufferPoolError::PagePinned { pin_count: 2, .. })
        ));
        assert!(bpm.storage().inner.is_live(pid(0)));

        // Only the caller's own pin remains.
        bpm.unpin(pid(0), true).await.unwrap();
        bpm.free(pid(0)).await.unwrap();

        assert!(!bpm.is_resident(pid(0)).await);
        assert!(!bpm.storage().inner.is_live(pid(0)));
        assert_eq!(bpm.idle_count().await, 2);
        assert!(bpm.storage().writes().is_empty());
        assert!(matches!(
            bpm.pin(pid(0), false).await,
            Err(BufferPoolError::Storage(StorageError::PageNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_free_idle_resident_page_skips_write_back() {
        let bpm = pool_with_pages(2, 1).await;

        let handle = bpm.pin(pid(0), false).await.unwrap();
        bpm.write(&handle).await.unwrap()[0] = 1;
        bpm.unpin(pid(0), true).await.unwrap();

        bpm.free(pid(0)).await.unwrap();
        assert!(!bpm.is_resident(pid(0)).await);
        assert!(!bpm.storage().inner.is_live(pid(0)));
        assert!(bpm.storage().writes().is_empty());
        assert_eq!(bpm.storage().reads().len(), 1);
        assert_eq!(bpm.idle_count().await, 2);
    }

    #[tokio::test]
    async fn test_free_non_resident_page_loads_transiently() {
        let bpm = pool_with_pages(2, 2).await;

        bpm.free(pid(1)).await.unwrap();
        assert_eq!(bpm.storage().reads(), vec![pid(1)]);
        assert!(!bpm.is_resident(pid(1)).await);
        assert_eq!(bpm.resident_count().await, 0);
        assert_eq!(bpm.idle_count().await, 2);
        assert_eq!(bpm.storage().page_count().await, 1);
    }

    #[tokio::test]
    async fn test_free_failure_leaves_pins_untouched() {
        let bpm = pool_with_pages(2, 2).await;
        bpm.storage().fail_deallocs.store(true, Ordering::SeqCst);

        bpm.pin(pid(0), false).await.unwrap();
        assert!(bpm.free(pid(0)).await.is_err());
        assert_eq!(bpm.pin_count(pid(0)).await, Some(1));

        assert!(bpm.free(pid(1)).await.is_err());
        assert_eq!(bpm.pin_count(pid(1)).await, Some(0));
        assert_eq!(bpm.idle_count().await, 1);
    }

    #[tokio::test]
    async fn test_fresh_hint_is_inert_by_default() {
        let bpm = pool_with_pages(2, 1).await;
        bpm.storage()
            .inner
            .write_page(pid(0), &vec![0xAA; PAGE_SIZE])
            .await
            .unwrap();

        let handle = bpm.pin(pid(0), true).await.unwrap();
        assert_eq!(bpm.storage().reads(), vec![pid(0)]);
        assert!(bpm.read(&handle).await.unwrap().iter().all(|&b| b == 0xAA));
    }

    #[tokio::test]
    async fn test_zero_fill_fresh_applies_to_new_pages() {
        let config = BufferPoolConfig::with_capacity(2).zero_fill_fresh(true);
        let bpm = BufferPool::new(FaultyStorage::default(), config).unwrap();

        let handle = bpm.new_pages(2).await.unwrap();
        assert!(bpm.storage().reads().is_empty());
        assert!(bpm.read(&handle).await.unwrap().iter().all(|&b| b == 0));
        assert_eq!(bpm.pin_count(handle.page_id()).await, Some(1));
    }

    #[tokio::test]
    async fn test_zero_fill_fresh_never_binds_unallocated_ids() {
        let storage = FaultyStorage::default();
        storage.inner.allocate_pages(1).await.unwrap();
        storage
            .inner
            .write_page(pid(0), &vec![0xAA; PAGE_SIZE])
            .await
            .unwrap();
        let config = BufferPoolConfig::with_capacity(2).zero_fill_fresh(true);
        let bpm = BufferPool::new(storage, config).unwrap();

        assert!(matches!(
            bpm.pin(pid(999), true).await,
            Err(BufferPoolError::Storage(StorageError::PageNotFound(id))) if id == pid(999)
        ));
        assert!(!bpm.is_resident(pid(999)).await);
        assert_eq!(bpm.idle_count().await, 2);

        // The hint on an existing page still reads its stored bytes.
        let handle = bpm.pin(pid(0), true).await.unwrap();
        assert_eq!(bpm.storage().reads(), vec![pid(999), pid(0)]);
        assert!(bpm.read(&handle).await.unwrap().iter().all(|&b| b == 0xAA));
    }

    #[tokio::test]
    async fn test_new_pages_rejects_oversized_runs() {
        let bpm = BufferPool::with_capacity(MemoryStorage::new(), 2).unwrap();

        assert!(matches!(
            bpm.new_pages(usize::MAX).await,
            Err(BufferPoolError::Storage(StorageError::InvalidPageCount(usize::MAX)))
        ));
        assert_eq!(bpm.storage().page_count().await, 0);

        // The state mutex was released; the pool keeps working.
        let handle = bpm.new_pages(1).await.unwrap();
        assert_eq!(handle.page_id(), pid(0));
    }
}
