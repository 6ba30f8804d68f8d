//! Buffer pool manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] multiplexes a bounded set of frames over an
//! unbounded set of pages:
//! - Page caching between storage and memory
//! - Pin-based reference counting (through guards)
//! - Dirty-page write-back on eviction and flush
//! - LRU-K victim selection

use std::collections::HashMap;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageGuard, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::Storage;

/// Message for the internal invariant that every frame id the manager hands
/// to the policy indexes the pool. A violation is a bug, not a caller error.
const REPLACER_BOUNDS: &str = "manager frame ids are always inside the pool";

/// Bookkeeping shared by all operations, behind one mutex.
///
/// Frame metadata (pin count, dirty flag, resident page id) lives in the
/// frames themselves as atomics, but is only ever mutated while this state
/// is locked.
struct PoolState {
    /// Maps resident page IDs to frame IDs - exactly one entry per resident
    /// page.
    page_table: HashMap<PageId, FrameId>,

    /// Frames never assigned, or returned after deletion (LIFO).
    free_list: Vec<FrameId>,

    /// Eviction policy; consulted only when the free list is empty.
    replacer: LruKReplacer,

    /// Monotonic page-id allocator, seeded from the storage extent.
    next_page_id: u32,

    /// The persistent-storage port.
    storage: Box<dyn Storage>,
}

/// Manages a pool of buffer frames for caching pages.
///
/// # Synchronization
/// Two independent domains:
/// - the single `state` mutex serializes every bookkeeping mutation (page
///   table, free list, frame metadata, all policy calls);
/// - each frame's content `RwLock` is held only by read/write guards.
///
/// A thread holding the state lock only ever acquires content locks that
/// are provably free (frames with zero pins and no page-table entry), so it
/// never blocks on the content domain; guards release their content lock
/// strictly before unpinning. That one-directional discipline is what makes
/// the pair of domains deadlock-free.
///
/// # Usage
/// ```ignore
/// let bpm = BufferPoolManager::new(64, 2, DiskManager::create("test.db")?);
///
/// let mut guard = bpm.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// // guard drops: page unpinned, dirty flag recorded
///
/// let guard = bpm.fetch_page_read(page_id)?;
/// let data = guard.as_slice();
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// All shared bookkeeping.
    state: Mutex<PoolState>,

    /// Performance statistics (atomic, read without the lock).
    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager over a storage port.
    ///
    /// `replacer_k` is the LRU-K promotion threshold.
    ///
    /// # Panics
    /// Panics if `pool_size` or `replacer_k` is 0.
    pub fn new<S: Storage + 'static>(pool_size: usize, replacer_k: usize, storage: S) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        // All frames start free; popping yields the lowest id first.
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        let next_page_id = storage.num_pages();

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruKReplacer::new(pool_size, replacer_k),
                next_page_id,
                storage: Box::new(storage),
            }),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Allocate pages
    // ========================================================================

    /// Allocate a fresh page id without bringing the page into the pool.
    ///
    /// The first fetch of the id materializes it (zero-filled until its
    /// first write-back).
    pub fn allocate_page_id(&self) -> PageId {
        let mut state = self.state.lock();
        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += 1;
        page_id
    }

    /// Allocate a new page and pin it into a frame, returning a write guard.
    ///
    /// The page starts zero-filled with pin count 1.
    ///
    /// # Errors
    /// - `Error::PoolExhausted` if the free list is empty and no frame is
    ///   evictable
    /// - `Error::Io` if writing back the evicted victim fails
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let (page_id, frame_id) = {
            let mut state = self.state.lock();
            let frame_id = self.take_frame(&mut state)?;

            let page_id = PageId::new(state.next_page_id);
            state.next_page_id += 1;

            let frame = &self.frames[frame_id.0];
            // Zero the content before the page becomes visible. The frame
            // has no table entry and no pins, so its content lock is free.
            frame.page_mut().reset();
            frame.set_page_id(Some(page_id));
            frame.clear_dirty();
            frame.pin();

            state.page_table.insert(page_id, frame_id);
            state.replacer.record_access(frame_id).expect(REPLACER_BOUNDS);
            state
                .replacer
                .set_evictable(frame_id, false)
                .expect(REPLACER_BOUNDS);

            trace!("allocated {} in {}", page_id, frame_id);
            (page_id, frame_id)
        };

        Ok(PageGuard::new(self, page_id, frame_id).upgrade_write())
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page, holding only a pin (no content lock).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the id was never allocated
    /// - `Error::PoolExhausted` if no frame can be obtained
    /// - `Error::Io` from the storage port on a miss
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        Ok(PageGuard::new(self, page_id, frame_id))
    }

    /// Fetch a page for reading (shared access).
    ///
    /// Blocks until any in-flight writer on this page finishes. Errors as
    /// [`fetch_page_basic`](Self::fetch_page_basic).
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// Blocks until all other readers and writers on this page finish.
    /// Errors as [`fetch_page_basic`](Self::fetch_page_basic).
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), but `None` on any
    /// failure. For callers that expect exhaustion and retry.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        self.fetch_page_read(page_id).ok()
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), but `None` on any
    /// failure.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        self.fetch_page_write(page_id).ok()
    }

    // ========================================================================
    // Public API: Unpin
    // ========================================================================

    /// Return a pin, ORing in the caller's dirty flag.
    ///
    /// Exactly when the pin count reaches zero the frame becomes evictable.
    /// Returns `false` - without any state change - when the page is not
    /// resident or its pin count is already zero.
    ///
    /// Guards call this automatically; call it directly only when managing
    /// pins by hand.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0];
        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.mark_dirty();
                }
                if remaining == 0 {
                    state
                        .replacer
                        .set_evictable(frame_id, true)
                        .expect(REPLACER_BOUNDS);
                }
                true
            }
        }
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Write a page's bytes through the storage port, dirty or not.
    ///
    /// The dirty flag is cleared only when the write succeeds. A recovery
    /// layer would force its log ahead of this write; that hook belongs to
    /// whoever injects the storage port.
    ///
    /// # Errors
    /// - `Error::PageNotResident` if the page is not in the pool
    /// - `Error::Io` if the storage write fails (dirty flag left set)
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Err(Error::PageNotResident(page_id));
            };
            // Hold a pin for the duration so eviction cannot reclaim the
            // frame while we wait for the content lock below.
            self.frames[frame_id.0].pin();
            state
                .replacer
                .set_evictable(frame_id, false)
                .expect(REPLACER_BOUNDS);
            frame_id
        };

        let frame = &self.frames[frame_id.0];
        // Wait out any in-flight writer without holding the state lock.
        let page = frame.page();

        let mut state = self.state.lock();
        let result = state.storage.write_page(page_id, page.as_slice());
        if result.is_ok() {
            frame.clear_dirty();
            self.stats.record_page_written();
            trace!("flushed {}", page_id);
        }

        // Return the flush pin under the same critical section.
        if frame.unpin() == Some(0) {
            state
                .replacer
                .set_evictable(frame_id, true)
                .expect(REPLACER_BOUNDS);
        }

        result
    }

    /// Flush every currently resident page.
    ///
    /// A failing page does not stop the others; all failures are collected
    /// into `Error::FlushAll`. Pages evicted or deleted concurrently are
    /// skipped.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };

        debug!("flushing {} resident page(s)", page_ids.len());

        let mut failures = Vec::new();
        for page_id in page_ids {
            match self.flush_page(page_id) {
                Ok(()) => {}
                // Gone since the snapshot; nothing to flush.
                Err(Error::PageNotResident(_)) => {}
                Err(e) => failures.push((page_id, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::FlushAll(failures))
        }
    }

    // ========================================================================
    // Public API: Delete pages
    // ========================================================================

    /// Drop a page from the pool and return its frame to the free list.
    ///
    /// Persistent storage is not touched; reclaiming the on-disk page
    /// belongs to whoever owns the page-id space.
    ///
    /// # Errors
    /// - `Error::PageNotResident` if the page is not in the pool
    /// - `Error::PagePinned` if any guard still holds it
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(Error::PageNotResident(page_id));
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        // Unpinned and now unmapped: the content lock is free.
        frame.reset();
        state.free_list.push(frame_id);

        debug!("deleted {}, {} back on the free list", page_id, frame_id);
        Ok(())
    }

    // ========================================================================
    // Public API: Introspection
    // ========================================================================

    /// Current pin count of a resident page, or `None` if not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id.0].pin_count())
    }

    /// Whether the page is currently resident.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Get buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Get the number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// The frame holding a given slot; used by guards for content access.
    #[inline]
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    // ========================================================================
    // Internal: Pin path
    // ========================================================================

    /// Bring a page into the pool (if needed) and take a pin on it.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.state.lock();

        if page_id.0 >= state.next_page_id {
            return Err(Error::PageNotFound(page_id));
        }

        // Hit: the page is resident.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.0].pin();
            state.replacer.record_access(frame_id).expect(REPLACER_BOUNDS);
            state
                .replacer
                .set_evictable(frame_id, false)
                .expect(REPLACER_BOUNDS);
            self.stats.record_hit();
            return Ok(frame_id);
        }

        // Miss: obtain a frame and materialize the page before it becomes
        // visible to any other pinner.
        self.stats.record_miss();
        let frame_id = self.take_frame(&mut state)?;

        {
            // The frame has no table entry and no pins; its lock is free.
            let mut page = self.frames[frame_id.0].page_mut();
            if let Err(e) = state.storage.read_page(page_id, page.as_mut_slice()) {
                drop(page);
                state.free_list.push(frame_id);
                return Err(e);
            }
        }
        self.stats.record_page_read();

        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));
        frame.clear_dirty();
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id).expect(REPLACER_BOUNDS);
        state
            .replacer
            .set_evictable(frame_id, false)
            .expect(REPLACER_BOUNDS);

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame acquisition and eviction
    // ========================================================================

    /// Obtain an unused frame: free list first, then eviction.
    ///
    /// On return the frame has no page-table entry, no pins and a clean
    /// dirty flag; a dirty victim has been written back.
    fn take_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.evict().ok_or(Error::PoolExhausted)?;
        let frame = &self.frames[frame_id.0];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                // The victim is unpinned and unguarded; its lock is free.
                let page = frame.page();
                if let Err(e) = state.storage.write_page(old_page_id, page.as_slice()) {
                    drop(page);
                    // Leave the victim mapped and hand it back to the
                    // policy; its recency history restarts in the cold
                    // tier.
                    state.replacer.record_access(frame_id).expect(REPLACER_BOUNDS);
                    state
                        .replacer
                        .set_evictable(frame_id, true)
                        .expect(REPLACER_BOUNDS);
                    return Err(e);
                }
                frame.clear_dirty();
                self.stats.record_page_written();
            }
            state.page_table.remove(&old_page_id);
            debug!("evicted {} from {}", old_page_id, frame_id);
        }

        frame.set_page_id(None);
        self.stats.record_eviction();
        Ok(frame_id)
    }
}
