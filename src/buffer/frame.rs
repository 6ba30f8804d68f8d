//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata the manager needs:
//! which page is resident, how many live guards pin it, and whether its
//! bytes diverge from the persisted copy.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::Page;

/// A frame in the buffer pool.
///
/// Frames are allocated once at pool construction and live for the pool's
/// lifetime, cycling through many (page id, content) bindings.
///
/// # Synchronization
/// The page content sits behind its own `RwLock` - the per-page content lock
/// held by read/write guards. The metadata fields are atomics: they are only
/// ever *mutated* while the manager's bookkeeping lock is held, and the
/// atomics make lock-free observation (e.g. [`pin_count`](Self::pin_count))
/// sound.
pub struct Frame {
    /// The page data, protected by the per-page content lock.
    page: RwLock<Page>,

    /// Resident page id, or `PageId::INVALID` when the frame is unused.
    page_id: AtomicU32,

    /// Number of live guards holding this frame's page.
    pin_count: AtomicU32,

    /// Whether the page has been modified since its last write-back.
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    /// Acquire the shared content lock.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire the exclusive content lock.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Get the resident page's id, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        let raw = PageId(self.page_id.load(Ordering::Relaxed));
        raw.is_valid().then_some(raw)
    }

    /// Set or clear the resident page id.
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        let raw = page_id.unwrap_or(PageId::INVALID);
        self.page_id.store(raw.0, Ordering::Relaxed);
    }

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the pin count, saturating at zero.
    ///
    /// Returns the new pin count, or `None` if the count was already zero
    /// (the no-op case the caller must report rather than act on).
    #[inline]
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1))
            .ok()
            .map(|old| old - 1)
    }

    /// Get the current pin count.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    /// Check if the frame is currently pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Mark the frame as dirty. Dirty is monotonic until the next flush.
    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Relaxed);
    }

    /// Clear the dirty flag (after a successful write-back).
    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Relaxed);
    }

    /// Check if the frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Relaxed)
    }

    /// Reset the frame to its unused state: no page, no pins, clean, zeroed.
    ///
    /// Caller must guarantee no guard references the frame (pin count zero).
    pub fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Relaxed);
        self.is_dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
