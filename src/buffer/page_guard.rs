//! Scoped-ownership guards for page access.
//!
//! A guard owns exactly one pin and releases it exactly once, no matter how
//! it goes out of scope. Three flavors, differing only in which per-page
//! content lock they additionally hold:
//! - [`PageGuard`] - pin only, no content lock
//! - [`PageReadGuard`] - pin + shared content lock
//! - [`PageWriteGuard`] - pin + exclusive content lock
//!
//! Guards are move-only; duplicating a pin/lock ownership token is
//! impossible by construction. The release sequence - content lock first,
//! then the pin - is implemented once: the read/write wrappers declare
//! their lock field ahead of the pin-owning [`PageGuard`], so drop order
//! enforces it, and the explicit [`drop_guard`](PageGuard::drop_guard) path
//! follows the same order.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// A pinned page without a content lock.
///
/// Useful when the caller coordinates access some other way, or as the
/// starting point for [`upgrade_read`](Self::upgrade_read) /
/// [`upgrade_write`](Self::upgrade_write). Content access through
/// [`read`](Self::read) / [`write`](Self::write) takes the content lock
/// only for the borrow's duration.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    /// Accumulated modification flag, reported at unpin time.
    dirty: bool,
    /// False once the pin has been released.
    active: bool,
}

impl<'a> PageGuard<'a> {
    /// Bind to a page whose pin the caller has already taken.
    pub(crate) fn new(bpm: &'a BufferPoolManager, page_id: PageId, frame_id: FrameId) -> Self {
        Self {
            bpm,
            page_id,
            frame_id,
            dirty: false,
            active: true,
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Read the page through a briefly-held shared content lock.
    ///
    /// # Panics
    /// Panics if the guard has already been released.
    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        assert!(self.active, "page guard already released");
        self.bpm.frame(self.frame_id).page()
    }

    /// Modify the page through a briefly-held exclusive content lock.
    ///
    /// Marks the guard dirty.
    ///
    /// # Panics
    /// Panics if the guard has already been released.
    pub fn write(&mut self) -> RwLockWriteGuard<'_, Page> {
        assert!(self.active, "page guard already released");
        self.dirty = true;
        self.bpm.frame(self.frame_id).page_mut()
    }

    /// Attach a shared content lock, turning this into a read guard.
    ///
    /// The pin is already held, so the page cannot be evicted while this
    /// waits for an active writer.
    ///
    /// # Panics
    /// Panics if the guard has already been released.
    pub fn upgrade_read(self) -> PageReadGuard<'a> {
        assert!(self.active, "page guard already released");
        let bpm: &'a BufferPoolManager = self.bpm;
        let lock = bpm.frame(self.frame_id).page();
        PageReadGuard {
            lock: Some(lock),
            guard: self,
        }
    }

    /// Attach an exclusive content lock, turning this into a write guard.
    ///
    /// # Panics
    /// Panics if the guard has already been released.
    pub fn upgrade_write(self) -> PageWriteGuard<'a> {
        assert!(self.active, "page guard already released");
        let bpm: &'a BufferPoolManager = self.bpm;
        let lock = bpm.frame(self.frame_id).page_mut();
        PageWriteGuard {
            lock: Some(lock),
            guard: self,
        }
    }

    /// Release the pin now instead of at end of scope.
    ///
    /// Idempotent: only the first call releases anything.
    pub fn drop_guard(&mut self) {
        if self.active {
            self.active = false;
            self.bpm.unpin_page(self.page_id, self.dirty);
        }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Guard for shared read access to a page.
///
/// Multiple read guards for the same page may be alive at once. Derefs to
/// [`Page`].
pub struct PageReadGuard<'a> {
    /// Declared before the pin owner: dropped first, so the content lock is
    /// released before the pin.
    lock: Option<RwLockReadGuard<'a, Page>>,
    guard: PageGuard<'a>,
}

impl PageReadGuard<'_> {
    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Release the content lock and the pin now instead of at end of scope.
    ///
    /// Idempotent: only the first call releases anything.
    pub fn drop_guard(&mut self) {
        self.lock = None;
        self.guard.drop_guard();
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page guard already released")
    }
}

/// Guard for exclusive write access to a page.
///
/// Excludes all other readers and writers of the same page. Derefs to
/// [`Page`]; the first mutable access marks the page dirty.
pub struct PageWriteGuard<'a> {
    /// Declared before the pin owner: dropped first, so the content lock is
    /// released before the pin.
    lock: Option<RwLockWriteGuard<'a, Page>>,
    guard: PageGuard<'a>,
}

impl PageWriteGuard<'_> {
    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.guard.frame_id()
    }

    /// Release the content lock and the pin now instead of at end of scope.
    ///
    /// Idempotent: only the first call releases anything.
    pub fn drop_guard(&mut self) {
        self.lock = None;
        self.guard.drop_guard();
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page guard already released")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.guard.dirty = true;
        self.lock.as_mut().expect("page guard already released")
    }
}
