//! Error types.

use thiserror::Error;

use crate::common::PageId;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the page cache.
///
/// None of these are retried internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the storage port.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page id has never been allocated.
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// The free list is empty and no resident frame is evictable.
    ///
    /// Every frame is pinned; the caller may retry after releasing guards.
    #[error("no free or evictable frame available")]
    PoolExhausted,

    /// The operation referenced a page that is not currently in the pool.
    #[error("page {0} is not resident")]
    PageNotResident(PageId),

    /// Delete was requested on a page that still has live pins.
    #[error("page {0} is pinned")]
    PagePinned(PageId),

    /// A frame id outside the pool's index range reached the eviction
    /// policy. This indicates an internal consistency bug.
    #[error("frame id {0} out of range")]
    InvalidFrameId(usize),

    /// One or more pages failed to flush during `flush_all_pages`.
    ///
    /// Carries every failed page alongside its cause; pages not listed
    /// were flushed successfully.
    #[error("failed to flush {} page(s)", .0.len())]
    FlushAll(Vec<(PageId, Error)>),
}
