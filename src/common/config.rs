//! Configuration constants.

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so frames stay friendly to
/// aligned I/O and the OS page cache.
pub const PAGE_SIZE: usize = 4096;

/// Default `k` for the LRU-K eviction policy.
///
/// A frame needs `k` recorded accesses before it graduates from the FIFO
/// history tier to the LRU cache tier.
pub const DEFAULT_REPLACER_K: usize = 2;
