//! Eviction policy for the buffer pool.

mod lru_k;

pub use lru_k::LruKReplacer;
