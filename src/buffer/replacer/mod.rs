//! Eviction policy for the buffer pool.
//!
//! The pool tracks unpinned frames through [`LruReplacer`] and asks it for
//! a victim when the free list runs dry.

mod lru;

pub use lru::LruReplacer;
