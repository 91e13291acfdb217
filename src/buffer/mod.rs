//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between storage engines
//! and disk. It manages fixed pools of page frames; each frame's
//! metadata lives inside its instance's latch, while the page bytes sit
//! behind per-frame reader–writer latches.
//!
//! # Components
//! - [`BufferPoolInstance`] - One page-cache shard with a coarse latch
//! - [`ParallelBufferPool`] - N instances routed by `page_id mod N`
//! - [`PinnedPage`] - RAII pin guard with latched page access
//! - [`PoolStats`] - Traffic counters, foldable across shards
//! - [`replacer`] - LRU victim selection

mod buffer_pool_instance;
mod page_guard;
mod parallel_buffer_pool;
pub mod replacer;
mod stats;

pub use buffer_pool_instance::BufferPoolInstance;
pub use page_guard::{PageReadGuard, PageWriteGuard, PinnedPage};
pub use parallel_buffer_pool::ParallelBufferPool;
pub use stats::PoolStats;
