//! Pinion - a relational storage core with safe concurrent access.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Pinion                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Executors (execution/)                        │   │
//! │  │     SeqScan · Insert · Update · Delete                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │             ↓ row locks                 ↓ index ops             │
//! │  ┌──────────────────────────┐  ┌─────────────────────────┐     │
//! │  │ Concurrency (concurrency/)│  │   Index (index/)        │     │
//! │  │ LockManager + wound-wait  │  │  ExtendibleHashTable    │     │
//! │  │ Transaction(Manager)      │  │  directory + buckets    │     │
//! │  └──────────────────────────┘  └─────────────────────────┘     │
//! │                              ↓ pinned pages                     │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Buffer Pool (buffer/)                         │   │
//! │  │  ParallelBufferPool → N × BufferPoolInstance             │   │
//! │  │  PinnedPage · LruReplacer · PoolStats                    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓ page images                      │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Storage (storage/)                            │   │
//! │  │  DiskManager · Page · page formats · TableHeap           │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Rid, Error, config)
//! - [`buffer`] - Sharded buffer pool with pin guards and LRU eviction
//! - [`storage`] - Disk I/O, page formats, and the table heap
//! - [`index`] - Extendible hash index over the buffer pool
//! - [`concurrency`] - Two-phase locking with wound-wait prevention
//! - [`execution`] - The executors that tie locks and indexes together
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use pinion::buffer::ParallelBufferPool;
//! use pinion::storage::DiskManager;
//!
//! let dm = DiskManager::create("my_database.db").unwrap();
//! let pool = Arc::new(ParallelBufferPool::new(4, 64, dm));
//!
//! let page = pool.new_page().unwrap();
//! page.write().bytes_mut()[0] = 0xAB;
//! page.mark_dirty();
//! ```

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{AbortReason, Error, FrameId, PageId, Result, Rid, TxnId};

pub use buffer::{BufferPoolInstance, ParallelBufferPool, PinnedPage, PoolStats};
pub use concurrency::{IsolationLevel, LockManager, Transaction, TransactionManager};
pub use index::ExtendibleHashTable;
pub use storage::{DiskManager, TableHeap};
