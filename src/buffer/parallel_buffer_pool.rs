//! Parallel Buffer Pool - shards page ownership across instances.
//!
//! Routing is pure dispatch: `page_id mod N` names the owning
//! [`BufferPoolInstance`], so operations on distinct shards never contend.
//! Only new-page allocation takes a pool-level mutex, and that mutex is
//! never a BPI latch — the shards stay independent.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{BufferPoolInstance, PinnedPage, PoolStats};
use crate::common::{Error, PageId, Result};
use crate::storage::DiskManager;

/// A pool of `N` independent buffer pool instances over one page store.
///
/// Each instance allocates page ids from its own residue class
/// (`i, i+N, i+2N, …`), which makes the routing function trivial and
/// stable: the id itself says where the page lives.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let pool = ParallelBufferPool::new(4, 16, dm);   // 4 shards × 16 frames
///
/// let guard = pool.new_page()?;                    // round-robin shard
/// let same = pool.fetch_page(guard.page_id())?;    // routed by id
/// ```
pub struct ParallelBufferPool {
    instances: Vec<BufferPoolInstance>,

    /// Round-robin cursor for new-page allocation.
    next_instance: Mutex<usize>,
}

impl ParallelBufferPool {
    /// Create a parallel pool of `num_instances` shards with `pool_size`
    /// frames each.
    ///
    /// # Panics
    /// Panics if `num_instances` is 0 (a pool must have at least one
    /// shard) or `pool_size` is 0.
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: DiskManager) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");

        let disk_manager = Arc::new(Mutex::new(disk_manager));
        let instances = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::new(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                )
            })
            .collect();

        Self {
            instances,
            next_instance: Mutex::new(0),
        }
    }

    /// The shard owning `page_id`.
    #[inline]
    fn instance_for(&self, page_id: PageId) -> &BufferPoolInstance {
        let shard = (page_id.0 as usize) % self.instances.len();
        &self.instances[shard]
    }

    /// Allocate a new page on some shard.
    ///
    /// Starting at the round-robin cursor, each instance is tried once;
    /// the cursor advances regardless of the outcome so consecutive
    /// allocations spread across shards.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` when every instance is exhausted.
    pub fn new_page(&self) -> Result<PinnedPage<'_>> {
        let mut cursor = self.next_instance.lock();

        for _ in 0..self.instances.len() {
            let index = *cursor;
            *cursor = (*cursor + 1) % self.instances.len();

            match self.instances[index].new_page() {
                Ok(guard) => return Ok(guard),
                Err(Error::NoFreeFrames) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(Error::NoFreeFrames)
    }

    /// Fetch `page_id` from its owning shard.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PinnedPage<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.instance_for(page_id).fetch_page(page_id)
    }

    /// Flush `page_id` on its owning shard.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.instance_for(page_id).flush_page(page_id)
    }

    /// Delete `page_id` on its owning shard.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        self.instance_for(page_id).delete_page(page_id)
    }

    /// Flush every dirty page on every shard.
    pub fn flush_all_pages(&self) -> Result<()> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    /// Total frame count across all shards.
    pub fn total_pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    /// Number of shards.
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The shards themselves (for inspection in tests and diagnostics).
    pub fn instances(&self) -> &[BufferPoolInstance] {
        &self.instances
    }

    /// Traffic counters summed across shards.
    pub fn stats(&self) -> PoolStats {
        self.instances.iter().map(|i| i.stats()).sum()
    }
}
