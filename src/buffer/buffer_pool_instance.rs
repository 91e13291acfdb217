//! Buffer Pool Instance - one shard of the page cache.
//!
//! A [`BufferPoolInstance`] caches a partition of the page-id space:
//! instance `i` in a parallel pool of `N` owns every page id congruent to
//! `i` modulo `N` and allocates new ids from that residue class. A pool of
//! one instance degenerates to a plain buffer pool.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{PinnedPage, PoolStats};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// Bookkeeping for one frame.
///
/// All of it lives inside the pool latch: pin counts and dirty bits are
/// only ever read or written while the latch is held, so they are plain
/// fields. The frame's page bytes are the one thing kept outside (see
/// [`BufferPoolInstance::page_latches`]) — a pinned page must stay
/// readable and latchable without going through the pool.
#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    /// Resident page, or `PageId::INVALID` while the frame is free.
    page_id: PageId,
    /// Outstanding pin guards on this frame.
    pin_count: u32,
    /// Whether the frame's bytes differ from the stored image.
    is_dirty: bool,
}

impl FrameMeta {
    fn empty() -> Self {
        Self {
            page_id: PageId::INVALID,
            pin_count: 0,
            is_dirty: false,
        }
    }
}

/// Everything guarded by the instance latch.
struct PoolState {
    /// Maps resident page ids to frame ids.
    page_table: HashMap<PageId, FrameId>,

    /// Frames holding no page, consumed from the front.
    free_list: VecDeque<FrameId>,

    /// Unpinned resident frames, LRU victim selection.
    replacer: LruReplacer,

    /// Per-frame metadata, indexed by frame id.
    frames: Vec<FrameMeta>,

    /// Traffic counters (plain integers; the latch serializes them).
    stats: PoolStats,

    /// Next page id this instance will hand out.
    next_page_id: i32,
}

impl PoolState {
    /// Hand out the next page id of this instance's residue class.
    fn allocate_page(&mut self, num_instances: u32) -> PageId {
        let page_id = PageId::new(self.next_page_id);
        self.next_page_id += num_instances as i32;
        page_id
    }
}

/// One buffer pool shard: a fixed array of page frames plus the latched
/// bookkeeping that tracks which page lives where.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                     BufferPoolInstance                       │
/// │  ┌────────────────────────────────────────────────────────┐ │
/// │  │ state: Mutex ── page_table · free_list · replacer      │ │
/// │  │                 frames[FrameMeta] · stats · next_id    │ │
/// │  └────────────────────────────────────────────────────────┘ │
/// │  ┌────────────────────────────┐  ┌────────────────────┐     │
/// │  │ page_latches: Vec<RwLock>  │  │ disk_manager       │     │
/// │  │  [Page0] [Page1] [Page2] … │  │ Arc<Mutex<_>>      │     │
/// │  └────────────────────────────┘  └────────────────────┘     │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Latching
/// One coarse latch (`state`) guards every piece of bookkeeping — page
/// table, free list, replacer, frame metadata, counters, allocation
/// cursor — and stays held across the disk I/O of a miss or an eviction
/// write-back. The buffer pool sits at the top of every page access, but
/// sharding across instances is what buys parallelism; finer locking
/// inside one instance would only duplicate that.
///
/// The page bytes live in `page_latches`, outside the latch, so *pinned*
/// pages can be read, latched, and modified concurrently. A frame's page
/// latch doubles as the per-page reader–writer latch of the index's
/// latching protocol.
///
/// # Pin contract
/// Every successful [`fetch_page`](Self::fetch_page) or
/// [`new_page`](Self::new_page) returns a [`PinnedPage`] owning exactly
/// one pin, released when the guard drops. Pass modifications back by
/// calling [`PinnedPage::mark_dirty`] before the drop.
pub struct BufferPoolInstance {
    /// Number of frames in this instance (immutable after construction).
    pool_size: usize,

    /// Total number of instances in the parallel pool.
    num_instances: u32,

    /// This instance's index, also the first page id it allocates.
    instance_index: u32,

    /// The frames' page bytes, one reader–writer latch per frame.
    page_latches: Vec<RwLock<Page>>,

    /// All mutable bookkeeping, behind the instance latch.
    state: Mutex<PoolState>,

    /// Shared handle to the page store.
    disk_manager: Arc<Mutex<DiskManager>>,
}

impl BufferPoolInstance {
    /// Create one pool instance.
    ///
    /// # Arguments
    /// * `pool_size` - Number of frames in this instance
    /// * `num_instances` - Shard count of the surrounding parallel pool
    /// * `instance_index` - This shard's index in `0..num_instances`
    /// * `disk_manager` - Shared page store
    ///
    /// # Panics
    /// Panics if `pool_size` is 0 or `instance_index >= num_instances`.
    pub fn new(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<Mutex<DiskManager>>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        assert!(
            instance_index < num_instances,
            "instance index out of range"
        );

        Self {
            pool_size,
            num_instances,
            instance_index,
            page_latches: (0..pool_size).map(|_| RwLock::new(Page::new())).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list: (0..pool_size).map(FrameId::new).collect(),
                replacer: LruReplacer::new(pool_size),
                frames: vec![FrameMeta::empty(); pool_size],
                stats: PoolStats::default(),
                next_page_id: instance_index as i32,
            }),
            disk_manager,
        }
    }

    /// A standalone pool: one instance owning the whole id space.
    pub fn standalone(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::new(pool_size, 1, 0, Arc::new(Mutex::new(disk_manager)))
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Allocate a brand-new page and pin it.
    ///
    /// The frame comes from the free list first, then from the LRU
    /// replacer (flushing the victim if dirty). The new page id is drawn
    /// from this instance's residue class and the frame is zeroed. Nothing
    /// is written to disk yet; an unmodified new page evicted later simply
    /// reads back as zeros.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` when every frame is pinned.
    pub fn new_page(&self) -> Result<PinnedPage<'_>> {
        let mut state = self.state.lock();
        let state = &mut *state;

        let frame_id = self.take_victim(state)?;
        let page_id = state.allocate_page(self.num_instances);

        self.page_latches[frame_id.0].write().reset();
        state.frames[frame_id.0] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        state.page_table.insert(page_id, frame_id);

        log::debug!("allocated {page_id} in frame {frame_id}");
        Ok(PinnedPage::new(self, frame_id, page_id))
    }

    /// Fetch a page and pin it.
    ///
    /// A resident page costs one pin-count bump; a miss takes a victim
    /// frame and reads the image from the page store.
    ///
    /// # Errors
    /// `Error::NoFreeFrames` on a miss when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PinnedPage<'_>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut state = self.state.lock();
        let state = &mut *state;

        // Fast path: already resident.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let meta = &mut state.frames[frame_id.0];
            meta.pin_count += 1;
            if meta.pin_count == 1 {
                state.replacer.pin(frame_id);
            }
            state.stats.cache_hits += 1;
            return Ok(PinnedPage::new(self, frame_id, page_id));
        }

        state.stats.cache_misses += 1;
        let frame_id = self.take_victim(state)?;

        {
            let mut page = self.page_latches[frame_id.0].write();
            let mut disk = self.disk_manager.lock();
            if let Err(e) = disk.read_page(page_id, &mut page) {
                // Put the frame back rather than leaking it; the image
                // may be half-filled, so scrub it too.
                page.reset();
                drop(page);
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        }
        state.stats.pages_read += 1;

        state.frames[frame_id.0] = FrameMeta {
            page_id,
            pin_count: 1,
            is_dirty: false,
        };
        state.page_table.insert(page_id, frame_id);

        Ok(PinnedPage::new(self, frame_id, page_id))
    }

    /// Flush a page to the page store if it is dirty.
    ///
    /// A clean resident page is a no-op.
    ///
    /// # Errors
    /// `Error::PageNotResident` if the page is not in this instance.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(Error::PageNotResident(page_id.0))?;
        self.flush_frame(&mut state, frame_id)
    }

    /// Flush every resident dirty page.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.state.lock();
        let resident: Vec<FrameId> = state.page_table.values().copied().collect();
        for frame_id in resident {
            self.flush_frame(&mut state, frame_id)?;
        }
        Ok(())
    }

    /// Delete a page from the buffer pool.
    ///
    /// A non-resident page succeeds trivially (page ids are never reused,
    /// so there is nothing else to reclaim). The frame is flushed if
    /// dirty, zeroed, and returned to the free list.
    ///
    /// # Errors
    /// `Error::PagePinned` while anyone still holds a pin.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&fid) => fid,
            None => return Ok(()),
        };

        if state.frames[frame_id.0].pin_count > 0 {
            return Err(Error::PagePinned(page_id.0));
        }
        if state.frames[frame_id.0].is_dirty {
            self.flush_frame(&mut state, frame_id)?;
        }

        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        state.frames[frame_id.0] = FrameMeta::empty();
        self.page_latches[frame_id.0].write().reset();
        state.free_list.push_back(frame_id);

        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of frames in this instance.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// This instance's index within the parallel pool.
    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Number of frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of evictable (resident, unpinned) frames.
    pub fn evictable_frame_count(&self) -> usize {
        self.state.lock().replacer.len()
    }

    /// Traffic counters since construction.
    pub fn stats(&self) -> PoolStats {
        self.state.lock().stats
    }

    /// Pin count of a resident page, for assertions in tests.
    #[cfg(test)]
    pub(crate) fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let frame_id = state.page_table.get(&page_id)?;
        Some(state.frames[frame_id.0].pin_count)
    }

    /// The page latch behind a guard; used by [`PinnedPage`].
    #[inline]
    pub(crate) fn page_latch(&self, frame_id: FrameId) -> &RwLock<Page> {
        &self.page_latches[frame_id.0]
    }

    /// Release one pin. Called by [`PinnedPage`] on drop.
    pub(crate) fn unpin_frame(&self, frame_id: FrameId, dirty: bool) {
        let mut state = self.state.lock();
        let state = &mut *state;

        let meta = &mut state.frames[frame_id.0];
        debug_assert!(meta.pin_count > 0, "unpin of an unpinned frame");
        if dirty {
            meta.is_dirty = true;
        }
        meta.pin_count -= 1;
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
    }

    // ========================================================================
    // Internal: frame allocation and eviction
    // ========================================================================

    /// Take a usable frame: free list first, then an LRU victim (written
    /// back first when dirty). Caller holds the instance latch.
    fn take_victim(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match state.replacer.victim() {
            Some(fid) => fid,
            None => {
                log::warn!(
                    "pool instance {} exhausted: every frame pinned",
                    self.instance_index
                );
                return Err(Error::NoFreeFrames);
            }
        };

        let meta = state.frames[frame_id.0];
        if meta.page_id.is_valid() {
            if meta.is_dirty {
                let page = self.page_latches[frame_id.0].read();
                let written = self.disk_manager.lock().write_page(meta.page_id, &page);
                drop(page);
                if let Err(e) = written {
                    // The victim stays resident; make it evictable again.
                    state.replacer.unpin(frame_id);
                    return Err(e);
                }
                state.stats.pages_written += 1;
            }
            state.page_table.remove(&meta.page_id);
            log::debug!("evicted {} from frame {frame_id}", meta.page_id);
        }

        state.frames[frame_id.0] = FrameMeta::empty();
        state.stats.evictions += 1;

        Ok(frame_id)
    }

    /// Write one frame back if dirty and clear its dirty bit. Caller
    /// holds the instance latch.
    fn flush_frame(&self, state: &mut PoolState, frame_id: FrameId) -> Result<()> {
        let meta = state.frames[frame_id.0];
        if meta.is_dirty {
            let page = self.page_latches[frame_id.0].read();
            self.disk_manager.lock().write_page(meta.page_id, &page)?;
            drop(page);

            state.frames[frame_id.0].is_dirty = false;
            state.stats.pages_written += 1;
        }
        Ok(())
    }
}
