//! RAII pin guard for buffer pool pages.
//!
//! A [`PinnedPage`] owns exactly one pin on a frame. Dropping it releases
//! the pin and hands the accumulated dirty flag back to the pool, so a
//! fetch can never leak a pin or report the wrong dirty state on an early
//! return.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_instance::BufferPoolInstance;

/// A pinned page in the buffer pool.
///
/// The guard pins the frame for its whole lifetime; the page bytes are
/// reached through [`read`](PinnedPage::read) / [`write`](PinnedPage::write),
/// which take the frame's reader–writer latch. Index code uses that latch
/// as the per-bucket-page latch of the latching protocol.
///
/// Call [`mark_dirty`](PinnedPage::mark_dirty) after modifying the page;
/// the flag is ORed into the frame when the guard drops. A guard that is
/// dropped without marking releases its pin clean.
///
/// # Example
/// ```ignore
/// let guard = pool.fetch_page(page_id)?;
/// {
///     let mut page = guard.write();     // page latch, exclusive
///     page.bytes_mut()[0] = 0xFF;
/// }
/// guard.mark_dirty();
/// // guard drops: pin released, frame marked dirty
/// ```
pub struct PinnedPage<'a> {
    /// Pool instance that owns the frame; unpinned against it on drop.
    bpi: &'a BufferPoolInstance,
    frame_id: FrameId,
    page_id: PageId,
    /// Whether the holder modified the page under this pin.
    dirty: Cell<bool>,
}

impl<'a> PinnedPage<'a> {
    /// Create a guard for a freshly pinned frame.
    ///
    /// Called by the pool instance's fetch/new paths.
    pub(crate) fn new(bpi: &'a BufferPoolInstance, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpi,
            frame_id,
            page_id,
            dirty: Cell::new(false),
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

    /// Acquire the page latch in shared mode.
    #[inline]
    pub fn read(&self) -> PageReadGuard<'_> {
        PageReadGuard {
            lock: self.bpi.page_latch(self.frame_id).read(),
        }
    }

    /// Acquire the page latch in exclusive mode.
    #[inline]
    pub fn write(&self) -> PageWriteGuard<'_> {
        PageWriteGuard {
            lock: self.bpi.page_latch(self.frame_id).write(),
        }
    }

    /// Record that the page was modified under this pin.
    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PinnedPage<'_> {
    fn drop(&mut self) {
        self.bpi.unpin_frame(self.frame_id, self.dirty.get());
    }
}

/// Shared (read-latched) view of a pinned page's bytes.
pub struct PageReadGuard<'a> {
    lock: RwLockReadGuard<'a, Page>,
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Exclusive (write-latched) view of a pinned page's bytes.
pub struct PageWriteGuard<'a> {
    lock: RwLockWriteGuard<'a, Page>,
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}
