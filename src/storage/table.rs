//! Table heap - a linked chain of slotted pages over the buffer pool.
//!
//! The heap supports the executor surface: append-only inserts,
//! same-length in-place updates, tombstone deletes (reversible for
//! rollback), point lookups by rid, and a live-tuple scan.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::ParallelBufferPool;
use crate::common::{Error, PageId, Result, Rid};
use crate::storage::page::{TablePageMut, TablePageRef, MAX_TUPLE_LEN};

/// A heap of raw-byte tuples.
///
/// Pages are chained through their `next_page_id` header field; inserts
/// go to the tail page, allocating and linking a new one when it fills.
/// The tail pointer is kept under a mutex so concurrent inserts serialize
/// on page allocation but reads stay latch-only.
pub struct TableHeap {
    pool: Arc<ParallelBufferPool>,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    /// Create an empty heap, allocating its first page.
    pub fn create(pool: Arc<ParallelBufferPool>) -> Result<Self> {
        let first_page_id = {
            let guard = pool.new_page()?;
            let mut page = guard.write();
            TablePageMut::new(page.bytes_mut()).init();
            drop(page);
            guard.mark_dirty();
            guard.page_id()
        };

        Ok(Self {
            pool,
            first_page_id,
            last_page_id: Mutex::new(first_page_id),
        })
    }

    /// Open an existing heap rooted at `first_page_id`, walking the chain
    /// to find the current tail.
    pub fn open(pool: Arc<ParallelBufferPool>, first_page_id: PageId) -> Result<Self> {
        let mut last = first_page_id;
        loop {
            let guard = pool.fetch_page(last)?;
            let page = guard.read();
            let next = TablePageRef::new(page.bytes()).next_page_id();
            drop(page);
            if !next.is_valid() {
                break;
            }
            last = next;
        }

        Ok(Self {
            pool,
            first_page_id,
            last_page_id: Mutex::new(last),
        })
    }

    /// First page of the chain (fixed for the heap's lifetime).
    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, returning its rid.
    pub fn insert(&self, tuple: &[u8]) -> Result<Rid> {
        if tuple.len() > MAX_TUPLE_LEN {
            return Err(Error::TupleTooLarge {
                size: tuple.len(),
                max: MAX_TUPLE_LEN,
            });
        }

        let mut last = self.last_page_id.lock();

        {
            let guard = self.pool.fetch_page(*last)?;
            let mut page = guard.write();
            let mut table_page = TablePageMut::new(page.bytes_mut());
            if let Some(slot) = table_page.insert_tuple(tuple) {
                table_page.update_checksum();
                drop(page);
                guard.mark_dirty();
                return Ok(Rid::new(*last, slot as u32));
            }
        }

        // Tail is full: grow the chain by one page.
        let new_guard = self.pool.new_page()?;
        let new_page_id = new_guard.page_id();
        {
            let mut page = new_guard.write();
            TablePageMut::new(page.bytes_mut()).init();
        }

        {
            let old_guard = self.pool.fetch_page(*last)?;
            let mut page = old_guard.write();
            let mut table_page = TablePageMut::new(page.bytes_mut());
            table_page.set_next_page_id(new_page_id);
            table_page.update_checksum();
            drop(page);
            old_guard.mark_dirty();
        }

        let slot = {
            let mut page = new_guard.write();
            let mut table_page = TablePageMut::new(page.bytes_mut());
            // A fresh page always fits a tuple within MAX_TUPLE_LEN.
            let slot = table_page.insert_tuple(tuple).ok_or(Error::TupleTooLarge {
                size: tuple.len(),
                max: MAX_TUPLE_LEN,
            })?;
            table_page.update_checksum();
            slot
        };
        new_guard.mark_dirty();

        *last = new_page_id;
        Ok(Rid::new(new_page_id, slot as u32))
    }

    /// The live tuple at `rid`, or `None` when the slot is missing or
    /// tombstoned.
    pub fn get(&self, rid: Rid) -> Result<Option<Vec<u8>>> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let page = guard.read();
        let view = TablePageRef::new(page.bytes());
        Ok(view.get_tuple(rid.slot as usize).map(|t| t.to_vec()))
    }

    /// Overwrite the live tuple at `rid` with a same-length replacement.
    pub fn update(&self, rid: Rid, tuple: &[u8]) -> Result<()> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let mut page = guard.write();
        let mut table_page = TablePageMut::new(page.bytes_mut());

        if table_page.view().get_tuple(rid.slot as usize).is_none() {
            return Err(Error::TupleNotFound(rid));
        }
        table_page.update_tuple(rid.slot as usize, tuple)?;
        table_page.update_checksum();
        drop(page);
        guard.mark_dirty();
        Ok(())
    }

    /// Tombstone the tuple at `rid`.
    pub fn mark_delete(&self, rid: Rid) -> Result<()> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let mut page = guard.write();
        let mut table_page = TablePageMut::new(page.bytes_mut());

        if !table_page.mark_delete(rid.slot as usize) {
            return Err(Error::TupleNotFound(rid));
        }
        table_page.update_checksum();
        drop(page);
        guard.mark_dirty();
        Ok(())
    }

    /// Clear the tombstone at `rid` (delete rollback).
    pub fn unmark_delete(&self, rid: Rid) -> Result<()> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let mut page = guard.write();
        let mut table_page = TablePageMut::new(page.bytes_mut());

        if !table_page.unmark_delete(rid.slot as usize) {
            return Err(Error::TupleNotFound(rid));
        }
        table_page.update_checksum();
        drop(page);
        guard.mark_dirty();
        Ok(())
    }
}

/// Cursor over a heap's live tuples.
///
/// Not a `std::iter::Iterator` because every step can touch the buffer
/// pool and fail; `next` returns `Result<Option<..>>` instead.
pub struct TableIter {
    heap: Arc<TableHeap>,
    page_id: PageId,
    next_slot: usize,
}

impl TableIter {
    /// Scan `heap`'s live tuples in rid order from the start.
    pub fn new(heap: Arc<TableHeap>) -> Self {
        let page_id = heap.first_page_id;
        Self {
            heap,
            page_id,
            next_slot: 0,
        }
    }

    /// The next live tuple, or `None` at the end of the chain.
    pub fn next(&mut self) -> Result<Option<(Rid, Vec<u8>)>> {
        loop {
            if !self.page_id.is_valid() {
                return Ok(None);
            }

            let guard = self.heap.pool.fetch_page(self.page_id)?;
            let page = guard.read();
            let view = TablePageRef::new(page.bytes());

            if self.next_slot == 0 && !view.verify_checksum() {
                return Err(Error::ChecksumMismatch(self.page_id.0));
            }

            while self.next_slot < view.num_slots() {
                let slot = self.next_slot;
                self.next_slot += 1;
                if let Some(tuple) = view.get_tuple(slot) {
                    let rid = Rid::new(self.page_id, slot as u32);
                    return Ok(Some((rid, tuple.to_vec())));
                }
            }

            self.page_id = view.next_page_id();
            self.next_slot = 0;
        }
    }
}
