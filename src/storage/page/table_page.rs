//! Slotted page format for the table heap.
//!
//! Tuples are raw byte strings. The slot array grows up from the header
//! while tuple bytes grow down from the end of the page; a deleted tuple
//! keeps its slot and bytes but carries a tombstone bit, so deletes can be
//! rolled back by clearing the bit.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};

const OFFSET_NEXT_PAGE_ID: usize = 0;
const OFFSET_CHECKSUM: usize = 4;
const OFFSET_NUM_SLOTS: usize = 8;
const OFFSET_FREE_PTR: usize = 10;
const HEADER_LEN: usize = 12;
const SLOT_LEN: usize = 4;

/// Tombstone marker in a slot's length field.
const TOMBSTONE_BIT: u16 = 0x8000;

/// Largest tuple a single page can hold.
pub const MAX_TUPLE_LEN: usize = PAGE_SIZE - HEADER_LEN - SLOT_LEN;

/// Read-only view of a table page.
///
/// # Layout (little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     next_page_id (i32, INVALID terminates the chain)
/// 4       4     checksum (CRC32 with this field zeroed)
/// 8       2     num_slots (u16)
/// 10      2     free_ptr (u16, low end of the tuple area)
/// 12      4×n   slots { offset: u16, len: u16 }  (len MSB = tombstone)
/// ...           free space
/// free_ptr..    tuple bytes, newest lowest
/// ```
pub struct TablePageRef<'a> {
    data: &'a [u8],
}

impl<'a> TablePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The next page in the heap's chain, or `PageId::INVALID`.
    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_i32(self.data, OFFSET_NEXT_PAGE_ID))
    }

    pub fn num_slots(&self) -> usize {
        read_u16(self.data, OFFSET_NUM_SLOTS) as usize
    }

    fn free_ptr(&self) -> usize {
        read_u16(self.data, OFFSET_FREE_PTR) as usize
    }

    /// Bytes still available for one more tuple plus its slot.
    pub fn free_space(&self) -> usize {
        self.free_ptr() - HEADER_LEN - SLOT_LEN * self.num_slots()
    }

    fn slot(&self, slot: usize) -> (usize, u16) {
        let base = HEADER_LEN + SLOT_LEN * slot;
        (read_u16(self.data, base) as usize, read_u16(self.data, base + 2))
    }

    /// The live tuple in `slot`, or `None` if out of range or tombstoned.
    pub fn get_tuple(&self, slot: usize) -> Option<&'a [u8]> {
        if slot >= self.num_slots() {
            return None;
        }
        let (offset, len) = self.slot(slot);
        if len & TOMBSTONE_BIT != 0 {
            return None;
        }
        Some(&self.data[offset..offset + len as usize])
    }

    /// Whether the slot exists and carries a tombstone.
    pub fn is_tombstoned(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.slot(slot).1 & TOMBSTONE_BIT != 0
    }

    /// CRC32 of the page with the checksum field zeroed.
    pub fn compute_checksum(&self) -> u32 {
        compute_checksum(self.data)
    }

    /// Whether the stored checksum matches the page contents.
    pub fn verify_checksum(&self) -> bool {
        read_i32(self.data, OFFSET_CHECKSUM) as u32 == self.compute_checksum()
    }
}

/// Mutable view of a table page.
pub struct TablePageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn view(&self) -> TablePageRef<'_> {
        TablePageRef::new(self.data)
    }

    /// Format a blank page: empty slot array, full tuple area, no
    /// successor. A zeroed frame is *not* a valid table page (page id 0
    /// exists), so the heap calls this on every fresh page.
    pub fn init(&mut self) {
        self.data[..HEADER_LEN].fill(0);
        write_i32(self.data, OFFSET_NEXT_PAGE_ID, PageId::INVALID.0);
        write_u16(self.data, OFFSET_NUM_SLOTS, 0);
        write_u16(self.data, OFFSET_FREE_PTR, PAGE_SIZE as u16);
        self.update_checksum();
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_i32(self.data, OFFSET_NEXT_PAGE_ID, next.0);
    }

    /// Append a tuple, returning its slot, or `None` when the page lacks
    /// room for the bytes plus a slot entry.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Option<usize> {
        let view = self.view();
        let num_slots = view.num_slots();
        if view.free_space() < tuple.len() + SLOT_LEN {
            return None;
        }

        let offset = view.free_ptr() - tuple.len();
        self.data[offset..offset + tuple.len()].copy_from_slice(tuple);

        let base = HEADER_LEN + SLOT_LEN * num_slots;
        write_u16(self.data, base, offset as u16);
        write_u16(self.data, base + 2, tuple.len() as u16);
        write_u16(self.data, OFFSET_NUM_SLOTS, (num_slots + 1) as u16);
        write_u16(self.data, OFFSET_FREE_PTR, offset as u16);

        Some(num_slots)
    }

    /// Overwrite a live tuple in place. The replacement must have the
    /// same length as the stored tuple.
    pub fn update_tuple(&mut self, slot: usize, tuple: &[u8]) -> Result<()> {
        let view = self.view();
        if slot >= view.num_slots() || view.is_tombstoned(slot) {
            return Err(Error::TupleSizeMismatch);
        }
        let (offset, len) = view.slot(slot);
        if len as usize != tuple.len() {
            return Err(Error::TupleSizeMismatch);
        }
        self.data[offset..offset + tuple.len()].copy_from_slice(tuple);
        Ok(())
    }

    /// Tombstone a live slot. Returns whether the slot was live.
    pub fn mark_delete(&mut self, slot: usize) -> bool {
        let view = self.view();
        if slot >= view.num_slots() || view.is_tombstoned(slot) {
            return false;
        }
        let base = HEADER_LEN + SLOT_LEN * slot;
        let len = read_u16(self.data, base + 2);
        write_u16(self.data, base + 2, len | TOMBSTONE_BIT);
        true
    }

    /// Clear a slot's tombstone. Returns whether the slot exists.
    pub fn unmark_delete(&mut self, slot: usize) -> bool {
        if slot >= self.view().num_slots() {
            return false;
        }
        let base = HEADER_LEN + SLOT_LEN * slot;
        let len = read_u16(self.data, base + 2);
        write_u16(self.data, base + 2, len & !TOMBSTONE_BIT);
        true
    }

    /// Stamp the CRC32 of the current contents into the header.
    ///
    /// Call after the last mutation of a write latch's critical section.
    pub fn update_checksum(&mut self) {
        let checksum = compute_checksum(self.data);
        write_i32(self.data, OFFSET_CHECKSUM, checksum as i32);
    }
}

/// CRC32 over every page byte except the checksum field itself.
fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..OFFSET_CHECKSUM]);
    hasher.update(&data[OFFSET_CHECKSUM + 4..]);
    hasher.finalize()
}

#[inline]
fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn read_i32(data: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

#[inline]
fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
