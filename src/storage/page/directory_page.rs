//! Directory page for the extendible hash index.
//!
//! One directory page governs the whole table: it holds the global depth
//! and, for each of the first `2^global_depth` slots, the id and local
//! depth of the bucket that slot points at.
//!
//! The directory is a *parsed* view: it is decoded from a pinned frame's
//! bytes, mutated in memory under the index's table latch, and serialized
//! back before the frame is unpinned dirty. No in-place punning.

use std::collections::HashMap;

use crate::common::PageId;

/// Maximum number of hash bits the directory can use.
pub const MAX_DEPTH: u32 = 9;

/// Number of directory slots backed by the page layout (`2^MAX_DEPTH`).
pub const DIR_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

const OFFSET_PAGE_ID: usize = 0;
const OFFSET_LSN: usize = 4;
const OFFSET_GLOBAL_DEPTH: usize = 8;
const OFFSET_LOCAL_DEPTHS: usize = 12;
const OFFSET_BUCKET_PAGE_IDS: usize = OFFSET_LOCAL_DEPTHS + DIR_ARRAY_SIZE;

/// Encoded size: header, one depth byte per slot, one i32 page id per slot.
pub const DIRECTORY_PAGE_ENCODED_LEN: usize = OFFSET_BUCKET_PAGE_IDS + 4 * DIR_ARRAY_SIZE;

// The encoding must fit inside one page.
const _: () = assert!(DIRECTORY_PAGE_ENCODED_LEN <= crate::common::config::PAGE_SIZE);

/// In-memory view of the hash table's directory page.
///
/// # Layout (little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     page_id (i32)
/// 4       4     lsn (u32)
/// 8       4     global_depth (u32)
/// 12      512   local_depths (u8 each)
/// 524     2048  bucket_page_ids (i32 each)
/// ```
///
/// # Invariants
/// - `local_depths[i] <= global_depth` for every slot below `size()`
/// - each distinct bucket page id `P` is referenced by exactly
///   `2^(global_depth - local_depth(P))` slots
/// - every slot referencing `P` carries the same local depth
#[derive(Debug, Clone)]
pub struct DirectoryPage {
    page_id: PageId,
    lsn: u32,
    global_depth: u32,
    local_depths: [u8; DIR_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIR_ARRAY_SIZE],
}

impl DirectoryPage {
    /// A fresh directory of depth 0 with every slot unset.
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            lsn: 0,
            global_depth: 0,
            local_depths: [0; DIR_ARRAY_SIZE],
            bucket_page_ids: [PageId::INVALID; DIR_ARRAY_SIZE],
        }
    }

    /// Decode a directory from page bytes.
    pub fn parse(data: &[u8]) -> Self {
        let mut dir = DirectoryPage::new(PageId::new(read_i32(data, OFFSET_PAGE_ID)));
        dir.lsn = read_i32(data, OFFSET_LSN) as u32;
        dir.global_depth = read_i32(data, OFFSET_GLOBAL_DEPTH) as u32;
        dir.local_depths
            .copy_from_slice(&data[OFFSET_LOCAL_DEPTHS..OFFSET_LOCAL_DEPTHS + DIR_ARRAY_SIZE]);
        for i in 0..DIR_ARRAY_SIZE {
            dir.bucket_page_ids[i] =
                PageId::new(read_i32(data, OFFSET_BUCKET_PAGE_IDS + 4 * i));
        }
        dir
    }

    /// Encode the directory into page bytes.
    pub fn serialize(&self, data: &mut [u8]) {
        write_i32(data, OFFSET_PAGE_ID, self.page_id.0);
        write_i32(data, OFFSET_LSN, self.lsn as i32);
        write_i32(data, OFFSET_GLOBAL_DEPTH, self.global_depth as i32);
        data[OFFSET_LOCAL_DEPTHS..OFFSET_LOCAL_DEPTHS + DIR_ARRAY_SIZE]
            .copy_from_slice(&self.local_depths);
        for i in 0..DIR_ARRAY_SIZE {
            write_i32(data, OFFSET_BUCKET_PAGE_IDS + 4 * i, self.bucket_page_ids[i].0);
        }
    }

    // ========================================================================
    // Header accessors
    // ========================================================================

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn lsn(&self) -> u32 {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: u32) {
        self.lsn = lsn;
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of meaningful slots: `2^global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    /// Low-bit mask selecting `global_depth` hash bits.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth) - 1
    }

    /// The slot a 32-bit hash falls into.
    pub fn key_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    // ========================================================================
    // Slot accessors
    // ========================================================================

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        self.bucket_page_ids[idx]
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        self.bucket_page_ids[idx] = page_id;
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        self.local_depths[idx] as u32
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u32) {
        debug_assert!(depth <= MAX_DEPTH);
        self.local_depths[idx] = depth as u8;
    }

    /// Low-bit mask selecting the slot's `local_depth` hash bits.
    pub fn local_depth_mask(&self, idx: usize) -> u32 {
        (1u32 << self.local_depth(idx)) - 1
    }

    // ========================================================================
    // Growth and shrinkage
    // ========================================================================

    /// Double the directory, mirroring bucket ids and local depths into
    /// the new upper half. Returns the mirror slot of `idx` — the slot
    /// that will receive the new bucket in the split that triggered the
    /// expansion.
    ///
    /// # Panics
    /// Debug-asserts that the directory is below [`MAX_DEPTH`].
    pub fn expand(&mut self, idx: usize) -> usize {
        debug_assert!(self.global_depth < MAX_DEPTH, "directory at max depth");
        let old_size = self.size();

        for j in old_size..old_size * 2 {
            let src = j - old_size;
            self.local_depths[j] = self.local_depths[src];
            self.bucket_page_ids[j] = self.bucket_page_ids[src];
        }
        self.global_depth += 1;

        idx + old_size
    }

    /// The slot differing from `idx` only in its highest local-depth bit:
    /// the sibling this slot's bucket would merge with.
    ///
    /// A slot at local depth 0 has no sibling; it maps to itself.
    pub fn brother(&self, idx: usize) -> usize {
        let ld = self.local_depth(idx);
        if ld == 0 {
            return idx;
        }
        idx ^ (1 << (ld - 1))
    }

    /// Whether the directory can halve: depth above zero and no bucket
    /// using every global bit.
    pub fn can_shrink(&self) -> bool {
        if self.global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.local_depth(i) < self.global_depth)
    }

    /// Halve the directory. Slots above the new size become meaningless.
    pub fn shrink(&mut self) {
        debug_assert!(self.can_shrink());
        self.global_depth -= 1;
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Check the three directory invariants, panicking on violation.
    ///
    /// Used by tests and the index's own `verify_integrity`.
    pub fn verify_integrity(&self) {
        let mut ref_count: HashMap<PageId, usize> = HashMap::new();
        let mut depth_of: HashMap<PageId, u32> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_ids[idx];
            let ld = self.local_depth(idx);
            assert!(
                ld <= self.global_depth,
                "slot {idx}: local depth {ld} exceeds global depth {}",
                self.global_depth
            );

            *ref_count.entry(page_id).or_insert(0) += 1;
            match depth_of.get(&page_id) {
                Some(&seen) => assert_eq!(
                    seen, ld,
                    "bucket {page_id} referenced with local depths {seen} and {ld}"
                ),
                None => {
                    depth_of.insert(page_id, ld);
                }
            }
        }

        for (page_id, count) in &ref_count {
            let ld = depth_of[page_id];
            let required = 1usize << (self.global_depth - ld);
            assert_eq!(
                *count, required,
                "bucket {page_id} at local depth {ld} referenced by {count} slots, expected {required}"
            );
        }
    }
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
