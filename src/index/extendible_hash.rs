//! Extendible hash table over the buffer pool.
//!
//! The table persists as one directory page plus one or more bucket
//! pages, all owned by the buffer pool. Concurrency follows a two-level
//! protocol:
//!
//! - a table-wide reader–writer latch guards the directory: point
//!   operations hold it shared, directory mutations (split, merge,
//!   shrink) hold it exclusive;
//! - each bucket page is latched through its frame's own reader–writer
//!   latch while its bytes are read or changed.
//!
//! Latch acquisition order is always table latch, then buffer pool latch
//! (inside fetch), then bucket latch — never the reverse.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{ParallelBufferPool, PinnedPage};
use crate::common::{Error, PageId, Result};
use crate::storage::page::{BucketMut, BucketRef, DirectoryPage, HashKey, Storable, MAX_DEPTH};

/// Outcome of one optimistic insert attempt.
enum InsertAttempt {
    Done,
    BucketFull,
}

/// A concurrent extendible hash index mapping `K` to one or more `V`.
///
/// Duplicate `(key, value)` pairs are rejected; the same key may map to
/// many distinct values. Buckets split on overflow (doubling the
/// directory when the splitting bucket uses every global bit) and merge
/// with their siblings when emptied, shrinking the directory back down.
///
/// # Example
/// ```ignore
/// let table = ExtendibleHashTable::<u64, Rid>::new(pool)?;
/// table.insert(42, rid)?;
/// assert_eq!(table.get_value(&42)?, vec![rid]);
/// table.remove(42, rid)?;
/// ```
pub struct ExtendibleHashTable<K, V> {
    pool: Arc<ParallelBufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: HashKey, V: Storable> ExtendibleHashTable<K, V> {
    /// Create a table with an empty depth-0 directory and one bucket.
    pub fn new(pool: Arc<ParallelBufferPool>) -> Result<Self> {
        let dir_guard = pool.new_page()?;
        let directory_page_id = dir_guard.page_id();

        let bucket_guard = pool.new_page()?;
        // A zeroed page is a valid empty bucket (both bitmaps clear).
        bucket_guard.mark_dirty();

        let mut dir = DirectoryPage::new(directory_page_id);
        dir.set_bucket_page_id(0, bucket_guard.page_id());
        {
            let mut page = dir_guard.write();
            dir.serialize(page.bytes_mut());
        }
        dir_guard.mark_dirty();

        drop(bucket_guard);
        drop(dir_guard);

        Ok(Self {
            pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// The directory's page id (stable handle for reopening).
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// 32-bit bucket hash of a key: the low half of `std::hash`'s output.
    pub fn key_hash(key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }

    // ========================================================================
    // Point operations
    // ========================================================================

    /// All values stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>> {
        let _table = self.table_latch.read();

        let dir_guard = self.fetch_directory()?;
        let dir = Self::parse_directory(&dir_guard);
        let bucket_page_id = dir.bucket_page_id(dir.key_index(Self::key_hash(key)));

        let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
        let page = bucket_guard.read();
        let bucket = BucketRef::<K, V>::new(page.bytes());
        Ok(bucket.get_value(key))
    }

    /// Insert the pair, splitting the target bucket as often as needed.
    ///
    /// # Errors
    /// - `Error::DuplicateEntry` when the exact pair is already present
    /// - `Error::DirectoryDepthExceeded` when a split would pass the
    ///   directory's maximum depth
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        loop {
            match self.try_insert(&key, &value)? {
                InsertAttempt::Done => return Ok(()),
                InsertAttempt::BucketFull => self.split_insert(&key)?,
            }
        }
    }

    /// Remove the exact pair; an emptied bucket triggers a merge pass.
    ///
    /// # Errors
    /// `Error::EntryNotFound` when the pair is not present.
    pub fn remove(&self, key: K, value: V) -> Result<()> {
        let emptied = {
            let _table = self.table_latch.read();

            let dir_guard = self.fetch_directory()?;
            let dir = Self::parse_directory(&dir_guard);
            let bucket_page_id = dir.bucket_page_id(dir.key_index(Self::key_hash(&key)));

            let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
            let mut page = bucket_guard.write();
            let mut bucket = BucketMut::<K, V>::new(page.bytes_mut());

            if !bucket.remove(&key, &value) {
                return Err(Error::EntryNotFound);
            }
            let emptied = bucket.view().is_empty();
            drop(page);
            bucket_guard.mark_dirty();
            emptied
        };

        if emptied {
            self.merge()?;
        }
        Ok(())
    }

    // ========================================================================
    // Structural operations
    // ========================================================================

    /// One optimistic attempt under the shared table latch.
    fn try_insert(&self, key: &K, value: &V) -> Result<InsertAttempt> {
        let _table = self.table_latch.read();

        let dir_guard = self.fetch_directory()?;
        let dir = Self::parse_directory(&dir_guard);
        let bucket_page_id = dir.bucket_page_id(dir.key_index(Self::key_hash(key)));

        let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
        let mut page = bucket_guard.write();
        let mut bucket = BucketMut::<K, V>::new(page.bytes_mut());

        if bucket.try_insert(key, value)? {
            drop(page);
            bucket_guard.mark_dirty();
            Ok(InsertAttempt::Done)
        } else {
            Ok(InsertAttempt::BucketFull)
        }
    }

    /// Split the bucket `key` hashes to, doubling the directory when the
    /// bucket already uses every global bit. The caller retries the
    /// insert afterwards.
    fn split_insert(&self, key: &K) -> Result<()> {
        let _table = self.table_latch.write();

        let dir_guard = self.fetch_directory()?;
        let mut dir = Self::parse_directory(&dir_guard);
        let idx = dir.key_index(Self::key_hash(key));
        let old_page_id = dir.bucket_page_id(idx);

        let old_guard = self.pool.fetch_page(old_page_id)?;

        // Re-check under the exclusive latch: another thread may have
        // split this bucket while we queued for the write lock.
        {
            let page = old_guard.read();
            if !BucketRef::<K, V>::new(page.bytes()).is_full() {
                return Ok(());
            }
        }

        if dir.local_depth(idx) == MAX_DEPTH {
            return Err(Error::DirectoryDepthExceeded);
        }
        if dir.local_depth(idx) == dir.global_depth() {
            dir.expand(idx);
        }

        let new_guard = self.pool.new_page()?;
        let new_page_id = new_guard.page_id();

        // Retarget every slot of the old bucket under its deepened mask.
        let new_depth = dir.local_depth(idx) + 1;
        let new_mask = (1u32 << new_depth) - 1;
        let target_prefix = idx as u32 & new_mask;
        for slot in 0..dir.size() {
            if dir.bucket_page_id(slot) == old_page_id {
                dir.set_local_depth(slot, new_depth);
                if (slot as u32 & new_mask) != target_prefix {
                    dir.set_bucket_page_id(slot, new_page_id);
                }
            }
        }

        // Rehash: entries whose hash now selects the sibling move over.
        {
            let mut old_page = old_guard.write();
            let mut new_page = new_guard.write();
            let mut old_bucket = BucketMut::<K, V>::new(old_page.bytes_mut());
            let mut new_bucket = BucketMut::<K, V>::new(new_page.bytes_mut());

            for (slot, k, v) in old_bucket.view().readable_entries() {
                if (Self::key_hash(&k) & new_mask) != target_prefix {
                    let inserted = new_bucket.try_insert(&k, &v)?;
                    debug_assert!(inserted, "fresh split bucket cannot be full");
                    old_bucket.remove_at(slot);
                }
            }
        }
        old_guard.mark_dirty();
        new_guard.mark_dirty();

        log::debug!(
            "split bucket {old_page_id} into {new_page_id} at depth {new_depth}"
        );

        {
            let mut page = dir_guard.write();
            dir.serialize(page.bytes_mut());
        }
        dir_guard.mark_dirty();
        Ok(())
    }

    /// Merge pass: under the exclusive table latch, repeatedly fold any
    /// empty bucket into its sibling (when their local depths agree),
    /// then shrink the directory while possible.
    ///
    /// Sweeping to a fixpoint instead of merging only the caller's bucket
    /// means draining the table always collapses the directory to depth
    /// zero, whatever order the removals came in.
    fn merge(&self) -> Result<()> {
        let _table = self.table_latch.write();

        let dir_guard = self.fetch_directory()?;
        let mut dir = Self::parse_directory(&dir_guard);
        let mut changed = false;

        'sweep: loop {
            for idx in 0..dir.size() {
                let local_depth = dir.local_depth(idx);
                if dir.global_depth() == 0 || local_depth == 0 {
                    continue;
                }

                let brother = dir.brother(idx);
                if dir.local_depth(brother) != local_depth {
                    continue;
                }

                let target_page_id = dir.bucket_page_id(idx);
                let brother_page_id = dir.bucket_page_id(brother);
                if target_page_id == brother_page_id {
                    continue;
                }

                // The bucket must still be empty; a racing insert between
                // the remove and this pass aborts the merge.
                let empty = {
                    let guard = self.pool.fetch_page(target_page_id)?;
                    let page = guard.read();
                    BucketRef::<K, V>::new(page.bytes()).is_empty()
                };
                if !empty {
                    continue;
                }

                self.pool.delete_page(target_page_id)?;
                for slot in 0..dir.size() {
                    let page_id = dir.bucket_page_id(slot);
                    if page_id == target_page_id || page_id == brother_page_id {
                        dir.set_bucket_page_id(slot, brother_page_id);
                        dir.set_local_depth(slot, local_depth - 1);
                    }
                }
                log::debug!(
                    "merged empty bucket {target_page_id} into {brother_page_id}"
                );

                changed = true;
                while dir.can_shrink() {
                    dir.shrink();
                }
                // Slot indices changed meaning; rescan from the top.
                continue 'sweep;
            }
            break;
        }

        while dir.can_shrink() {
            dir.shrink();
            changed = true;
        }

        if changed {
            let mut page = dir_guard.write();
            dir.serialize(page.bytes_mut());
            drop(page);
            dir_guard.mark_dirty();
        }
        Ok(())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Current global depth.
    pub fn global_depth(&self) -> Result<u32> {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory()?;
        Ok(Self::parse_directory(&dir_guard).global_depth())
    }

    /// Number of distinct bucket pages.
    pub fn bucket_count(&self) -> Result<usize> {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory()?;
        let dir = Self::parse_directory(&dir_guard);
        let mut pages: Vec<PageId> = (0..dir.size()).map(|i| dir.bucket_page_id(i)).collect();
        pages.sort_unstable();
        pages.dedup();
        Ok(pages.len())
    }

    /// Whether the directory could shrink (diagnostic mirror of the
    /// directory's own predicate).
    pub fn can_shrink(&self) -> Result<bool> {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory()?;
        Ok(Self::parse_directory(&dir_guard).can_shrink())
    }

    /// Assert the directory invariants; panics on violation.
    pub fn verify_integrity(&self) -> Result<()> {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory()?;
        Self::parse_directory(&dir_guard).verify_integrity();
        Ok(())
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn fetch_directory(&self) -> Result<PinnedPage<'_>> {
        self.pool.fetch_page(self.directory_page_id)
    }

    fn parse_directory(guard: &PinnedPage<'_>) -> DirectoryPage {
        let page = guard.read();
        DirectoryPage::parse(page.bytes())
    }
}
