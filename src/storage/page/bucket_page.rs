//! Bucket page for the extendible hash index.
//!
//! A bucket page is a fixed-capacity array of `(key, value)` entries with
//! two parallel bitmaps: `occupied` marks slots that have ever held an
//! entry, `readable` marks slots holding a live one. The views here borrow
//! a pinned frame's bytes directly — no copy, no punning.

use std::marker::PhantomData;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};
use crate::storage::page::{HashKey, Storable};

/// Entry capacity of a bucket holding `K`/`V` pairs.
///
/// Each entry costs `8 * (k + v)` bits of payload plus one occupied and
/// one readable bit: `B = (PAGE_SIZE*8) / (8*(k+v) + 2)`.
pub const fn bucket_capacity<K: HashKey, V: Storable>() -> usize {
    (PAGE_SIZE * 8) / (8 * (K::ENCODED_LEN + V::ENCODED_LEN) + 2)
}

const fn bitmap_len(capacity: usize) -> usize {
    (capacity + 7) / 8
}

#[inline]
fn entry_offset<K: HashKey, V: Storable>(slot: usize) -> usize {
    2 * bitmap_len(bucket_capacity::<K, V>()) + slot * (K::ENCODED_LEN + V::ENCODED_LEN)
}

#[inline]
fn bit(data: &[u8], base: usize, slot: usize) -> bool {
    data[base + slot / 8] & (1 << (slot % 8)) != 0
}

#[inline]
fn set_bit(data: &mut [u8], base: usize, slot: usize, on: bool) {
    let mask = 1u8 << (slot % 8);
    if on {
        data[base + slot / 8] |= mask;
    } else {
        data[base + slot / 8] &= !mask;
    }
}

/// Read-only view of a bucket page.
pub struct BucketRef<'a, K, V> {
    data: &'a [u8],
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'a, K: HashKey, V: Storable> BucketRef<'a, K, V> {
    /// Borrow `data` (a full page) as a bucket.
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert!(layout_fits::<K, V>(data.len()));
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        bucket_capacity::<K, V>()
    }

    /// Whether the slot has ever held an entry.
    pub fn is_occupied(&self, slot: usize) -> bool {
        bit(self.data, 0, slot)
    }

    /// Whether the slot holds a live entry.
    pub fn is_readable(&self, slot: usize) -> bool {
        bit(self.data, bitmap_len(self.capacity()), slot)
    }

    /// Decode the key in `slot` (caller checks readability).
    pub fn key_at(&self, slot: usize) -> K {
        K::decode(&self.data[entry_offset::<K, V>(slot)..])
    }

    /// Decode the value in `slot` (caller checks readability).
    pub fn value_at(&self, slot: usize) -> V {
        V::decode(&self.data[entry_offset::<K, V>(slot) + K::ENCODED_LEN..])
    }

    /// All live values stored under `key`.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        (0..self.capacity())
            .filter(|&slot| self.is_readable(slot) && self.key_at(slot) == *key)
            .map(|slot| self.value_at(slot))
            .collect()
    }

    /// Whether the exact pair is live in this bucket.
    pub fn contains(&self, key: &K, value: &V) -> bool {
        (0..self.capacity()).any(|slot| {
            self.is_readable(slot) && self.key_at(slot) == *key && self.value_at(slot) == *value
        })
    }

    /// Number of live entries.
    pub fn num_readable(&self) -> usize {
        (0..self.capacity()).filter(|&s| self.is_readable(s)).count()
    }

    /// Whether every slot is live.
    pub fn is_full(&self) -> bool {
        self.num_readable() == self.capacity()
    }

    /// Whether no slot is live.
    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// Every live `(slot, key, value)` triple, for rehashing on a split.
    pub fn readable_entries(&self) -> Vec<(usize, K, V)> {
        (0..self.capacity())
            .filter(|&slot| self.is_readable(slot))
            .map(|slot| (slot, self.key_at(slot), self.value_at(slot)))
            .collect()
    }
}

/// Mutable view of a bucket page.
pub struct BucketMut<'a, K, V> {
    data: &'a mut [u8],
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'a, K: HashKey, V: Storable> BucketMut<'a, K, V> {
    /// Borrow `data` (a full page) as a mutable bucket.
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert!(layout_fits::<K, V>(data.len()));
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Reborrow read-only.
    pub fn view(&self) -> BucketRef<'_, K, V> {
        BucketRef::new(self.data)
    }

    /// Insert the pair into the first free slot.
    ///
    /// Returns `Ok(true)` when inserted, `Ok(false)` when the bucket is
    /// full, and `Error::DuplicateEntry` when the exact pair is already
    /// live.
    pub fn try_insert(&mut self, key: &K, value: &V) -> Result<bool> {
        let capacity = bucket_capacity::<K, V>();
        let mut free_slot = None;

        for slot in 0..capacity {
            if self.view().is_readable(slot) {
                if self.view().key_at(slot) == *key && self.view().value_at(slot) == *value {
                    return Err(Error::DuplicateEntry);
                }
            } else if free_slot.is_none() {
                free_slot = Some(slot);
            }
        }

        let Some(slot) = free_slot else {
            return Ok(false);
        };
        self.write_entry(slot, key, value);
        Ok(true)
    }

    /// Remove the exact pair. Returns whether anything was removed.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        for slot in 0..bucket_capacity::<K, V>() {
            let view = self.view();
            if view.is_readable(slot) && view.key_at(slot) == *key && view.value_at(slot) == *value
            {
                self.remove_at(slot);
                return true;
            }
        }
        false
    }

    /// Clear a slot's readable bit; the occupied bit stays set.
    pub fn remove_at(&mut self, slot: usize) {
        let bb = bitmap_len(bucket_capacity::<K, V>());
        set_bit(self.data, bb, slot, false);
    }

    fn write_entry(&mut self, slot: usize, key: &K, value: &V) {
        let offset = entry_offset::<K, V>(slot);
        key.encode(&mut self.data[offset..]);
        value.encode(&mut self.data[offset + K::ENCODED_LEN..]);
        set_bit(self.data, 0, slot, true);
        let bb = bitmap_len(bucket_capacity::<K, V>());
        set_bit(self.data, bb, slot, true);
    }
}

/// Whether the computed layout fits the buffer; always true for a full
/// page by construction of [`bucket_capacity`].
fn layout_fits<K: HashKey, V: Storable>(len: usize) -> bool {
    let capacity = bucket_capacity::<K, V>();
    2 * bitmap_len(capacity) + capacity * (K::ENCODED_LEN + V::ENCODED_LEN) <= len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PageId, Rid};

    #[test]
    fn test_capacity_formula() {
        // i32/i32: 66 bits per entry -> 496 entries in 32768 bits.
        assert_eq!(bucket_capacity::<i32, i32>(), 496);
        // u64/Rid: 130 bits per entry -> 252 entries.
        assert_eq!(bucket_capacity::<u64, Rid>(), 252);
    }

    #[test]
    fn test_layout_fits_page() {
        assert!(layout_fits::<i32, i32>(PAGE_SIZE));
        assert!(layout_fits::<u64, Rid>(PAGE_SIZE));
        assert!(layout_fits::<i64, u64>(PAGE_SIZE));
    }

    #[test]
    fn test_insert_and_get() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);

        assert!(bucket.try_insert(&1, &10).unwrap());
        assert!(bucket.try_insert(&1, &11).unwrap());
        assert!(bucket.try_insert(&2, &20).unwrap());

        let view = bucket.view();
        let mut values = view.get_value(&1);
        values.sort_unstable();
        assert_eq!(values, vec![10, 11]);
        assert_eq!(view.get_value(&2), vec![20]);
        assert!(view.get_value(&3).is_empty());
        assert_eq!(view.num_readable(), 3);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);

        assert!(bucket.try_insert(&1, &10).unwrap());
        assert!(matches!(
            bucket.try_insert(&1, &10),
            Err(Error::DuplicateEntry)
        ));
        // Same key, different value is fine.
        assert!(bucket.try_insert(&1, &11).unwrap());
    }

    #[test]
    fn test_remove() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);

        bucket.try_insert(&1, &10).unwrap();
        bucket.try_insert(&1, &11).unwrap();

        assert!(bucket.remove(&1, &10));
        assert!(!bucket.remove(&1, &10));

        let view = bucket.view();
        assert_eq!(view.get_value(&1), vec![11]);
        // The removed slot stays occupied but unreadable.
        assert!(view.is_occupied(0));
        assert!(!view.is_readable(0));
    }

    #[test]
    fn test_slot_reuse_after_remove() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);

        bucket.try_insert(&1, &10).unwrap();
        bucket.try_insert(&2, &20).unwrap();
        bucket.remove(&1, &10);

        // Slot 0 is free again and is the first choice.
        bucket.try_insert(&3, &30).unwrap();
        let view = bucket.view();
        assert_eq!(view.key_at(0), 3);
        assert_eq!(view.value_at(0), 30);
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);
        let capacity = bucket_capacity::<i32, i32>();

        for i in 0..capacity {
            assert!(bucket.try_insert(&(i as i32), &0).unwrap());
        }
        assert!(bucket.view().is_full());

        // Full bucket: insert reports no room.
        assert!(!bucket.try_insert(&-1, &0).unwrap());
    }

    #[test]
    fn test_readable_entries() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<i32, i32>::new(&mut data);

        bucket.try_insert(&5, &50).unwrap();
        bucket.try_insert(&6, &60).unwrap();
        bucket.remove(&5, &50);

        let entries = bucket.view().readable_entries();
        assert_eq!(entries, vec![(1, 6, 60)]);
    }

    #[test]
    fn test_rid_values() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut bucket = BucketMut::<u64, Rid>::new(&mut data);

        let rid = Rid::new(PageId::new(4), 2);
        bucket.try_insert(&99, &rid).unwrap();
        assert_eq!(bucket.view().get_value(&99), vec![rid]);
    }
}
