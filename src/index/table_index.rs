//! A table index: an extendible hash table plus a key extractor.
//!
//! Executors treat every secondary index uniformly: pull the key out of
//! the tuple bytes, then insert/remove `(key, rid)` in the hash table.

use crate::common::{Result, Rid};
use crate::index::ExtendibleHashTable;

/// Extracts the index key from a tuple's bytes.
pub type KeyExtractor = Box<dyn Fn(&[u8]) -> u64 + Send + Sync>;

/// One secondary index over a table heap.
pub struct TableIndex {
    index: ExtendibleHashTable<u64, Rid>,
    key_of: KeyExtractor,
}

impl TableIndex {
    pub fn new(index: ExtendibleHashTable<u64, Rid>, key_of: KeyExtractor) -> Self {
        Self { index, key_of }
    }

    /// The index key of a tuple.
    pub fn key_of(&self, tuple: &[u8]) -> u64 {
        (self.key_of)(tuple)
    }

    /// Index the tuple at `rid`.
    pub fn insert(&self, key: u64, rid: Rid) -> Result<()> {
        self.index.insert(key, rid)
    }

    /// Drop the entry for the tuple at `rid`.
    pub fn remove(&self, key: u64, rid: Rid) -> Result<()> {
        self.index.remove(key, rid)
    }

    /// All rids indexed under `key`.
    pub fn get(&self, key: u64) -> Result<Vec<Rid>> {
        self.index.get_value(&key)
    }
}
