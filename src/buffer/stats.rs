//! Buffer pool traffic counters.
//!
//! Every hit, miss, eviction, and page-store transfer already happens
//! under the owning shard's latch, so the counters are plain integers
//! living inside the latched pool state — no atomics, no snapshot type.
//! Shard stats are `Copy` and fold with `+`, which is how the parallel
//! pool reports an aggregate across its instances.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// Traffic counters for one pool shard, or for a whole parallel pool
/// when summed across shards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fetches satisfied without touching the page store.
    pub cache_hits: u64,

    /// Fetches that had to read a page image from the store.
    pub cache_misses: u64,

    /// Victim frames recycled through the replacer.
    pub evictions: u64,

    /// Page images read from the store.
    pub pages_read: u64,

    /// Page images written to the store (eviction write-back or flush).
    pub pages_written: u64,
}

impl PoolStats {
    /// Fraction of fetches served from memory, in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let fetches = self.cache_hits + self.cache_misses;
        if fetches == 0 {
            0.0
        } else {
            self.cache_hits as f64 / fetches as f64
        }
    }
}

impl Add for PoolStats {
    type Output = PoolStats;

    fn add(self, rhs: PoolStats) -> PoolStats {
        PoolStats {
            cache_hits: self.cache_hits + rhs.cache_hits,
            cache_misses: self.cache_misses + rhs.cache_misses,
            evictions: self.evictions + rhs.evictions,
            pages_read: self.pages_read + rhs.pages_read,
            pages_written: self.pages_written + rhs.pages_written,
        }
    }
}

impl Sum for PoolStats {
    fn sum<I: Iterator<Item = PoolStats>>(iter: I) -> PoolStats {
        iter.fold(PoolStats::default(), Add::add)
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits / {} misses ({:.1}% hit rate), {} evicted, {} read, {} written",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.pages_read,
            self.pages_written
        )
    }
}
