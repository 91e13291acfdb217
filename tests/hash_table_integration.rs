//! Integration tests for the extendible hash index.
//!
//! Covers the split/merge lifecycle end to end plus a randomized model
//! test comparing the index against an in-memory map.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pinion::common::Error;
use pinion::index::ExtendibleHashTable;
use pinion::storage::page::bucket_capacity;
use pinion::storage::DiskManager;
use pinion::ParallelBufferPool;
use proptest::prelude::*;
use tempfile::tempdir;

fn create_table() -> (Arc<ExtendibleHashTable<i32, i32>>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    let pool = Arc::new(ParallelBufferPool::new(2, 64, dm));
    (Arc::new(ExtendibleHashTable::new(pool).unwrap()), dir)
}

/// Overflowing the first bucket splits it into two, keyed by the lowest
/// hash bit, and every insert succeeds on retry.
#[test]
fn test_first_overflow_splits_directory() {
    let (table, _dir) = create_table();
    let capacity = bucket_capacity::<i32, i32>() as i32;

    for key in 0..=capacity {
        table.insert(key, key).unwrap();
    }

    assert_eq!(table.global_depth().unwrap(), 1);
    assert_eq!(table.bucket_count().unwrap(), 2);
    table.verify_integrity().unwrap();

    // Both low-bit classes are populated; each key sits in the bucket
    // its hash selects.
    let bits: HashSet<u32> = (0..=capacity)
        .map(|k| ExtendibleHashTable::<i32, i32>::key_hash(&k) & 1)
        .collect();
    assert_eq!(bits.len(), 2);

    for key in 0..=capacity {
        assert_eq!(table.get_value(&key).unwrap(), vec![key]);
    }
}

/// Build a directory of depth ≥ 2, then drain it: merges and shrinks
/// collapse it back to a single depth-0 bucket.
#[test]
fn test_merge_then_shrink_to_depth_zero() {
    let (table, _dir) = create_table();
    let n = 3 * bucket_capacity::<i32, i32>() as i32;

    for key in 0..n {
        table.insert(key, key).unwrap();
    }
    assert!(table.global_depth().unwrap() >= 2);
    table.verify_integrity().unwrap();

    for key in 0..n {
        table.remove(key, key).unwrap();
    }

    assert_eq!(table.global_depth().unwrap(), 0);
    assert_eq!(table.bucket_count().unwrap(), 1);
    assert!(!table.can_shrink().unwrap());
    table.verify_integrity().unwrap();

    // The collapsed table still works.
    table.insert(7, 70).unwrap();
    assert_eq!(table.get_value(&7).unwrap(), vec![70]);
}

/// Same key, many values: all come back, and removal is per-pair.
#[test]
fn test_multi_value_keys() {
    let (table, _dir) = create_table();

    for v in 0..10 {
        table.insert(42, v).unwrap();
    }
    let mut values = table.get_value(&42).unwrap();
    values.sort_unstable();
    assert_eq!(values, (0..10).collect::<Vec<_>>());

    table.remove(42, 3).unwrap();
    let values = table.get_value(&42).unwrap();
    assert_eq!(values.len(), 9);
    assert!(!values.contains(&3));
}

/// Concurrent inserts, reads, and removes across threads keep the
/// directory invariants and lose nothing.
#[test]
fn test_concurrent_mixed_workload() {
    use std::thread;

    let (table, _dir) = create_table();

    let mut handles = vec![];
    for t in 0..4i32 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            let base = t * 1000;
            for i in 0..1000 {
                table.insert(base + i, base + i).unwrap();
            }
            // Remove the odd half again.
            for i in (1..1000).step_by(2) {
                table.remove(base + i, base + i).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    table.verify_integrity().unwrap();
    for t in 0..4i32 {
        let base = t * 1000;
        for i in 0..1000 {
            let expected: Vec<i32> = if i % 2 == 0 { vec![base + i] } else { vec![] };
            assert_eq!(table.get_value(&(base + i)).unwrap(), expected);
        }
    }
}

/// Duplicate pairs are rejected at any depth.
#[test]
fn test_duplicates_rejected_after_splits() {
    let (table, _dir) = create_table();
    let n = 2 * bucket_capacity::<i32, i32>() as i32;

    for key in 0..n {
        table.insert(key, key).unwrap();
    }
    for key in (0..n).step_by(17) {
        assert!(matches!(
            table.insert(key, key),
            Err(Error::DuplicateEntry)
        ));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, i32),
    Remove(i32, i32),
    Get(i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..64i32, 0..8i32).prop_map(|(k, v)| Op::Insert(k, v)),
        (0..64i32, 0..8i32).prop_map(|(k, v)| Op::Remove(k, v)),
        (0..64i32).prop_map(Op::Get),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The index agrees with a plain in-memory multimap under any
    /// sequence of inserts, removes, and lookups.
    #[test]
    fn test_model_consistency(ops in proptest::collection::vec(op_strategy(), 1..300)) {
        let (table, _dir) = create_table();
        let mut model: HashMap<i32, HashSet<i32>> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    let present = model.get(&k).is_some_and(|s| s.contains(&v));
                    let result = table.insert(k, v);
                    if present {
                        prop_assert!(matches!(result, Err(Error::DuplicateEntry)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.entry(k).or_default().insert(v);
                    }
                }
                Op::Remove(k, v) => {
                    let present = model.get(&k).is_some_and(|s| s.contains(&v));
                    let result = table.remove(k, v);
                    if present {
                        prop_assert!(result.is_ok());
                        if let Some(values) = model.get_mut(&k) {
                            values.remove(&v);
                        }
                    } else {
                        prop_assert!(matches!(result, Err(Error::EntryNotFound)));
                    }
                }
                Op::Get(k) => {
                    let mut actual = table.get_value(&k).unwrap();
                    actual.sort_unstable();
                    let mut expected: Vec<i32> = model
                        .get(&k)
                        .map(|s| s.iter().copied().collect())
                        .unwrap_or_default();
                    expected.sort_unstable();
                    prop_assert_eq!(actual, expected);
                }
            }
        }

        table.verify_integrity().unwrap();
    }
}
