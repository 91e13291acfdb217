//! Criterion micro-benchmarks for the hot paths: buffer pool hits and
//! hash index point operations.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use pinion::buffer::ParallelBufferPool;
use pinion::index::ExtendibleHashTable;
use pinion::storage::DiskManager;
use tempfile::tempdir;

fn bench_fetch_hit(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("bench.db")).unwrap();
    let pool = ParallelBufferPool::new(4, 64, dm);
    let pid = pool.new_page().unwrap().page_id();

    c.bench_function("fetch_page_hit", |b| {
        b.iter(|| {
            let guard = pool.fetch_page(pid).unwrap();
            criterion::black_box(guard.read().bytes()[0]);
        })
    });
}

fn bench_hash_ops(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("bench.db")).unwrap();
    let pool = Arc::new(ParallelBufferPool::new(4, 128, dm));
    let table = ExtendibleHashTable::<u64, u64>::new(pool).unwrap();

    const SEED: u64 = 10_000;
    for key in 0..SEED {
        table.insert(key, key).unwrap();
    }

    // Insert/remove as a pair so the table's size stays bounded no
    // matter how many iterations criterion runs.
    let mut next_key = SEED;
    c.bench_function("hash_insert_remove", |b| {
        b.iter(|| {
            table.insert(next_key, next_key).unwrap();
            table.remove(next_key, next_key).unwrap();
            next_key += 1;
        })
    });

    let mut probe = 0u64;
    c.bench_function("hash_lookup", |b| {
        b.iter(|| {
            criterion::black_box(table.get_value(&(probe % SEED)).unwrap());
            probe += 1;
        })
    });
}

criterion_group!(benches, bench_fetch_hit, bench_hash_ops);
criterion_main!(benches);
