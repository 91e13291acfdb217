//! Update executor.

use std::sync::Arc;

use crate::common::{Result, Rid};
use crate::concurrency::{IndexWriteOp, IndexWriteRecord, IsolationLevel, WriteRecord};
use crate::execution::{Executor, ExecutorContext};

/// Produces the replacement bytes for a tuple.
pub type UpdateFn = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Rewrites every tuple its child produces.
///
/// The rid is exclusive-locked first — upgrading when the child's scan
/// already left a shared lock — then the heap row is rewritten in place
/// and every index entry is moved from the old key to the new one.
pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    child: Box<dyn Executor>,
    update_fn: UpdateFn,
}

impl UpdateExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, child: Box<dyn Executor>, update_fn: UpdateFn) -> Self {
        Self {
            ctx,
            child,
            update_fn,
        }
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Rid)>> {
        let ctx = &self.ctx;

        while let Some((old_tuple, rid)) = self.child.next()? {
            if ctx.txn.holds_shared(rid) {
                ctx.lock_manager.lock_upgrade(&ctx.txn, rid)?;
            } else {
                ctx.lock_manager.lock_exclusive(&ctx.txn, rid)?;
            }

            let new_tuple = (self.update_fn)(&old_tuple);
            ctx.table.update(rid, &new_tuple)?;
            ctx.txn.push_write_record(WriteRecord::Update {
                rid,
                old_tuple: old_tuple.clone(),
            });

            for (index_no, index) in ctx.indexes.iter().enumerate() {
                let old_key = index.key_of(&old_tuple);
                let new_key = index.key_of(&new_tuple);
                index.remove(old_key, rid)?;
                ctx.txn.push_index_record(IndexWriteRecord {
                    index_no,
                    op: IndexWriteOp::Delete,
                    key: old_key,
                    rid,
                });
                index.insert(new_key, rid)?;
                ctx.txn.push_index_record(IndexWriteRecord {
                    index_no,
                    op: IndexWriteOp::Insert,
                    key: new_key,
                    rid,
                });
            }

            if ctx.txn.isolation() != IsolationLevel::RepeatableRead {
                ctx.lock_manager.unlock(&ctx.txn, rid)?;
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ParallelBufferPool;
    use crate::concurrency::{LockManager, TransactionManager};
    use crate::execution::SeqScanExecutor;
    use crate::index::{ExtendibleHashTable, TableIndex};
    use crate::storage::{DiskManager, TableHeap};
    use tempfile::tempdir;

    fn setup(
        isolation: IsolationLevel,
    ) -> (Arc<ExecutorContext>, Arc<TransactionManager>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManager::create(&path).unwrap();
        let pool = Arc::new(ParallelBufferPool::new(2, 32, dm));
        let table = Arc::new(TableHeap::create(Arc::clone(&pool)).unwrap());
        let hash = ExtendibleHashTable::new(pool).unwrap();
        let index = Arc::new(TableIndex::new(hash, Box::new(|t: &[u8]| t[0] as u64)));
        let lm = Arc::new(LockManager::new());
        let tm = Arc::new(TransactionManager::new(Arc::clone(&lm)));
        let txn = tm.begin(isolation);
        let ctx = Arc::new(ExecutorContext::new(txn, lm, table, vec![index]));
        (ctx, tm, dir)
    }

    fn seed(ctx: &Arc<ExecutorContext>, rows: &[&[u8]]) -> Vec<Rid> {
        rows.iter()
            .map(|row| {
                let rid = ctx.table.insert(row).unwrap();
                let key = ctx.indexes[0].key_of(row);
                ctx.indexes[0].insert(key, rid).unwrap();
                rid
            })
            .collect()
    }

    #[test]
    fn test_update_rewrites_rows_and_index() {
        let (ctx, _tm, _dir) = setup(IsolationLevel::RepeatableRead);
        let rids = seed(&ctx, &[b"\x01aa", b"\x02bb"]);

        let child = Box::new(SeqScanExecutor::new(Arc::clone(&ctx), None));
        // Bump the key byte, keep the length.
        let mut exec = UpdateExecutor::new(
            Arc::clone(&ctx),
            child,
            Box::new(|t: &[u8]| {
                let mut new = t.to_vec();
                new[0] += 10;
                new
            }),
        );
        exec.init().unwrap();
        assert!(exec.next().unwrap().is_none());

        assert_eq!(ctx.table.get(rids[0]).unwrap(), Some(b"\x0baa".to_vec()));
        assert!(ctx.indexes[0].get(1).unwrap().is_empty());
        assert_eq!(ctx.indexes[0].get(11).unwrap(), vec![rids[0]]);
        assert_eq!(ctx.indexes[0].get(12).unwrap(), vec![rids[1]]);
    }

    #[test]
    fn test_update_upgrades_scan_lock() {
        let (ctx, _tm, _dir) = setup(IsolationLevel::RepeatableRead);
        let rids = seed(&ctx, &[b"\x01aa"]);

        let child = Box::new(SeqScanExecutor::new(Arc::clone(&ctx), None));
        let mut exec = UpdateExecutor::new(
            Arc::clone(&ctx),
            child,
            Box::new(|t: &[u8]| t.to_vec()),
        );
        exec.init().unwrap();
        exec.next().unwrap();

        // The scan's shared lock was upgraded, not duplicated.
        assert!(!ctx.txn.holds_shared(rids[0]));
        assert!(ctx.txn.holds_exclusive(rids[0]));
    }

    #[test]
    fn test_update_rollback_restores_rows() {
        let (ctx, tm, _dir) = setup(IsolationLevel::RepeatableRead);
        let rids = seed(&ctx, &[b"\x01aa"]);

        let child = Box::new(SeqScanExecutor::new(Arc::clone(&ctx), None));
        let mut exec = UpdateExecutor::new(
            Arc::clone(&ctx),
            child,
            Box::new(|t: &[u8]| {
                let mut new = t.to_vec();
                new[0] = 9;
                new
            }),
        );
        exec.init().unwrap();
        exec.next().unwrap();

        tm.abort_with_rollback(&ctx.txn, &ctx.table, &ctx.indexes)
            .unwrap();

        assert_eq!(ctx.table.get(rids[0]).unwrap(), Some(b"\x01aa".to_vec()));
        assert_eq!(ctx.indexes[0].get(1).unwrap(), vec![rids[0]]);
        assert!(ctx.indexes[0].get(9).unwrap().is_empty());
    }
}
