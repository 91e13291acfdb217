//! Sequential scan executor.

use std::sync::Arc;

use crate::common::{Result, Rid};
use crate::concurrency::IsolationLevel;
use crate::execution::{Executor, ExecutorContext};
use crate::storage::TableIter;

/// Row filter applied after the tuple is read under its lock.
pub type Predicate = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Scans the table heap in rid order.
///
/// Each visited rid is shared-locked before the tuple is read (except
/// under READ_UNCOMMITTED, where shared locks are illegal) and released
/// right after projection under READ_COMMITTED.
pub struct SeqScanExecutor {
    ctx: Arc<ExecutorContext>,
    predicate: Option<Predicate>,
    iter: Option<TableIter>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, predicate: Option<Predicate>) -> Self {
        Self {
            ctx,
            predicate,
            iter: None,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        self.iter = Some(TableIter::new(Arc::clone(&self.ctx.table)));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Rid)>> {
        if self.iter.is_none() {
            self.init()?;
        }

        loop {
            let step = match self.iter.as_mut() {
                Some(iter) => iter.next()?,
                None => None,
            };
            let Some((rid, _)) = step else {
                return Ok(None);
            };

            let txn = &self.ctx.txn;
            let isolation = txn.isolation();
            let already_held = txn.holds_shared(rid) || txn.holds_exclusive(rid);

            if isolation != IsolationLevel::ReadUncommitted {
                self.ctx.lock_manager.lock_shared(txn, rid)?;
            }
            // Re-read under the lock; the iterator's copy may be stale.
            let tuple = self.ctx.table.get(rid)?;

            let release = isolation == IsolationLevel::ReadCommitted && !already_held;
            let result = match tuple {
                Some(bytes) => {
                    let passes = self.predicate.as_ref().map_or(true, |p| p(&bytes));
                    passes.then_some((bytes, rid))
                }
                // Tombstoned between the iterator step and the lock.
                None => None,
            };

            if release {
                self.ctx.lock_manager.unlock(txn, rid)?;
            }
            if let Some(row) = result {
                return Ok(Some(row));
            }
        }
    }
}
