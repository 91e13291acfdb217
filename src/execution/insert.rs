//! Insert executor.

use std::sync::Arc;

use crate::common::{Result, Rid};
use crate::concurrency::{IndexWriteOp, IndexWriteRecord, IsolationLevel, WriteRecord};
use crate::execution::{Executor, ExecutorContext};

/// Inserts a batch of raw tuples.
///
/// Every inserted rid is exclusive-locked, recorded for rollback, and
/// entered into each secondary index; the lock is released right away
/// unless the isolation level is REPEATABLE_READ.
pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    rows: Vec<Vec<u8>>,
    done: bool,
}

impl InsertExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, rows: Vec<Vec<u8>>) -> Self {
        Self {
            ctx,
            rows,
            done: false,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> Result<()> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let ctx = &self.ctx;
        for row in std::mem::take(&mut self.rows) {
            let rid = ctx.table.insert(&row)?;
            ctx.lock_manager.lock_exclusive(&ctx.txn, rid)?;
            ctx.txn.push_write_record(WriteRecord::Insert { rid });

            for (index_no, index) in ctx.indexes.iter().enumerate() {
                let key = index.key_of(&row);
                index.insert(key, rid)?;
                ctx.txn.push_index_record(IndexWriteRecord {
                    index_no,
                    op: IndexWriteOp::Insert,
                    key,
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
