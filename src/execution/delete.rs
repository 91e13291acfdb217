//! Delete executor.

use std::sync::Arc;

use crate::common::{Result, Rid};
use crate::concurrency::{IndexWriteOp, IndexWriteRecord, IsolationLevel, WriteRecord};
use crate::execution::{Executor, ExecutorContext};

/// Tombstones every tuple its child produces.
///
/// The rid is exclusive-locked (upgrading a scan's shared lock), the
/// heap row tombstoned, and the index entries removed; undo records make
/// all of it reversible.
pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, child: Box<dyn Executor>) -> Self {
        Self { ctx, child }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()
    }

    fn next(&mut self) -> Result<Option<(Vec<u8>, Rid)>> {
        let ctx = &self.ctx;

        while let Some((tuple, rid)) = self.child.next()? {
            if ctx.txn.holds_shared(rid) {
                ctx.lock_manager.lock_upgrade(&ctx.txn, rid)?;
            } else {
                ctx.lock_manager.lock_exclusive(&ctx.txn, rid)?;
            }

            ctx.table.mark_delete(rid)?;
            ctx.txn.push_write_record(WriteRecord::Delete { rid });

            for (index_no, index) in ctx.indexes.iter().enumerate() {
                let key = index.key_of(&tuple);
                index.remove(key, rid)?;
                ctx.txn.push_index_record(IndexWriteRecord {
                    index_no,
                    op: IndexWriteOp::Delete,
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
