//! Transaction manager: begin / commit / abort.
//!
//! Abort undoes the transaction's heap and index mutations from its undo
//! records (newest first), then releases every lock. Commit just releases
//! locks — tombstones left by committed deletes are permanent.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::common::{Result, TxnId};
use crate::concurrency::{
    IndexWriteOp, IsolationLevel, LockManager, Transaction, TransactionState, WriteRecord,
};
use crate::index::TableIndex;
use crate::storage::TableHeap;

/// Issues transaction ids and drives commit/abort.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
        }
    }

    /// Start a transaction. Ids are monotonic, so a smaller id always
    /// means an older transaction for wound-wait.
    pub fn begin(&self, isolation: IsolationLevel) -> Arc<Transaction> {
        let id: TxnId = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Transaction::new(id, isolation))
    }

    /// Commit: release all locks, mark the transaction committed.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        // The undo records are dead weight once the transaction commits.
        txn.take_write_records();
        txn.take_index_records();

        self.release_locks(txn)?;
        txn.set_state(TransactionState::Committed);
        Ok(())
    }

    /// Abort a transaction that made no data changes (or whose changes
    /// the caller undoes itself): locks only.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        txn.set_state(TransactionState::Aborted);
        txn.take_write_records();
        txn.take_index_records();
        self.release_locks(txn)?;
        Ok(())
    }

    /// Abort with rollback: undo heap and index mutations in reverse
    /// order, then release locks.
    pub fn abort_with_rollback(
        &self,
        txn: &Arc<Transaction>,
        table: &TableHeap,
        indexes: &[Arc<TableIndex>],
    ) -> Result<()> {
        txn.set_state(TransactionState::Aborted);

        for record in txn.take_index_records().into_iter().rev() {
            let index = &indexes[record.index_no];
            match record.op {
                IndexWriteOp::Insert => index.remove(record.key, record.rid)?,
                IndexWriteOp::Delete => index.insert(record.key, record.rid)?,
            }
        }

        for record in txn.take_write_records().into_iter().rev() {
            match record {
                WriteRecord::Insert { rid } => table.mark_delete(rid)?,
                WriteRecord::Delete { rid } => table.unmark_delete(rid)?,
                WriteRecord::Update { rid, old_tuple } => table.update(rid, &old_tuple)?,
            }
        }

        self.release_locks(txn)?;
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>) -> Result<()> {
        for rid in txn.locked_rids() {
            self.lock_manager.unlock(txn, rid)?;
        }
        Ok(())
    }
}
