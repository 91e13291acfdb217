//! Query executors - the locking/indexing touchpoints of the engine.
//!
//! Executors follow the init/next protocol: `init` prepares the cursor,
//! `next` yields `(tuple bytes, rid)` pairs until exhausted. Each
//! executor acquires and releases row locks according to its
//! transaction's isolation level and keeps every registered index in
//! step with the heap.

mod delete;
mod insert;
mod seq_scan;
mod update;

use std::sync::Arc;

use crate::common::{Result, Rid};
use crate::concurrency::{LockManager, Transaction};
use crate::index::TableIndex;
use crate::storage::TableHeap;

pub use delete::DeleteExecutor;
pub use insert::InsertExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

/// Everything an executor needs: the transaction, the lock manager, the
/// target table, and its secondary indexes.
pub struct ExecutorContext {
    pub txn: Arc<Transaction>,
    pub lock_manager: Arc<LockManager>,
    pub table: Arc<TableHeap>,
    pub indexes: Vec<Arc<TableIndex>>,
}

impl ExecutorContext {
    pub fn new(
        txn: Arc<Transaction>,
        lock_manager: Arc<LockManager>,
        table: Arc<TableHeap>,
        indexes: Vec<Arc<TableIndex>>,
    ) -> Self {
        Self {
            txn,
            lock_manager,
            table,
            indexes,
        }
    }
}

/// The init/next executor protocol.
///
/// No wider executor hierarchy is needed; every concrete executor is
/// just these two entry points over an [`ExecutorContext`].
pub trait Executor {
    /// Prepare (or reset) the executor's cursor.
    fn init(&mut self) -> Result<()>;

    /// Produce the next tuple, or `None` when exhausted. Mutating
    /// executors do all their work during `next` and then report `None`.
    fn next(&mut self) -> Result<Option<(Vec<u8>, Rid)>>;
}
