//! Transaction state.
//!
//! A [`Transaction`] tracks its two-phase-locking state machine, the rid
//! sets of the locks it holds, and the undo records its executors append
//! for rollback. The struct itself is passive: the lock manager drives
//! the state machine and the transaction manager replays the records.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::common::{Rid, TxnId};

/// Two-phase locking lifecycle.
///
/// ```text
/// GROWING --lock ok-->      GROWING
/// GROWING --first unlock--> SHRINKING   (REPEATABLE_READ only)
/// GROWING --wounded-->      ABORTED
/// SHRINKING --new lock-->   ABORTED     (LOCK_ON_SHRINKING)
/// ```
///
/// `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Supported isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// No shared locks at all; requesting one aborts.
    ReadUncommitted,
    /// Shared locks released right after the read; no shrinking phase.
    ReadCommitted,
    /// Strict two-phase locking: first unlock starts the shrinking phase.
    RepeatableRead,
}

/// Undo record for one table-heap mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    /// Tuple inserted at `rid`; undo by tombstoning it.
    Insert { rid: Rid },
    /// Tuple tombstoned at `rid`; undo by clearing the tombstone.
    Delete { rid: Rid },
    /// Tuple overwritten at `rid`; undo by restoring the old bytes.
    Update { rid: Rid, old_tuple: Vec<u8> },
}

/// Which way an index entry moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWriteOp {
    Insert,
    Delete,
}

/// Undo record for one index mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWriteRecord {
    /// Position of the index in the executor context's index list.
    pub index_no: usize,
    pub op: IndexWriteOp,
    pub key: u64,
    pub rid: Rid,
}

/// One transaction's identity, lock sets, and undo log.
pub struct Transaction {
    id: TxnId,
    isolation: IsolationLevel,
    state: Mutex<TransactionState>,
    shared_rids: Mutex<HashSet<Rid>>,
    exclusive_rids: Mutex<HashSet<Rid>>,
    write_records: Mutex<Vec<WriteRecord>>,
    index_records: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    /// A fresh transaction in its growing phase.
    pub fn new(id: TxnId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            state: Mutex::new(TransactionState::Growing),
            shared_rids: Mutex::new(HashSet::new()),
            exclusive_rids: Mutex::new(HashSet::new()),
            write_records: Mutex::new(Vec::new()),
            index_records: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    // ========================================================================
    // Lock sets
    // ========================================================================

    pub fn holds_shared(&self, rid: Rid) -> bool {
        self.shared_rids.lock().contains(&rid)
    }

    pub fn holds_exclusive(&self, rid: Rid) -> bool {
        self.exclusive_rids.lock().contains(&rid)
    }

    pub fn add_shared(&self, rid: Rid) {
        self.shared_rids.lock().insert(rid);
    }

    pub fn add_exclusive(&self, rid: Rid) {
        self.exclusive_rids.lock().insert(rid);
    }

    pub fn remove_shared(&self, rid: Rid) {
        self.shared_rids.lock().remove(&rid);
    }

    pub fn remove_exclusive(&self, rid: Rid) {
        self.exclusive_rids.lock().remove(&rid);
    }

    /// Every rid this transaction holds any lock on.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_rids.lock().iter().copied().collect();
        rids.extend(self.exclusive_rids.lock().iter().copied());
        rids.sort_unstable();
        rids.dedup();
        rids
    }

    // ========================================================================
    // Undo log
    // ========================================================================

    pub fn push_write_record(&self, record: WriteRecord) {
        self.write_records.lock().push(record);
    }

    pub fn push_index_record(&self, record: IndexWriteRecord) {
        self.index_records.lock().push(record);
    }

    /// Drain the heap undo log (newest last).
    pub fn take_write_records(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_records.lock())
    }

    /// Drain the index undo log (newest last).
    pub fn take_index_records(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut self.index_records.lock())
    }
}
