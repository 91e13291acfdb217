//! Transactions and two-phase locking.
//!
//! - [`Transaction`] - state machine, lock sets, undo records
//! - [`LockManager`] - shared/exclusive row locks with wound-wait
//! - [`TransactionManager`] - begin / commit / abort-with-rollback

mod lock_manager;
mod transaction;
mod transaction_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{
    IndexWriteOp, IndexWriteRecord, IsolationLevel, Transaction, TransactionState, WriteRecord,
};
pub use transaction_manager::TransactionManager;
