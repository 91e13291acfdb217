//! Row-level lock manager: shared/exclusive queues with wound-wait.
//!
//! One mutex guards the whole lock table; every rid's queue carries its
//! own condition variable, so waiters on different rids do not wake each
//! other. Deadlock is *prevented*, not detected: a blocked request wounds
//! every incompatible younger transaction in its queue, and a wounded
//! waiter raises a `Deadlock` abort when it next wakes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::{AbortReason, Error, Result, Rid, TxnId};
use crate::concurrency::{IsolationLevel, Transaction, TransactionState};

/// Lock strength on one rid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One transaction's request on one rid.
struct LockRequest {
    /// The requesting transaction. Holding the Arc lets a blocked older
    /// request wound this transaction directly, without a registry.
    txn: Arc<Transaction>,
    mode: LockMode,
    granted: bool,
}

/// Queue of requests on one rid.
struct LockQueue {
    /// Arrival order; granted requests form the compatible prefix.
    requests: VecDeque<LockRequest>,
    /// The transaction currently upgrading shared → exclusive, if any.
    upgrading: Option<TxnId>,
    /// Waiters on this rid.
    cv: Arc<Condvar>,
}

impl Default for LockQueue {
    fn default() -> Self {
        Self {
            requests: VecDeque::new(),
            upgrading: None,
            cv: Arc::new(Condvar::new()),
        }
    }
}

#[derive(Default)]
struct LockTable {
    queues: HashMap<Rid, LockQueue>,
}

/// The lock manager.
///
/// All four operations gate on the transaction's two-phase state, mark
/// the transaction `Aborted` before surfacing any typed abort, and keep
/// the transaction's own lock sets in sync with the queues.
pub struct LockManager {
    latch: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            latch: Mutex::new(LockTable::default()),
        }
    }

    /// Acquire a shared lock on `rid`.
    ///
    /// Idempotent when the transaction already holds any lock on the rid.
    ///
    /// # Errors
    /// - `SharedOnReadUncommitted` under READ_UNCOMMITTED
    /// - `LockOnShrinking` outside the growing phase
    /// - `Deadlock` when wounded while blocked
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<()> {
        if txn.isolation() == IsolationLevel::ReadUncommitted {
            return Err(self.abort(txn, AbortReason::SharedOnReadUncommitted));
        }
        if txn.state() != TransactionState::Growing {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.holds_shared(rid) || txn.holds_exclusive(rid) {
            return Ok(());
        }

        let mut table = self.latch.lock();
        table
            .queues
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest {
                txn: Arc::clone(txn),
                mode: LockMode::Shared,
                granted: false,
            });
        self.wait_for_grant(&mut table, txn, rid, LockMode::Shared, false)?;
        drop(table);

        txn.add_shared(rid);
        Ok(())
    }

    /// Acquire an exclusive lock on `rid`.
    ///
    /// Idempotent when the transaction already holds the rid exclusively.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<()> {
        if txn.state() != TransactionState::Growing {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }
        if txn.holds_exclusive(rid) {
            return Ok(());
        }

        let mut table = self.latch.lock();
        table
            .queues
            .entry(rid)
            .or_default()
            .requests
            .push_back(LockRequest {
                txn: Arc::clone(txn),
                mode: LockMode::Exclusive,
                granted: false,
            });
        self.wait_for_grant(&mut table, txn, rid, LockMode::Exclusive, false)?;
        drop(table);

        txn.add_exclusive(rid);
        Ok(())
    }

    /// Upgrade a held shared lock to exclusive.
    ///
    /// The granted shared request is re-evaluated in place under the
    /// exclusive grant predicate and flipped on success; the rid moves
    /// from the shared set to the exclusive set.
    ///
    /// # Errors
    /// - `UpgradeConflict` when another upgrade is already in flight
    /// - `LockNotHeld` when no shared lock exists to upgrade
    /// - `LockOnShrinking` / `Deadlock` as for the other operations
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<()> {
        if txn.holds_exclusive(rid) {
            return Ok(());
        }
        if txn.state() != TransactionState::Growing {
            return Err(self.abort(txn, AbortReason::LockOnShrinking));
        }

        let mut table = self.latch.lock();
        let queue = table.queues.entry(rid).or_default();

        if queue.upgrading.is_some() {
            queue.cv.notify_all();
            drop(table);
            return Err(self.abort(txn, AbortReason::UpgradeConflict));
        }
        let txn_id = txn.id();
        let holds_shared = queue
            .requests
            .iter()
            .any(|r| r.txn.id() == txn_id && r.granted && r.mode == LockMode::Shared);
        if !holds_shared {
            return Err(Error::LockNotHeld { txn_id, rid });
        }
        queue.upgrading = Some(txn_id);

        self.wait_for_grant(&mut table, txn, rid, LockMode::Exclusive, true)?;
        drop(table);

        txn.remove_shared(rid);
        txn.add_exclusive(rid);
        Ok(())
    }

    /// Release this transaction's lock on `rid`.
    ///
    /// Under REPEATABLE_READ the first unlock moves the transaction from
    /// GROWING to SHRINKING; the weaker levels keep growing so later
    /// shared locks stay legal.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<()> {
        let txn_id = txn.id();

        let mut table = self.latch.lock();
        if let Some(queue) = table.queues.get_mut(&rid) {
            queue.requests.retain(|r| !(r.txn.id() == txn_id && r.granted));
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
            queue.cv.notify_all();
        }
        drop(table);

        txn.remove_shared(rid);
        txn.remove_exclusive(rid);

        if txn.state() == TransactionState::Growing
            && txn.isolation() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Shrinking);
        }
        Ok(())
    }

    // ========================================================================
    // Grant loop
    // ========================================================================

    /// Block until the transaction's request on `rid` is grantable, or
    /// raise `Deadlock` after being wounded.
    ///
    /// Holds the table mutex throughout except while parked on the
    /// queue's condition variable.
    fn wait_for_grant(
        &self,
        table: &mut MutexGuard<'_, LockTable>,
        txn: &Arc<Transaction>,
        rid: Rid,
        mode: LockMode,
        upgrade: bool,
    ) -> Result<()> {
        let txn_id = txn.id();

        loop {
            // A wounded waiter cleans up its own request and bails.
            if txn.state() == TransactionState::Aborted {
                let queue = table.queues.entry(rid).or_default();
                if upgrade {
                    queue.upgrading = None;
                } else {
                    queue
                        .requests
                        .retain(|r| !(r.txn.id() == txn_id && !r.granted));
                }
                queue.cv.notify_all();
                return Err(Error::TransactionAborted {
                    txn_id,
                    reason: AbortReason::Deadlock,
                });
            }

            let queue = table.queues.entry(rid).or_default();
            let pos = queue
                .requests
                .iter()
                .position(|r| r.txn.id() == txn_id);
            let Some(pos) = pos else {
                // The entry only vanishes when this transaction is
                // wounded; the state check above will catch it.
                let cv = queue.cv.clone();
                cv.wait(table);
                continue;
            };

            if Self::grantable_at(&queue.requests, pos, txn_id, mode) {
                let request = &mut queue.requests[pos];
                request.granted = true;
                if upgrade {
                    request.mode = LockMode::Exclusive;
                    queue.upgrading = None;
                }
                queue.cv.notify_all();
                return Ok(());
            }

            let wounded = Self::wound_younger(queue, txn_id, mode);
            let cv = queue.cv.clone();
            if !wounded {
                cv.wait(table);
            }
            // Wounding freed the queue: re-evaluate immediately.
        }
    }

    /// The grant predicate, evaluated at the request's queue position:
    /// every *other* granted entry must be compatible with `mode`, and no
    /// ungranted entry may sit ahead of `pos`. Pending entries behind the
    /// position never block — that is what lets an upgrade overtake
    /// waiters that arrived after its original shared grant.
    fn grantable_at(
        requests: &VecDeque<LockRequest>,
        pos: usize,
        txn_id: TxnId,
        mode: LockMode,
    ) -> bool {
        for (i, request) in requests.iter().enumerate() {
            if request.txn.id() == txn_id {
                continue;
            }
            if i < pos && !request.granted {
                return false;
            }
            if request.granted && !Self::compatible(request.mode, mode) {
                return false;
            }
        }
        true
    }

    /// Shared coexists with shared; everything else conflicts.
    fn compatible(held: LockMode, requested: LockMode) -> bool {
        matches!((held, requested), (LockMode::Shared, LockMode::Shared))
    }

    /// Wound-wait: abort and dequeue every incompatible entry belonging
    /// to a younger transaction. Returns whether anything was wounded.
    fn wound_younger(queue: &mut LockQueue, txn_id: TxnId, mode: LockMode) -> bool {
        let mut wounded: Vec<TxnId> = Vec::new();

        queue.requests.retain(|r| {
            let other = r.txn.id();
            let incompatible = match mode {
                LockMode::Shared => r.mode == LockMode::Exclusive,
                LockMode::Exclusive => true,
            };
            if other > txn_id && incompatible {
                r.txn.set_state(TransactionState::Aborted);
                log::warn!("wound-wait: txn {other} wounded by txn {txn_id}");
                wounded.push(other);
                false
            } else {
                true
            }
        });

        if wounded.is_empty() {
            return false;
        }
        if let Some(upgrader) = queue.upgrading {
            if wounded.contains(&upgrader) {
                queue.upgrading = None;
            }
        }
        queue.cv.notify_all();
        true
    }

    /// Mark the transaction aborted and build the typed abort error.
    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> Error {
        txn.set_state(TransactionState::Aborted);
        Error::TransactionAborted {
            txn_id: txn.id(),
            reason,
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
