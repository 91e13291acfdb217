//! Error types for Pinion.

use thiserror::Error;

use crate::common::Rid;

/// Transaction id, issued monotonically by the transaction manager.
///
/// Wound-wait compares ids to decide seniority: a numerically smaller id
/// is the older transaction.
pub type TxnId = u32;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write
/// `Result<T>`. This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// Why a transaction was forcibly aborted.
///
/// These are the typed abort reasons the lock manager surfaces; the
/// transaction is always marked `Aborted` before the error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A lock was requested after the transaction entered its shrinking
    /// phase (two-phase locking violation).
    LockOnShrinking,
    /// A second transaction tried to upgrade its shared lock on a rid that
    /// already has an upgrade in flight.
    UpgradeConflict,
    /// The transaction was wounded by an older transaction while blocked.
    Deadlock,
    /// A shared lock was requested under READ_UNCOMMITTED, which takes no
    /// read locks at all.
    SharedOnReadUncommitted,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "lock acquired while shrinking",
            AbortReason::UpgradeConflict => "conflicting lock upgrade",
            AbortReason::Deadlock => "wounded by an older transaction",
            AbortReason::SharedOnReadUncommitted => {
                "shared lock under READ_UNCOMMITTED"
            }
        };
        f.write_str(s)
    }
}

/// All possible errors in Pinion.
///
/// By having a single error type, error handling stays consistent across
/// the buffer pool, the index, and the transaction layer.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The provided page id is the invalid sentinel or negative.
    #[error("invalid page id: {0}")]
    InvalidPageId(i32),

    /// The page is not resident in the buffer pool.
    #[error("page {0} is not resident in the buffer pool")]
    PageNotResident(i32),

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("no evictable frames available in the buffer pool")]
    NoFreeFrames,

    /// Attempted to delete a page that still has outstanding pins.
    #[error("page {0} is pinned")]
    PagePinned(i32),

    /// The bucket already holds this exact key/value pair.
    #[error("key/value pair already present in the hash table")]
    DuplicateEntry,

    /// The key/value pair to remove was not found.
    #[error("key/value pair not found in the hash table")]
    EntryNotFound,

    /// A bucket split would push a local depth past the directory's
    /// maximum depth.
    #[error("hash directory is at maximum depth")]
    DirectoryDepthExceeded,

    /// A tuple is too large to ever fit in a table page.
    #[error("tuple of {size} bytes exceeds the page payload of {max}")]
    TupleTooLarge { size: usize, max: usize },

    /// In-place updates must keep the tuple length unchanged.
    #[error("updated tuple length differs from the stored tuple")]
    TupleSizeMismatch,

    /// The rid does not name a live tuple.
    #[error("no live tuple at {0}")]
    TupleNotFound(Rid),

    /// A stored page failed its checksum check.
    #[error("checksum mismatch on page {0}")]
    ChecksumMismatch(i32),

    /// A lock operation required a lock the transaction does not hold.
    #[error("transaction {txn_id} holds no lock on {rid}")]
    LockNotHeld { txn_id: TxnId, rid: Rid },

    /// The transaction was aborted by the lock manager.
    #[error("transaction {txn_id} aborted: {reason}")]
    TransactionAborted { txn_id: TxnId, reason: AbortReason },
}

impl Error {
    /// The abort reason, if this error is a typed transaction abort.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            Error::TransactionAborted { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotResident(42);
        assert_eq!(
            format!("{}", err),
            "page 42 is not resident in the buffer pool"
        );

        let err = Error::NoFreeFrames;
        assert_eq!(
            format!("{}", err),
            "no evictable frames available in the buffer pool"
        );
    }

    #[test]
    fn test_abort_display() {
        let err = Error::TransactionAborted {
            txn_id: 7,
            reason: AbortReason::Deadlock,
        };
        assert_eq!(
            format!("{}", err),
            "transaction 7 aborted: wounded by an older transaction"
        );
        assert_eq!(err.abort_reason(), Some(AbortReason::Deadlock));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }

    #[test]
    fn test_non_abort_has_no_reason() {
        let err = Error::TupleNotFound(Rid::new(PageId::new(1), 0));
        assert_eq!(err.abort_reason(), None);
    }
}
