use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::common::TransactionId;
use crate::error::{Result, StorageError};

pub mod lock_manager;

pub const INVALID_TRANSACTION_ID: TransactionId = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    InProgress,
    Aborted,
    Committed,
}

thread_local! {
    /// the transaction the current thread started last and hasn't finished yet
    static CURRENT_TRANSACTION: Cell<Option<TransactionId>> = Cell::new(None);
}

/// Hands out transaction ids and tracks whether they are still running.
/// Transaction ids are opaque to the rest of the storage layer.
pub struct TransactionManager {
    next_tid: AtomicU64,
    statuses: DashMap<TransactionId, TransactionStatus>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_tid: AtomicU64::new(INVALID_TRANSACTION_ID + 1),
            statuses: DashMap::new(),
        }
    }

    /// Starts a transaction and makes it the current one of the calling thread.
    pub fn begin(&self) -> TransactionId {
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        self.statuses.insert(tid, TransactionStatus::InProgress);
        CURRENT_TRANSACTION.with(|current| current.set(Some(tid)));
        tid
    }

    /// The transaction the calling thread is running, if any.
    pub fn current_transaction_id(&self) -> Option<TransactionId> {
        CURRENT_TRANSACTION.with(|current| current.get())
    }

    pub fn is_active(&self, tid: TransactionId) -> bool {
        self.status(tid) == Some(TransactionStatus::InProgress)
    }

    pub fn status(&self, tid: TransactionId) -> Option<TransactionStatus> {
        self.statuses.get(&tid).map(|status| *status.value())
    }

    pub fn ensure_active(&self, tid: TransactionId) -> Result<()> {
        if self.is_active(tid) {
            Ok(())
        } else {
            Err(StorageError::TransactionNotActive(tid))
        }
    }

    /// Moves an in-progress transaction to its final status.
    /// Fails if the transaction has already finished.
    pub(crate) fn finish(&self, tid: TransactionId, status: TransactionStatus) -> Result<()> {
        match self.statuses.entry(tid) {
            Entry::Occupied(mut entry) if *entry.get() == TransactionStatus::InProgress => {
                entry.insert(status);
            }
            _ => return Err(StorageError::TransactionNotActive(tid)),
        }
        CURRENT_TRANSACTION.with(|current| {
            if current.get() == Some(tid) {
                current.set(None);
            }
        });
        Ok(())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::{TransactionManager, TransactionStatus};
    use crate::error::StorageError;

    #[test]
    fn transactions_finish_once() {
        let transaction_manager = TransactionManager::new();
        let t1 = transaction_manager.begin();
        let t2 = transaction_manager.begin();
        assert!(t2 > t1);
        assert!(transaction_manager.is_active(t1));

        transaction_manager
            .finish(t1, TransactionStatus::Committed)
            .unwrap();
        assert_eq!(
            transaction_manager.status(t1),
            Some(TransactionStatus::Committed)
        );
        assert!(matches!(
            transaction_manager.finish(t1, TransactionStatus::Aborted),
            Err(StorageError::TransactionNotActive(_))
        ));
        assert!(!transaction_manager.is_active(t1));
        assert!(transaction_manager.is_active(t2));
        assert_eq!(transaction_manager.status(t2 + 100), None);
    }

    #[test]
    fn current_transaction_is_per_thread() {
        let transaction_manager = TransactionManager::new();
        assert_eq!(transaction_manager.current_transaction_id(), None);
        let tid = transaction_manager.begin();
        assert_eq!(transaction_manager.current_transaction_id(), Some(tid));

        thread::scope(|scope| {
            let transaction_manager = &transaction_manager;
            scope
                .spawn(move || {
                    assert_eq!(transaction_manager.current_transaction_id(), None);
                })
                .join()
                .unwrap();
        });

        transaction_manager
            .finish(tid, TransactionStatus::Aborted)
            .unwrap();
        assert_eq!(transaction_manager.current_transaction_id(), None);
    }
}
