use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::common::{PageId, TransactionId};
use crate::error::{Result, StorageError};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// read only access, compatible with other shared locks
    Shared,
    /// read write access, compatible with nothing
    Exclusive,
}

impl LockMode {
    fn compatible(&self, other: Self) -> bool {
        match self {
            Self::Shared => other == LockMode::Shared,
            Self::Exclusive => false,
        }
    }

    /// Returns true if holding `self` already grants `requested`.
    fn covers(&self, requested: Self) -> bool {
        *self == LockMode::Exclusive || requested == LockMode::Shared
    }
}

#[derive(Default)]
struct LockTable {
    /// holders of every locked page
    page_locks: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// pages locked by every transaction
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// wait-for graph: waiting transaction -> transactions it waits for
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
    /// transactions whose locks were released, they never lock again
    finished: HashSet<TransactionId>,
}

impl LockTable {
    fn mode_held(&self, tx: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.page_locks
            .get(&page_id)
            .and_then(|holders| holders.get(&tx))
            .copied()
    }

    /// Returns the other transactions whose locks conflict with the request.
    /// An empty set means the lock can be granted, which covers upgrades
    /// when `tx` is the only holder.
    fn blockers(
        &self,
        tx: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> HashSet<TransactionId> {
        match self.page_locks.get(&page_id) {
            None => HashSet::new(),
            Some(holders) => holders
                .iter()
                .filter(|(holder, held_mode)| **holder != tx && !held_mode.compatible(mode))
                .map(|(holder, _)| *holder)
                .collect(),
        }
    }

    fn grant(&mut self, tx: TransactionId, page_id: PageId, mode: LockMode) {
        let holders = self.page_locks.entry(page_id).or_default();
        let held_mode = holders.entry(tx).or_insert(mode);
        if mode == LockMode::Exclusive {
            *held_mode = LockMode::Exclusive;
        }
        self.held.entry(tx).or_default().insert(page_id);
    }

    /// Returns true if `target` can reach `tx` in the wait-for graph,
    /// i.e. letting `tx` wait for `target` closes a cycle.
    fn reaches(&self, target: TransactionId, tx: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![target];
        while let Some(current) = stack.pop() {
            if current == tx {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.waits_for.get(&current) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }
}

/// Page-level strict two-phase locking.
///
/// All lock state lives in one table behind a single mutex. Waiting
/// transactions sleep on one condition variable which is signalled whenever
/// locks are released.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Locks a page for a transaction. Waits until the lock can be granted.
    ///
    /// Fails with `DeadlockDetected` if waiting would close a cycle of waiting
    /// transactions, with `LockTimeout` if the lock isn't granted in time and
    /// with `TransactionAborted` if the locks of the transaction were released
    /// before or while waiting.
    pub fn lock(&self, tx: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        if matches!(table.mode_held(tx, page_id), Some(held) if held.covers(mode)) {
            return Ok(());
        }

        loop {
            if table.finished.contains(&tx) {
                table.waits_for.remove(&tx);
                return Err(StorageError::TransactionAborted(tx));
            }

            let blockers = table.blockers(tx, page_id, mode);
            if blockers.is_empty() {
                table.waits_for.remove(&tx);
                table.grant(tx, page_id, mode);
                return Ok(());
            }

            if blockers.iter().any(|blocker| table.reaches(*blocker, tx)) {
                table.waits_for.remove(&tx);
                warn!("Transaction {} would deadlock on page {}", tx, page_id);
                return Err(StorageError::DeadlockDetected { tx, page_id });
            }
            table.waits_for.insert(tx, blockers);

            if self.released.wait_until(&mut table, deadline).timed_out() {
                table.waits_for.remove(&tx);
                if table.finished.contains(&tx) {
                    return Err(StorageError::TransactionAborted(tx));
                }
                if table.blockers(tx, page_id, mode).is_empty() {
                    table.grant(tx, page_id, mode);
                    return Ok(());
                }
                warn!("Transaction {} timed out waiting for page {}", tx, page_id);
                return Err(StorageError::LockTimeout { tx, page_id });
            }
        }
    }

    /// Releases every lock of a transaction and ends it as far as locking is
    /// concerned. A transaction that is currently waiting for a lock, or asks
    /// for one later, gives up with `TransactionAborted`.
    pub fn release_all(&self, tx: TransactionId) {
        let mut table = self.table.lock();
        if let Some(pages) = table.held.remove(&tx) {
            for page_id in pages {
                if let Some(holders) = table.page_locks.get_mut(&page_id) {
                    holders.remove(&tx);
                    if holders.is_empty() {
                        table.page_locks.remove(&page_id);
                    }
                }
            }
        }
        table.waits_for.remove(&tx);
        table.finished.insert(tx);
        for waiting in table.waits_for.values_mut() {
            waiting.remove(&tx);
        }
        drop(table);
        self.released.notify_all();
    }

    /// Returns the lock mode a transaction holds on a page.
    pub fn held_mode(&self, tx: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table.lock().mode_held(tx, page_id)
    }

    /// Returns true if any transaction but `tx` holds a lock on the page.
    pub fn is_locked_by_other(&self, tx: TransactionId, page_id: PageId) -> bool {
        self.table
            .lock()
            .page_locks
            .get(&page_id)
            .map_or(false, |holders| holders.keys().any(|holder| *holder != tx))
    }

    pub fn pages_locked_by(&self, tx: TransactionId) -> Vec<PageId> {
        self.table
            .lock()
            .held
            .get(&tx)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }
}
