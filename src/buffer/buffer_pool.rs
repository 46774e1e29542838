use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::clock_replacer::ClockReplacer;
use super::PoolPos;
use crate::catalog::Catalog;
use crate::common::{PageId, TableId, TransactionId};
use crate::concurrency::lock_manager::{LockManager, LockMode};
use crate::concurrency::{TransactionManager, TransactionStatus};
use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::storage::heap::page::HeapPage;
use crate::tuple::Tuple;

/// A cached page. Transactional isolation comes from the page locks of the
/// lock manager, the RwLock only guards the in-memory copy.
pub type PageRef = Arc<RwLock<HeapPage>>;

struct Frame {
    page_id: PageId,
    page: Option<PageRef>,
    /// the transaction that modified the page since it was read from disk
    dirtied_by: Option<TransactionId>,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: PageId::new(0, 0),
            page: None,
            dirtied_by: None,
        }
    }

    fn clear(&mut self) {
        self.page = None;
        self.dirtied_by = None;
    }
}

/// Everything guarded by the pool mutex. Code holding it may take the lock
/// table mutex of the lock manager, never the other way round.
struct PoolState {
    frames: Box<[Frame]>,
    page_table: HashMap<PageId, PoolPos>,
    clock_replacer: ClockReplacer,
}

/// Caches a bounded number of pages and grants them to transactions under
/// page locks.
///
/// Buffer management is no-steal/force: a page modified by a running
/// transaction is never written to disk or evicted, committing writes all
/// pages the transaction modified, aborting throws them away.
pub struct BufferPool {
    state: Mutex<PoolState>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    transactions: Arc<TransactionManager>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(
        catalog: Arc<Catalog>,
        transactions: Arc<TransactionManager>,
        config: &StorageConfig,
    ) -> Self {
        let capacity = config.pool_size;
        let frames = (0..capacity).map(|_| Frame::empty()).collect();

        Self {
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                clock_replacer: ClockReplacer::new(capacity),
            }),
            lock_manager: LockManager::new(config.lock_timeout),
            catalog,
            transactions,
            capacity,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a page on behalf of a transaction, locking it in the given mode first.
    ///
    /// If the lock cannot be granted because of a timeout or a deadlock, the
    /// transaction is aborted before the error is returned.
    pub fn get_page(&self, tx: TransactionId, page_id: PageId, mode: LockMode) -> Result<PageRef> {
        self.transactions.ensure_active(tx)?;

        if let Err(e) = self.lock_manager.lock(tx, page_id, mode) {
            if matches!(
                e,
                StorageError::LockTimeout { .. } | StorageError::DeadlockDetected { .. }
            ) {
                match self.abort(tx) {
                    Ok(()) | Err(StorageError::TransactionNotActive(_)) => (),
                    Err(abort_error) => {
                        warn!("Failed to abort transaction {}: {}", tx, abort_error)
                    }
                }
            }
            return Err(e);
        }

        let mut state = self.state.lock();
        // an abort from another thread may have released the lock meanwhile
        if self.lock_manager.held_mode(tx, page_id).is_none() {
            return Err(StorageError::TransactionAborted(tx));
        }
        if let Some(&pool_pos) = state.page_table.get(&page_id) {
            state.clock_replacer.record_access(pool_pos);
            if let Some(page) = &state.frames[pool_pos].page {
                return Ok(Arc::clone(page));
            }
        }

        let (file, _) = self.catalog.lookup_table(page_id.table_id())?;
        let pool_pos = self.find_free_frame(&mut state, tx)?;
        let page = Arc::new(RwLock::new(file.read_page(page_id)?));
        debug!("Read page {} into frame {}", page_id, pool_pos);

        let frame = &mut state.frames[pool_pos];
        frame.page_id = page_id;
        frame.page = Some(Arc::clone(&page));
        frame.dirtied_by = None;
        state.page_table.insert(page_id, pool_pos);
        state.clock_replacer.record_access(pool_pos);
        Ok(page)
    }

    /// Finds a frame for a new page, evicting a clean page nobody else has
    /// locked if the pool is full.
    fn find_free_frame(
        &self,
        state: &mut MutexGuard<PoolState>,
        tx: TransactionId,
    ) -> Result<PoolPos> {
        if let Some(pool_pos) = state.frames.iter().position(|frame| frame.page.is_none()) {
            return Ok(pool_pos);
        }

        let PoolState {
            frames,
            page_table,
            clock_replacer,
        } = &mut **state;
        let victim = clock_replacer.find_victim(|pool_pos| {
            let frame = &frames[pool_pos];
            frame.dirtied_by.is_none() && !self.lock_manager.is_locked_by_other(tx, frame.page_id)
        });

        match victim {
            Some(pool_pos) => {
                let frame = &mut frames[pool_pos];
                debug!("Evicting page {} from frame {}", frame.page_id, pool_pos);
                page_table.remove(&frame.page_id);
                frame.clear();
                clock_replacer.remove(pool_pos);
                Ok(pool_pos)
            }
            None => Err(StorageError::BufferPoolFull {
                capacity: self.capacity,
            }),
        }
    }

    /// Records that a transaction modified a page. The transaction must hold
    /// an exclusive lock on it.
    pub fn mark_dirty(&self, page_id: PageId, tx: TransactionId) -> Result<()> {
        if self.lock_manager.held_mode(tx, page_id) != Some(LockMode::Exclusive) {
            return Err(StorageError::InsufficientLock { tx, page_id });
        }
        let mut state = self.state.lock();
        let pool_pos = *state
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;
        state.frames[pool_pos].dirtied_by = Some(tx);
        Ok(())
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map_or(false, |pool_pos| state.frames[*pool_pos].dirtied_by.is_some())
    }

    pub fn holds_lock(&self, tx: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.held_mode(tx, page_id).is_some()
    }

    pub fn lock_mode(&self, tx: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.lock_manager.held_mode(tx, page_id)
    }

    pub fn resident_pages(&self) -> Vec<PageId> {
        let mut pages = self.state.lock().page_table.keys().copied().collect::<Vec<_>>();
        pages.sort();
        pages
    }

    fn write_frame(&self, frame: &mut Frame) -> Result<()> {
        if let (Some(page), Some(_)) = (&frame.page, frame.dirtied_by) {
            let (file, _) = self.catalog.lookup_table(frame.page_id.table_id())?;
            file.write_page(&page.read())?;
            debug!("Flushed page {}", frame.page_id);
            frame.dirtied_by = None;
        }
        Ok(())
    }

    /// Writes a resident page to disk if it is dirty.
    ///
    /// This ignores which transaction modified the page, committing a
    /// transaction flushes exactly its own pages.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(&pool_pos) = state.page_table.get(&page_id) {
            self.write_frame(&mut state.frames[pool_pos])?;
        }
        Ok(())
    }

    /// Writes every dirty page to disk.
    pub fn flush_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        for frame in state.frames.iter_mut() {
            self.write_frame(frame)?;
        }
        Ok(())
    }

    /// Drops a page from the pool without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        discard_frame(&mut self.state.lock(), page_id);
    }

    fn dirty_pages_of(&self, tx: TransactionId) -> Vec<PageId> {
        self.state
            .lock()
            .frames
            .iter()
            .filter(|frame| frame.page.is_some() && frame.dirtied_by == Some(tx))
            .map(|frame| frame.page_id)
            .collect()
    }

    /// Inserts a tuple into a table and marks the modified pages dirty.
    pub fn insert_tuple(
        &self,
        tx: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        self.transactions.ensure_active(tx)?;
        let (file, _) = self.catalog.lookup_table(table_id)?;
        let pages = file.insert_tuple(self, tx, tuple)?;
        for page_id in &pages {
            self.mark_dirty(*page_id, tx)?;
        }
        Ok(pages)
    }

    /// Deletes a tuple from the table its record id points into and marks the
    /// modified pages dirty.
    pub fn delete_tuple(&self, tx: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.transactions.ensure_active(tx)?;
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let (file, _) = self.catalog.lookup_table(record_id.page_id().table_id())?;
        let pages = file.delete_tuple(self, tx, tuple)?;
        for page_id in &pages {
            self.mark_dirty(*page_id, tx)?;
        }
        Ok(pages)
    }

    /// Writes every page the transaction modified and releases its locks.
    ///
    /// If writing fails the transaction stays active and should be aborted.
    pub fn commit(&self, tx: TransactionId) -> Result<()> {
        self.transactions.ensure_active(tx)?;
        for page_id in self.dirty_pages_of(tx) {
            self.flush_page(page_id)?;
        }
        self.lock_manager.release_all(tx);
        self.transactions.finish(tx, TransactionStatus::Committed)?;
        info!("Committed transaction {}", tx);
        Ok(())
    }

    /// Throws away every page the transaction could have modified and
    /// releases its locks, so later reads see the state on disk. Aborting
    /// twice fails.
    ///
    /// A page locked exclusively is dropped even if it was never marked dirty,
    /// the transaction may have changed it through its `PageRef` already.
    pub fn abort(&self, tx: TransactionId) -> Result<()> {
        self.transactions.finish(tx, TransactionStatus::Aborted)?;

        let mut state = self.state.lock();
        let mut discarded = self
            .lock_manager
            .pages_locked_by(tx)
            .into_iter()
            .filter(|page_id| {
                self.lock_manager.held_mode(tx, *page_id) == Some(LockMode::Exclusive)
            })
            .collect::<Vec<_>>();
        discarded.extend(
            state
                .frames
                .iter()
                .filter(|frame| frame.page.is_some() && frame.dirtied_by == Some(tx))
                .map(|frame| frame.page_id),
        );
        for page_id in discarded {
            discard_frame(&mut state, page_id);
        }
        // under the pool mutex, a concurrent fetch of this transaction either
        // cached its page before the discard or sees its lock gone
        self.lock_manager.release_all(tx);
        drop(state);

        info!("Aborted transaction {}", tx);
        Ok(())
    }
}

fn discard_frame(state: &mut PoolState, page_id: PageId) {
    if let Some(pool_pos) = state.page_table.remove(&page_id) {
        state.frames[pool_pos].clear();
        state.clock_replacer.remove(pool_pos);
        debug!("Discarded page {}", page_id);
    }
}
