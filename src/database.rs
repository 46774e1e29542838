use std::path::Path;
use std::sync::Arc;

use crate::buffer::buffer_pool::{BufferPool, PageRef};
use crate::catalog::Catalog;
use crate::common::{PageId, TableId, TransactionId};
use crate::concurrency::lock_manager::LockMode;
use crate::concurrency::TransactionManager;
use crate::config::StorageConfig;
use crate::error::Result;
use crate::executors::seq_scan_executor::SeqScan;
use crate::executors::Executor;
use crate::storage::heap::file::HeapFile;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// Wires catalog, transactions and buffer pool together. This is the surface
/// query processing talks to.
pub struct Database {
    config: StorageConfig,
    catalog: Arc<Catalog>,
    transactions: Arc<TransactionManager>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: StorageConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let transactions = Arc::new(TransactionManager::new());
        let buffer_pool = Arc::new(BufferPool::new(
            Arc::clone(&catalog),
            Arc::clone(&transactions),
            &config,
        ));
        Self {
            config,
            catalog,
            transactions,
            buffer_pool,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Opens or creates the heap file at `path` and registers it under `name`.
    pub fn create_table(
        &self,
        path: impl AsRef<Path>,
        name: &str,
        schema: Schema,
    ) -> Result<TableId> {
        let file = HeapFile::open(path, schema, self.config.page_size)?;
        self.catalog.add_table(file, name, None)
    }

    /// Registers the tables of a catalog file, see [`Catalog::load_schema`].
    pub fn load_schema(&self, path: impl AsRef<Path>) -> Result<Vec<TableId>> {
        self.catalog.load_schema(path, self.config.page_size)
    }

    pub fn begin(&self) -> TransactionId {
        self.transactions.begin()
    }

    /// Returns an opened scan over a table, aliased by the table name.
    pub fn open_scan(&self, tx: TransactionId, table_id: TableId) -> Result<SeqScan> {
        let mut scan = SeqScan::with_table_name(Arc::clone(&self.buffer_pool), tx, table_id)?;
        scan.open()?;
        Ok(scan)
    }

    pub fn get_page(&self, tx: TransactionId, page_id: PageId, mode: LockMode) -> Result<PageRef> {
        self.buffer_pool.get_page(tx, page_id, mode)
    }

    pub fn insert_tuple(
        &self,
        tx: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        self.buffer_pool.insert_tuple(tx, table_id, tuple)
    }

    pub fn delete_tuple(&self, tx: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.buffer_pool.delete_tuple(tx, tuple)
    }

    pub fn commit(&self, tx: TransactionId) -> Result<()> {
        self.buffer_pool.commit(tx)
    }

    pub fn abort(&self, tx: TransactionId) -> Result<()> {
        self.buffer_pool.abort(tx)
    }
}
