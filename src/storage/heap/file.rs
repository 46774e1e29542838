use std::fs::{File, OpenOptions};
use std::os::unix::prelude::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::page::HeapPage;
use crate::buffer::buffer_pool::BufferPool;
use crate::common::{stable_hash, PageId, PageNo, TableId, TransactionId};
use crate::concurrency::lock_manager::LockMode;
use crate::config::ensure_page_size;
use crate::error::{Result, StorageError};
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// An unordered collection of tuples stored in fixed-size pages.
///
/// The file is a plain concatenation of pages without any header. Pages are
/// only read directly by the buffer pool, everything else goes through it.
pub struct HeapFile {
    path: PathBuf,
    file: File,
    schema: Arc<Schema>,
    table_id: TableId,
    page_size: usize,
    /// serializes appending new pages
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Opens a heap file, creating an empty one if it doesn't exist yet.
    pub fn open(path: impl AsRef<Path>, schema: Schema, page_size: usize) -> Result<Self> {
        schema.ensure_not_empty()?;
        ensure_page_size(page_size)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        let path = path.as_ref().canonicalize()?;
        let table_id = table_id_for(&path);
        debug!("Opened heap file {} as table {}", path.display(), table_id);

        Ok(Self {
            path,
            file,
            schema: Arc::new(schema),
            table_id,
            page_size,
            append_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages, computed from the current file length.
    pub fn num_pages(&self) -> Result<PageNo> {
        let len = self.file.metadata()?.len();
        let page_size = self.page_size as u64;
        Ok(((len + page_size - 1) / page_size) as PageNo)
    }

    fn offset(&self, page_no: PageNo) -> u64 {
        page_no as u64 * self.page_size as u64
    }

    /// Reads a page directly from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id() != self.table_id {
            return Err(StorageError::UnknownTable(page_id.table_id()));
        }
        let mut data = vec![0u8; self.page_size];
        self.file
            .read_exact_at(&mut data, self.offset(page_id.page_no()))?;
        HeapPage::decode(page_id, Arc::clone(&self.schema), &data, self.page_size)
    }

    /// Writes a page directly to disk. Writing the page right after the last
    /// one appends it.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id() != self.table_id {
            return Err(StorageError::UnknownTable(page_id.table_id()));
        }
        let num_pages = self.num_pages()?;
        if page_id.page_no() > num_pages {
            return Err(StorageError::PageOutOfRange { page_id, num_pages });
        }
        let data = page.encode()?;
        self.file
            .write_all_at(&data, self.offset(page_id.page_no()))?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Appends an empty page and returns its id.
    fn allocate_new_page(&self) -> Result<PageId> {
        let _guard = self.append_lock.lock();
        let page_id = PageId::new(self.table_id, self.num_pages()?);
        let page = HeapPage::empty(page_id, Arc::clone(&self.schema), self.page_size);
        self.write_page(&page)?;
        debug!("Allocated page {}", page_id);
        Ok(page_id)
    }

    /// Inserts a tuple on the first page with a free slot, appending a new
    /// page if all pages are full. Returns the pages that were modified.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageId>> {
        self.schema.ensure_same_types(tuple.schema())?;

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tx, page_id, LockMode::Shared)?;
            let has_room = page.read().empty_slot_count() > 0;
            if !has_room {
                continue;
            }
            let page = pool.get_page(tx, page_id, LockMode::Exclusive)?;
            let mut page = page.write();
            if page.empty_slot_count() > 0 {
                page.insert_tuple(tuple)?;
                return Ok(vec![page_id]);
            }
        }

        loop {
            let page_id = self.allocate_new_page()?;
            let page = pool.get_page(tx, page_id, LockMode::Exclusive)?;
            let mut page = page.write();
            if page.num_slots() == 0 {
                return Err(StorageError::PageFull(page_id));
            }
            // another transaction may have filled the fresh page already
            if page.empty_slot_count() > 0 {
                page.insert_tuple(tuple)?;
                return Ok(vec![page_id]);
            }
        }
    }

    /// Removes the tuple its record id points at. Returns the pages that were modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tx: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let page_id = record_id.page_id();
        if page_id.table_id() != self.table_id {
            return Err(StorageError::UnknownTable(page_id.table_id()));
        }
        let page = pool.get_page(tx, page_id, LockMode::Exclusive)?;
        page.write().delete_tuple_at_slot(record_id.slot())?;
        Ok(vec![page_id])
    }

    /// Returns a closed iterator over all tuples of this file.
    pub fn iterator(
        self: &Arc<Self>,
        pool: Arc<BufferPool>,
        tx: TransactionId,
    ) -> HeapFileIterator {
        HeapFileIterator::new(Arc::clone(self), pool, tx)
    }

    /// Overrides the table id, so tests can make two paths collide.
    #[cfg(test)]
    pub(crate) fn with_table_id(mut self, table_id: TableId) -> Self {
        self.table_id = table_id;
        self
    }
}

/// Derives the table id from the canonical path, so the same file gets the
/// same id in every process.
fn table_id_for(path: &Path) -> TableId {
    stable_hash(path.as_os_str().to_string_lossy().as_bytes())
}

enum IteratorState {
    Closed,
    Open {
        /// the page `tuples` was taken from, `None` before the first page
        page_no: Option<PageNo>,
        tuples: std::vec::IntoIter<Tuple>,
        lookahead: Option<Tuple>,
    },
}

/// Scans a heap file page by page through the buffer pool.
///
/// At most one page worth of tuples is buffered. Page locks taken while
/// scanning belong to the transaction and outlive the iterator.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tx: TransactionId,
    state: IteratorState,
    opened: bool,
}

impl HeapFileIterator {
    fn new(file: Arc<HeapFile>, pool: Arc<BufferPool>, tx: TransactionId) -> Self {
        Self {
            file,
            pool,
            tx,
            state: IteratorState::Closed,
            opened: false,
        }
    }

    pub fn open(&mut self) {
        self.state = IteratorState::Open {
            page_no: None,
            tuples: Vec::new().into_iter(),
            lookahead: None,
        };
        self.opened = true;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, IteratorState::Open { .. })
    }

    pub fn close(&mut self) {
        self.state = IteratorState::Closed;
    }

    /// Restarts the scan at the first page.
    pub fn rewind(&mut self) -> Result<()> {
        if !self.opened {
            return Err(StorageError::IteratorNotOpen);
        }
        self.close();
        self.open();
        Ok(())
    }

    pub fn has_next(&mut self) -> Result<bool> {
        let next = self.fetch_next()?;
        let IteratorState::Open { lookahead, .. } = &mut self.state else {
            return Err(StorageError::IteratorNotOpen);
        };
        *lookahead = next;
        Ok(lookahead.is_some())
    }

    pub fn next_tuple(&mut self) -> Result<Tuple> {
        self.fetch_next()?.ok_or(StorageError::NoSuchElement)
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let IteratorState::Open {
            page_no,
            tuples,
            lookahead,
        } = &mut self.state
        else {
            return Err(StorageError::IteratorNotOpen);
        };
        if let Some(tuple) = lookahead.take() {
            return Ok(Some(tuple));
        }

        loop {
            if let Some(tuple) = tuples.next() {
                return Ok(Some(tuple));
            }
            let next_page_no = page_no.map_or(0, |page_no| page_no + 1);
            if next_page_no >= self.file.num_pages()? {
                return Ok(None);
            }
            let page_id = PageId::new(self.file.id(), next_page_no);
            let page = self.pool.get_page(self.tx, page_id, LockMode::Shared)?;
            let page_tuples = page.read().iter_tuples().collect::<Vec<_>>();
            *tuples = page_tuples.into_iter();
            *page_no = Some(next_page_no);
        }
    }
}

impl Iterator for HeapFileIterator {
    type Item = Result<Tuple>;

    /// Yields nothing on a closed iterator. After an error the iterator is closed.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_open() {
            return None;
        }
        match self.fetch_next() {
            Ok(tuple) => tuple.map(Ok),
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::HeapFile;
    use crate::common::PageId;
    use crate::config::StorageConfig;
    use crate::database::Database;
    use crate::error::StorageError;
    use crate::storage::heap::page::HeapPage;
    use crate::tuple::schema::{Schema, TypeId};
    use crate::tuple::value::Value;
    use crate::tuple::Tuple;

    const PAGE_SIZE: usize = 4096;

    fn five_ints() -> Schema {
        Schema::from_types(&[TypeId::Integer; 5])
    }

    fn row(schema: &Arc<Schema>, seed: i32) -> Tuple {
        let values = (0..5).map(|i| Value::Integer(seed * 10 + i)).collect();
        Tuple::from_values(Arc::clone(schema), values).unwrap()
    }

    #[test]
    fn table_id_is_stable() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let first = HeapFile::open(&path, five_ints(), PAGE_SIZE)?;
        let second = HeapFile::open(&path, five_ints(), PAGE_SIZE)?;
        assert_eq!(first.id(), second.id());

        let other = HeapFile::open(data_dir.path().join("u.dat"), five_ints(), PAGE_SIZE)?;
        assert_ne!(first.id(), other.id());
        Ok(())
    }

    #[test]
    fn empty_schema_is_rejected() -> Result<()> {
        let data_dir = tempdir()?;
        let result = HeapFile::open(data_dir.path().join("t.dat"), Schema::new(vec![]), PAGE_SIZE);
        assert!(matches!(result, Err(StorageError::EmptySchema)));
        Ok(())
    }

    #[test]
    fn zero_page_size_is_rejected() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let result = HeapFile::open(&path, five_ints(), 0);
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn read_and_write_pages() -> Result<()> {
        let data_dir = tempdir()?;
        let file = HeapFile::open(data_dir.path().join("t.dat"), five_ints(), PAGE_SIZE)?;
        assert_eq!(file.num_pages()?, 0);
        assert_eq!(file.page_size(), PAGE_SIZE);

        let page_id = PageId::new(file.id(), 0);
        let mut page = HeapPage::empty(page_id, Arc::clone(file.schema()), PAGE_SIZE);
        page.insert_tuple(row(file.schema(), 1))?;
        file.write_page(&page)?;
        assert_eq!(file.num_pages()?, 1);
        assert_eq!(file.read_page(page_id)?, page);

        let missing = file.read_page(PageId::new(file.id(), 1));
        assert!(matches!(missing, Err(StorageError::Io(_))));

        let gap = HeapPage::empty(PageId::new(file.id(), 5), Arc::clone(file.schema()), PAGE_SIZE);
        assert!(matches!(
            file.write_page(&gap),
            Err(StorageError::PageOutOfRange { num_pages: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn short_file_is_an_io_error() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 10])?;
        let file = HeapFile::open(&path, five_ints(), PAGE_SIZE)?;
        assert_eq!(file.num_pages()?, 2);
        assert!(file.read_page(PageId::new(file.id(), 0)).is_ok());
        assert!(matches!(
            file.read_page(PageId::new(file.id(), 1)),
            Err(StorageError::Io(_))
        ));
        Ok(())
    }

    #[test]
    fn scan_yields_every_tuple_in_order() -> Result<()> {
        let data_dir = tempdir()?;
        let db = Database::new(StorageConfig::default());
        let table_id = db.create_table(data_dir.path().join("t.dat"), "t", five_ints())?;
        let file = db.catalog().lookup_table(table_id)?.0;

        // 200 tuples of 20 bytes fit on a single page
        let tx = db.begin();
        for i in 0..200 {
            db.insert_tuple(tx, table_id, row(file.schema(), i))?;
        }
        db.commit(tx)?;
        assert_eq!(file.num_pages()?, 1);

        // 3 more pages worth of tuples
        let tx = db.begin();
        for i in 200..(203 * 4) {
            db.insert_tuple(tx, table_id, row(file.schema(), i))?;
        }
        db.commit(tx)?;
        assert_eq!(file.num_pages()?, 4);
        let len = std::fs::metadata(file.path())?.len();
        assert_eq!(file.num_pages()? as u64, (len + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64);

        let tx = db.begin();
        let mut iter = file.iterator(Arc::clone(db.buffer_pool()), tx);
        iter.open();
        let tuples = iter.by_ref().collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(tuples.len(), 203 * 4);

        let record_ids = tuples
            .iter()
            .map(|tuple| tuple.record_id().unwrap())
            .collect::<Vec<_>>();
        let mut sorted = record_ids.clone();
        sorted.sort();
        assert_eq!(record_ids, sorted);
        assert_eq!(record_ids.iter().collect::<HashSet<_>>().len(), record_ids.len());

        iter.rewind()?;
        let again = iter.by_ref().collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(tuples, again);
        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn iterator_protocol() -> Result<()> {
        let data_dir = tempdir()?;
        let db = Database::new(StorageConfig::default());
        let table_id = db.create_table(data_dir.path().join("t.dat"), "t", five_ints())?;
        let file = db.catalog().lookup_table(table_id)?.0;

        let tx = db.begin();
        db.insert_tuple(tx, table_id, row(file.schema(), 1))?;
        db.insert_tuple(tx, table_id, row(file.schema(), 2))?;

        let mut iter = file.iterator(Arc::clone(db.buffer_pool()), tx);
        assert!(matches!(iter.rewind(), Err(StorageError::IteratorNotOpen)));
        assert!(matches!(iter.has_next(), Err(StorageError::IteratorNotOpen)));
        assert!(iter.next().is_none());

        iter.open();
        assert!(iter.has_next()?);
        assert!(iter.has_next()?);
        assert_eq!(iter.next_tuple()?.field(0)?, Some(&Value::Integer(10)));
        assert_eq!(iter.next_tuple()?.field(0)?, Some(&Value::Integer(20)));
        assert!(!iter.has_next()?);
        assert!(matches!(iter.next_tuple(), Err(StorageError::NoSuchElement)));

        iter.close();
        iter.rewind()?;
        assert_eq!(iter.next_tuple()?.field(0)?, Some(&Value::Integer(10)));
        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn delete_frees_slot() -> Result<()> {
        let data_dir = tempdir()?;
        let db = Database::new(StorageConfig::default());
        let table_id = db.create_table(data_dir.path().join("t.dat"), "t", five_ints())?;
        let file = db.catalog().lookup_table(table_id)?.0;

        let tx = db.begin();
        for i in 0..3 {
            db.insert_tuple(tx, table_id, row(file.schema(), i))?;
        }
        db.commit(tx)?;

        let tx = db.begin();
        let mut iter = file.iterator(Arc::clone(db.buffer_pool()), tx);
        iter.open();
        iter.next_tuple()?;
        let second = iter.next_tuple()?;
        let touched = db.delete_tuple(tx, &second)?;
        assert_eq!(touched, vec![second.record_id().unwrap().page_id()]);
        db.commit(tx)?;

        let tx = db.begin();
        let mut iter = file.iterator(Arc::clone(db.buffer_pool()), tx);
        iter.open();
        let firsts = iter
            .map(|tuple| tuple.map(|t| t.field(0).unwrap().cloned()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(firsts, vec![Some(Value::Integer(0)), Some(Value::Integer(20))]);
        db.commit(tx)?;
        Ok(())
    }
}
