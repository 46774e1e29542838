use std::sync::Arc;

use super::Executor;
use crate::buffer::buffer_pool::BufferPool;
use crate::common::{TableId, TransactionId};
use crate::error::{Result, StorageError};
use crate::storage::heap::file::HeapFileIterator;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// Scans every tuple of a table, renaming its fields to `alias.field`.
///
/// The table is resolved through the catalog when the scan is opened.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    transaction: TransactionId,
    table_id: TableId,
    alias: Option<String>,
    table_iter: Option<HeapFileIterator>,
    output_schema: Option<Arc<Schema>>,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        transaction: TransactionId,
        table_id: TableId,
        alias: Option<&str>,
    ) -> Self {
        Self {
            pool,
            transaction,
            table_id,
            alias: alias.map(str::to_owned),
            table_iter: None,
            output_schema: None,
        }
    }

    /// Creates a scan that uses the table name as alias.
    pub fn with_table_name(
        pool: Arc<BufferPool>,
        transaction: TransactionId,
        table_id: TableId,
    ) -> Result<Self> {
        let table_name = pool.catalog().table_name(table_id)?;
        Ok(Self::new(pool, transaction, table_id, Some(&table_name)))
    }

    pub fn table_name(&self) -> Result<String> {
        self.pool.catalog().table_name(self.table_id)
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Points the scan at another table. It has to be opened again.
    pub fn reset(&mut self, table_id: TableId, alias: Option<&str>) {
        self.table_id = table_id;
        self.alias = alias.map(str::to_owned);
        self.table_iter = None;
        self.output_schema = None;
    }

    fn qualified_schema(&self) -> Result<Schema> {
        let schema = self.pool.catalog().schema(self.table_id)?;
        Ok(schema.with_alias(self.alias()))
    }
}

impl Executor for SeqScan {
    fn open(&mut self) -> Result<()> {
        let (file, _) = self.pool.catalog().lookup_table(self.table_id)?;
        let mut table_iter = file.iterator(Arc::clone(&self.pool), self.transaction);
        table_iter.open();
        self.output_schema = Some(Arc::new(self.qualified_schema()?));
        self.table_iter = Some(table_iter);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        match &mut self.table_iter {
            Some(table_iter) if table_iter.is_open() => table_iter.has_next(),
            _ => Ok(false),
        }
    }

    fn next(&mut self) -> Result<Tuple> {
        let (Some(table_iter), Some(output_schema)) = (&mut self.table_iter, &self.output_schema)
        else {
            return Err(StorageError::IteratorNotOpen);
        };
        let mut tuple = table_iter.next_tuple()?;
        tuple.reset_schema(Arc::clone(output_schema))?;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.table_iter
            .as_mut()
            .ok_or(StorageError::IteratorNotOpen)?
            .rewind()
    }

    fn close(&mut self) {
        if let Some(table_iter) = &mut self.table_iter {
            table_iter.close();
        }
    }

    fn schema(&self) -> Result<Schema> {
        match &self.output_schema {
            Some(schema) => Ok(Schema::clone(schema)),
            None => self.qualified_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use lazy_static::lazy_static;
    use tempfile::{tempdir, TempDir};

    use super::SeqScan;
    use crate::common::TableId;
    use crate::config::StorageConfig;
    use crate::database::Database;
    use crate::error::StorageError;
    use crate::executors::Executor;
    use crate::tuple::schema::{Schema, TypeId};
    use crate::tuple::value::Value;
    use crate::tuple::Tuple;

    lazy_static! {
        static ref ACCOUNTS: Schema =
            Schema::with_names(&[TypeId::Integer, TypeId::Text], &["id", "name"]);
    }

    fn accounts_db(rows: &[(i32, &str)]) -> Result<(TempDir, Database, TableId)> {
        let data_dir = tempdir()?;
        let db = Database::new(StorageConfig::default());
        let table_id = db.create_table(
            data_dir.path().join("accounts.dat"),
            "accounts",
            ACCOUNTS.clone(),
        )?;
        let schema = db.catalog().schema(table_id)?;

        let tx = db.begin();
        for (id, name) in rows {
            let values = vec![Value::Integer(*id), Value::from(*name)];
            let tuple = Tuple::from_values(Arc::clone(&schema), values)?;
            db.insert_tuple(tx, table_id, tuple)?;
        }
        db.commit(tx)?;
        Ok((data_dir, db, table_id))
    }

    fn collect(scan: &mut SeqScan) -> Result<Vec<Tuple>> {
        let mut tuples = vec![];
        while scan.has_next()? {
            tuples.push(scan.next()?);
        }
        Ok(tuples)
    }

    #[test]
    fn fields_are_qualified_with_alias() -> Result<()> {
        let (_data_dir, db, table_id) = accounts_db(&[(1, "alice"), (2, "bob")])?;
        let tx = db.begin();

        let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), tx, table_id, Some("a"));
        assert_eq!(scan.alias(), Some("a"));
        assert_eq!(scan.table_name()?, "accounts");
        let schema = scan.schema()?;
        assert_eq!(schema.field_name(0)?, Some("a.id"));
        assert_eq!(schema.field_name(1)?, Some("a.name"));

        scan.open()?;
        let tuples = collect(&mut scan)?;
        assert_eq!(tuples.len(), 2);
        assert_eq!(tuples[1].field(1)?, Some(&Value::from("bob")));
        assert_eq!(tuples[0].schema().index_of("a.id")?, 0);
        assert!(tuples[0].record_id().is_some());
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement)));

        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn missing_alias_yields_null_names() -> Result<()> {
        let (_data_dir, db, table_id) = accounts_db(&[(1, "alice")])?;
        let tx = db.begin();
        let scan = SeqScan::new(Arc::clone(db.buffer_pool()), tx, table_id, None);
        assert_eq!(scan.schema()?.field_name(0)?, Some("null.null"));
        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn table_name_is_default_alias() -> Result<()> {
        let (_data_dir, db, table_id) = accounts_db(&[])?;
        let tx = db.begin();
        let scan = SeqScan::with_table_name(Arc::clone(db.buffer_pool()), tx, table_id)?;
        assert_eq!(scan.alias(), Some("accounts"));
        assert_eq!(scan.schema()?.field_name(1)?, Some("accounts.name"));
        assert!(matches!(
            SeqScan::with_table_name(Arc::clone(db.buffer_pool()), tx, table_id + 1),
            Err(StorageError::UnknownTable(_))
        ));
        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn open_fails_for_unknown_table() -> Result<()> {
        let (_data_dir, db, table_id) = accounts_db(&[])?;
        let tx = db.begin();
        let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), tx, table_id + 1, Some("x"));
        assert!(matches!(scan.open(), Err(StorageError::UnknownTable(_))));
        assert!(!scan.has_next()?);
        assert!(matches!(scan.next(), Err(StorageError::IteratorNotOpen)));
        db.commit(tx)?;
        Ok(())
    }

    #[test]
    fn rewind_and_reset() -> Result<()> {
        let (_data_dir, db, table_id) = accounts_db(&[(1, "alice"), (2, "bob"), (3, "carol")])?;
        let other_dir = tempdir()?;
        let other_id = db.create_table(
            other_dir.path().join("ints.dat"),
            "ints",
            Schema::with_names(&[TypeId::Integer], &["v"]),
        )?;

        let tx = db.begin();
        let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), tx, table_id, Some("a"));
        assert!(matches!(scan.rewind(), Err(StorageError::IteratorNotOpen)));

        scan.open()?;
        let first = collect(&mut scan)?;
        scan.rewind()?;
        assert_eq!(collect(&mut scan)?, first);

        scan.close();
        assert!(!scan.has_next()?);

        scan.reset(other_id, Some("i"));
        assert!(matches!(scan.rewind(), Err(StorageError::IteratorNotOpen)));
        assert_eq!(scan.schema()?.field_name(0)?, Some("i.v"));
        scan.open()?;
        assert!(collect(&mut scan)?.is_empty());
        db.commit(tx)?;
        Ok(())
    }
}
