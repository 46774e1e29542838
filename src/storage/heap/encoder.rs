use std::fs::File;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use log::info;

use super::file::HeapFile;
use super::page::HeapPage;
use crate::common::{PageId, PageNo};
use crate::config::ensure_page_size;
use crate::error::{Result, StorageError};
use crate::tuple::schema::Schema;
use crate::tuple::value::Value;
use crate::tuple::Tuple;

/// Writes comma separated text rows into a new heap file, replacing any
/// existing file at `output`. Pages are filled in order, empty lines are
/// skipped. Returns the number of tuples written.
pub fn encode_rows(
    input: impl BufRead,
    output: impl AsRef<Path>,
    schema: Schema,
    page_size: usize,
) -> Result<usize> {
    ensure_page_size(page_size)?;
    File::create(output.as_ref())?;
    let file = HeapFile::open(output.as_ref(), schema, page_size)?;
    let schema = Arc::clone(file.schema());

    let mut page_no: PageNo = 0;
    let mut page = HeapPage::empty(PageId::new(file.id(), page_no), Arc::clone(&schema), page_size);
    if page.num_slots() == 0 {
        return Err(StorageError::PageFull(page.page_id()));
    }

    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tuple = parse_row(&schema, &line)?;

        if page.empty_slot_count() == 0 {
            file.write_page(&page)?;
            page_no += 1;
            page = HeapPage::empty(PageId::new(file.id(), page_no), Arc::clone(&schema), page_size);
        }
        page.insert_tuple(tuple)?;
        count += 1;
    }
    if count > 0 {
        file.write_page(&page)?;
    }

    info!("Wrote {} tuples to {}", count, file.path().display());
    Ok(count)
}

fn parse_row(schema: &Arc<Schema>, line: &str) -> Result<Tuple> {
    let raw = line.split(',').map(str::trim).collect::<Vec<_>>();
    if raw.len() != schema.num_fields() {
        return Err(StorageError::SchemaMismatch {
            expected: schema.to_string(),
            actual: format!("{} values in row {:?}", raw.len(), line),
        });
    }
    let values = raw
        .iter()
        .zip(schema.fields())
        .map(|(value, field)| Value::parse_str(value, field.type_id()))
        .collect::<Result<Vec<_>>>()?;
    Tuple::from_values(Arc::clone(schema), values)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use anyhow::Result;
    use rand::Rng;
    use tempfile::tempdir;

    use super::encode_rows;
    use crate::common::PageId;
    use crate::error::StorageError;
    use crate::storage::heap::file::HeapFile;
    use crate::tuple::schema::{Schema, TypeId};
    use crate::tuple::value::Value;

    #[test]
    fn rows_fill_pages_in_order() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let schema = Schema::from_types(&[TypeId::Integer; 5]);

        let mut rng = rand::thread_rng();
        let rows = (0..500)
            .map(|_| {
                (0..5)
                    .map(|_| rng.gen_range(-1000..1000).to_string())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let text = rows
            .iter()
            .map(|row| row.join(", "))
            .collect::<Vec<_>>()
            .join("\n");

        let count = encode_rows(Cursor::new(text), &path, schema.clone(), 4096)?;
        assert_eq!(count, 500);

        let file = HeapFile::open(&path, schema, 4096)?;
        // 203 tuples per page
        assert_eq!(file.num_pages()?, 3);
        let first = file.read_page(PageId::new(file.id(), 0))?;
        assert_eq!(first.empty_slot_count(), 0);
        let last = file.read_page(PageId::new(file.id(), 2))?;
        assert_eq!(last.iter_tuples().count(), 500 - 2 * 203);

        let tuple = first.iter_tuples().next().unwrap();
        let expected = rows[0]
            .iter()
            .map(|value| Some(Value::Integer(value.parse().unwrap())))
            .collect::<Vec<_>>();
        assert_eq!(tuple.values().map(|v| v.cloned()).collect::<Vec<_>>(), expected);
        Ok(())
    }

    #[test]
    fn text_rows_are_encoded() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let schema = Schema::from_types(&[TypeId::Integer, TypeId::Text]);

        encode_rows(Cursor::new("1, alice\n\n2,bob\n"), &path, schema.clone(), 4096)?;
        let file = Arc::new(HeapFile::open(&path, schema, 4096)?);
        let page = file.read_page(PageId::new(file.id(), 0))?;
        let names = page
            .iter_tuples()
            .map(|tuple| tuple.field(1).unwrap().cloned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec![Some(Value::from("alice")), Some(Value::from("bob"))]);
        Ok(())
    }

    #[test]
    fn malformed_rows_are_rejected() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let schema = Schema::from_types(&[TypeId::Integer, TypeId::Integer]);

        assert!(matches!(
            encode_rows(Cursor::new("1,2,3"), &path, schema.clone(), 4096),
            Err(StorageError::SchemaMismatch { .. })
        ));
        assert!(matches!(
            encode_rows(Cursor::new("1,x"), &path, schema, 4096),
            Err(StorageError::InvalidValue { .. })
        ));
        Ok(())
    }

    #[test]
    fn zero_page_size_is_rejected() -> Result<()> {
        let data_dir = tempdir()?;
        let path = data_dir.path().join("t.dat");
        let schema = Schema::from_types(&[TypeId::Integer]);
        assert!(matches!(
            encode_rows(Cursor::new("1\n2\n"), &path, schema, 0),
            Err(StorageError::InvalidConfig(_))
        ));
        assert!(!path.exists());
        Ok(())
    }
}
