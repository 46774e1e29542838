use std::fs;
use std::path::Path;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;

use crate::common::TableId;
use crate::error::{Result, StorageError};
use crate::storage::heap::file::HeapFile;
use crate::tuple::schema::{FieldDefinition, Schema, TypeId};

struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: Option<String>,
}

/// Maps table ids and names to their heap files.
///
/// Adding a table under a name that is already taken replaces the old table.
/// Two different files whose paths hash to the same table id are rejected.
pub struct Catalog {
    tables: DashMap<TableId, TableEntry>,
    table_name_to_id: DashMap<String, TableId>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            table_name_to_id: DashMap::new(),
        }
    }

    pub fn add_table(
        &self,
        file: HeapFile,
        name: &str,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        if let Some(primary_key) = primary_key {
            file.schema().index_of(primary_key)?;
        }

        let table_id = file.id();
        let entry = TableEntry {
            file: Arc::new(file),
            name: name.to_owned(),
            primary_key: primary_key.map(str::to_owned),
        };
        let previous_name = match self.tables.entry(table_id) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get().file.path();
                if existing != entry.file.path() {
                    return Err(StorageError::TableIdCollision {
                        table_id,
                        path: entry.file.path().to_owned(),
                        existing: existing.to_owned(),
                    });
                }
                Some(occupied.insert(entry).name)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                None
            }
        };

        if let Some(previous_name) = previous_name.filter(|previous| previous != name) {
            self.table_name_to_id
                .remove_if(&previous_name, |_, id| *id == table_id);
        }
        if let Some(previous_id) = self.table_name_to_id.insert(name.to_owned(), table_id) {
            if previous_id != table_id {
                self.tables.remove(&previous_id);
            }
        }
        Ok(table_id)
    }

    pub fn lookup_table(&self, table_id: TableId) -> Result<(Arc<HeapFile>, Arc<Schema>)> {
        self.tables
            .get(&table_id)
            .map(|entry| (Arc::clone(&entry.file), Arc::clone(entry.file.schema())))
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.table_name_to_id
            .get(name)
            .map(|id| *id.value())
            .ok_or_else(|| StorageError::UnknownTableName(name.to_owned()))
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<Schema>> {
        self.lookup_table(table_id).map(|(_, schema)| schema)
    }

    pub fn primary_key(&self, table_id: TableId) -> Result<Option<String>> {
        self.tables
            .get(&table_id)
            .map(|entry| entry.primary_key.clone())
            .ok_or(StorageError::UnknownTable(table_id))
    }

    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids = self.tables.iter().map(|entry| *entry.key()).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    pub fn clear(&self) {
        self.tables.clear();
        self.table_name_to_id.clear();
    }

    /// Registers every table of a catalog file.
    ///
    /// Every non-empty line describes one table as `name (field type [pk], ...)`,
    /// where type is `int` or `string`. The data of a table lives in
    /// `<name>.dat` in the directory of the catalog file.
    pub fn load_schema(&self, path: impl AsRef<Path>, page_size: usize) -> Result<Vec<TableId>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let data_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut table_ids = vec![];
        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let definition = parse_table_definition(line)?;
            let data_path = data_dir.join(format!("{}.dat", definition.name));
            let file = HeapFile::open(&data_path, definition.schema, page_size)?;
            let table_id =
                self.add_table(file, &definition.name, definition.primary_key.as_deref())?;
            info!("Loaded table {} from {}", definition.name, data_path.display());
            table_ids.push(table_id);
        }
        Ok(table_ids)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

struct TableDefinition {
    name: String,
    schema: Schema,
    primary_key: Option<String>,
}

fn parse_table_definition(line: &str) -> Result<TableDefinition> {
    let invalid = |reason: &str| StorageError::InvalidCatalog(format!("{}: {}", reason, line));

    let (name, rest) = line
        .split_once('(')
        .ok_or_else(|| invalid("missing field list"))?;
    let fields = rest
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| invalid("unterminated field list"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("missing table name"));
    }

    let mut definitions = vec![];
    let mut primary_key = None;
    for field in fields.split(',') {
        let parts = field.split_whitespace().collect::<Vec<_>>();
        match parts.as_slice() {
            [field_name, type_name] => {
                definitions.push(FieldDefinition::new(type_name.parse::<TypeId>()?, *field_name));
            }
            [field_name, type_name, "pk"] => {
                if primary_key.is_some() {
                    return Err(invalid("more than one primary key"));
                }
                definitions.push(FieldDefinition::new(type_name.parse::<TypeId>()?, *field_name));
                primary_key = Some(field_name.to_string());
            }
            _ => return Err(invalid("malformed field")),
        }
    }

    Ok(TableDefinition {
        name: name.to_owned(),
        schema: Schema::new(definitions),
        primary_key,
    })
}
