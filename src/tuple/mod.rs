use std::fmt::Display;
use std::sync::Arc;

use self::schema::Schema;
use self::value::Value;
use crate::error::{Result, StorageError};
use crate::storage::common::{Deserializer, Serializer};
use crate::storage::RecordId;

pub mod schema;
pub mod value;

/// A row of values conforming to a schema.
///
/// Tuples start out with every field unset and are filled in by index.
/// The record id is assigned by the storage layer once the tuple lives on a page.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![None; schema.num_fields()];
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Creates a tuple with every field set.
    pub fn from_values(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.num_fields() {
            return Err(StorageError::SchemaMismatch {
                expected: schema.to_string(),
                actual: format!("{} values", values.len()),
            });
        }
        let mut tuple = Tuple::new(schema);
        for (i, value) in values.into_iter().enumerate() {
            tuple.set_field(i, value)?;
        }
        Ok(tuple)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Replaces the schema with one of identical types, e.g. to rename fields.
    pub fn reset_schema(&mut self, schema: Arc<Schema>) -> Result<()> {
        self.schema.ensure_same_types(&schema)?;
        self.schema = schema;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn set_field(&mut self, index: usize, value: Value) -> Result<()> {
        let expected = self.schema.field_type(index)?;
        if value.type_id() != expected {
            return Err(StorageError::TypeMismatch {
                index,
                expected,
                actual: value.type_id(),
            });
        }
        if !value.fits() {
            return Err(StorageError::InvalidValue {
                value: value.to_string(),
                type_id: expected,
            });
        }
        self.values[index] = Some(value);
        Ok(())
    }

    /// Returns the value of a field, `None` if it hasn't been set yet.
    pub fn field(&self, index: usize) -> Result<Option<&Value>> {
        self.values
            .get(index)
            .map(Option::as_ref)
            .ok_or(StorageError::FieldIndexOutOfRange {
                index,
                num_fields: self.values.len(),
            })
    }

    pub fn values(&self) -> impl Iterator<Item = Option<&Value>> {
        self.values.iter().map(Option::as_ref)
    }

    /// Writes the fields in schema order at their fixed widths.
    /// Returns how many bytes were written.
    pub(crate) fn serialize(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut serializer = Serializer::new(buffer);
        for (i, value) in self.values.iter().enumerate() {
            let value = value.as_ref().ok_or(StorageError::UnsetField(i))?;
            value.serialize_value(&mut serializer);
        }
        Ok(serializer.end())
    }

    /// Parses a complete tuple. Returns `None` if any field fails to decode.
    pub(crate) fn parse(schema: &Arc<Schema>, bytes: &[u8]) -> Option<Self> {
        let mut deserializer = Deserializer::new(bytes);
        let values = schema
            .fields()
            .iter()
            .map(|field| Value::parse_value(&mut deserializer, field.type_id()).map(Some))
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            schema: Arc::clone(schema),
            values,
            record_id: None,
        })
    }
}

impl Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            match value {
                Some(value) => write!(f, "{}", value)?,
                None => write!(f, "null")?,
            }
        }
        Ok(())
    }
}
