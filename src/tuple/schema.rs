use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::common::STRING_LEN;
use crate::error::{Result, StorageError};

const U32_SIZE: usize = std::mem::size_of::<u32>();

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeId {
    Integer,
    Text,
}

impl TypeId {
    /// Returns how many bytes a serialized value of this type occupies.
    /// Every type has a fixed width.
    pub fn width(&self) -> usize {
        match self {
            TypeId::Integer => std::mem::size_of::<i32>(),
            TypeId::Text => U32_SIZE + STRING_LEN,
        }
    }
}

impl FromStr for TypeId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(TypeId::Integer),
            "string" | "text" => Ok(TypeId::Text),
            _ => Err(StorageError::InvalidCatalog(format!("Invalid type {}", s))),
        }
    }
}

impl Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug)]
pub struct FieldDefinition {
    type_id: TypeId,
    name: Option<String>,
}

impl FieldDefinition {
    pub fn new(type_id: TypeId, name: impl Into<String>) -> Self {
        Self {
            type_id,
            name: Some(name.into()),
        }
    }

    /// creates a field definition where only the type is known
    pub fn with_type_id(type_id: TypeId) -> Self {
        Self {
            type_id,
            name: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Describes the ordered, typed fields of a tuple.
///
/// Two schemas are equal if they have the same types in the same order,
/// field names are not compared.
#[derive(Clone, Debug)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn from_types(types: &[TypeId]) -> Self {
        Self::new(types.iter().copied().map(FieldDefinition::with_type_id).collect())
    }

    /// Pairs up types and names. Surplus entries of the longer slice are ignored.
    pub fn with_names(types: &[TypeId], names: &[&str]) -> Self {
        Self::new(
            types
                .iter()
                .zip(names)
                .map(|(type_id, name)| FieldDefinition::new(*type_id, *name))
                .collect(),
        )
    }

    /// Concatenates the fields of `first` and `second` into a new schema.
    pub fn merge(first: &Schema, second: &Schema) -> Schema {
        let mut fields = Vec::with_capacity(first.num_fields() + second.num_fields());
        fields.extend_from_slice(&first.fields);
        fields.extend_from_slice(&second.fields);
        Schema::new(fields)
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Result<&FieldDefinition> {
        self.fields
            .get(index)
            .ok_or(StorageError::FieldIndexOutOfRange {
                index,
                num_fields: self.fields.len(),
            })
    }

    pub fn field_name(&self, index: usize) -> Result<Option<&str>> {
        self.field(index).map(|field| field.name())
    }

    pub fn field_type(&self, index: usize) -> Result<TypeId> {
        self.field(index).map(|field| field.type_id())
    }

    /// Returns the index of the first field with the given name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|field| field.name() == Some(name))
            .ok_or_else(|| StorageError::UnknownField(name.to_owned()))
    }

    /// Size in bytes of a tuple with this schema.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|field| field.type_id().width()).sum()
    }

    /// Qualifies every field name with an alias, e.g. `t.id`.
    /// If either the alias or a field name is missing, the field is named `null.null`.
    pub fn with_alias(&self, alias: Option<&str>) -> Schema {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let name = match (alias, field.name()) {
                    (Some(alias), Some(name)) => format!("{}.{}", alias, name),
                    _ => "null.null".to_owned(),
                };
                FieldDefinition::new(field.type_id(), name)
            })
            .collect();
        Schema::new(fields)
    }

    pub(crate) fn ensure_not_empty(&self) -> Result<()> {
        if self.fields.is_empty() {
            Err(StorageError::EmptySchema)
        } else {
            Ok(())
        }
    }

    pub(crate) fn ensure_same_types(&self, other: &Schema) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(StorageError::SchemaMismatch {
                expected: self.to_string(),
                actual: other.to_string(),
            })
        }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.type_id() == b.type_id())
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for field in &self.fields {
            field.type_id().hash(state);
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", field.type_id(), field.name().unwrap_or("null"))?;
        }
        Ok(())
    }
}
