use std::fmt::Display;

use super::schema::TypeId;
use crate::common::STRING_LEN;
use crate::error::{Result, StorageError};
use crate::storage::common::{Deserializer, Serializer};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Integer(i32),
    Text(String),
}

impl Value {
    /// Creates a text value, truncated to at most `STRING_LEN` bytes.
    pub fn text(val: impl Into<String>) -> Self {
        let mut val = val.into();
        let len = fitting_len(&val);
        val.truncate(len);
        Value::Text(val)
    }

    /// Returns true if the value can be stored without losing bytes.
    pub fn fits(&self) -> bool {
        match self {
            Value::Integer(_) => true,
            Value::Text(val) => val.len() <= STRING_LEN,
        }
    }

    pub fn type_id(&self) -> TypeId {
        match self {
            Value::Integer(_) => TypeId::Integer,
            Value::Text(_) => TypeId::Text,
        }
    }

    /// Parses a value from its textual representation, e.g. a row of an input file.
    pub fn parse_str(s: &str, type_id: TypeId) -> Result<Self> {
        match type_id {
            TypeId::Integer => s
                .trim()
                .parse()
                .map(Value::Integer)
                .map_err(|_| StorageError::InvalidValue {
                    value: s.to_owned(),
                    type_id,
                }),
            TypeId::Text => Ok(Value::text(s)),
        }
    }

    /// parses a value from bytes. Returns `None` if the bytes are no valid value of this type.
    pub(crate) fn parse_value(deserializer: &mut Deserializer, type_id: TypeId) -> Option<Self> {
        match type_id {
            TypeId::Integer => deserializer.deserialize_i32().map(Value::Integer),
            TypeId::Text => {
                let len = deserializer.deserialize_u32()? as usize;
                if len > STRING_LEN {
                    return None;
                }
                let bytes = deserializer.bytes(len)?;
                let val = std::str::from_utf8(bytes).ok()?.to_owned();
                deserializer.skip(STRING_LEN - len)?;
                Some(Value::Text(val))
            }
        }
    }

    /// Writes exactly `self.type_id().width()` bytes.
    pub(crate) fn serialize_value(&self, serializer: &mut Serializer) {
        match self {
            Value::Integer(val) => serializer.serialize_i32(*val),
            Value::Text(val) => {
                let bytes = &val.as_bytes()[..fitting_len(val)];
                serializer.serialize_u32(bytes.len() as u32);
                serializer.copy_bytes(bytes);
                serializer.pad(STRING_LEN - bytes.len());
            }
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(val) => Some(val),
            _ => None,
        }
    }
}

/// Length of the longest prefix of `val` that is at most `STRING_LEN` bytes
/// and ends on a char boundary.
fn fitting_len(val: &str) -> usize {
    if val.len() <= STRING_LEN {
        return val.len();
    }
    let mut end = STRING_LEN;
    while !val.is_char_boundary(end) {
        end -= 1;
    }
    end
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::Integer(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::text(val)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(val) => write!(f, "{}", val),
            Value::Text(val) => write!(f, "{}", val),
        }
    }
}
