use std::path::PathBuf;

use thiserror::Error;

use crate::common::{PageId, PageNo, TableId, TransactionId};
use crate::tuple::schema::TypeId;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {page_id} is corrupt: {reason}")]
    CorruptPage { page_id: PageId, reason: String },

    #[error("Slot {slot} on page {page_id} is not occupied")]
    SlotNotOccupied { page_id: PageId, slot: usize },

    #[error("Slot {slot} on page {page_id} is out of range (page has {num_slots} slots)")]
    SlotOutOfRange {
        page_id: PageId,
        slot: usize,
        num_slots: usize,
    },

    #[error("Page {0} has no free slot")]
    PageFull(PageId),

    #[error("Page {page_id} cannot be written, table has only {num_pages} pages")]
    PageOutOfRange { page_id: PageId, num_pages: PageNo },

    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(PageId),

    #[error("Buffer pool is full: all {capacity} pages are dirty or locked by other transactions")]
    BufferPoolFull { capacity: usize },

    #[error("Transaction {tx} timed out waiting for a lock on page {page_id} and was aborted")]
    LockTimeout { tx: TransactionId, page_id: PageId },

    #[error("Transaction {tx} would deadlock waiting for page {page_id} and was aborted")]
    DeadlockDetected { tx: TransactionId, page_id: PageId },

    #[error("Transaction {0} was aborted")]
    TransactionAborted(TransactionId),

    #[error("Transaction {0} is not active")]
    TransactionNotActive(TransactionId),

    #[error("Transaction {tx} does not hold an exclusive lock on page {page_id}")]
    InsufficientLock { tx: TransactionId, page_id: PageId },

    #[error("Iterator has not been opened")]
    IteratorNotOpen,

    #[error("There is no next tuple")]
    NoSuchElement,

    #[error("No table with id {0}")]
    UnknownTable(TableId),

    #[error("No table named {0}")]
    UnknownTableName(String),

    #[error("Table id {table_id} of {path} is already used by {existing}")]
    TableIdCollision {
        table_id: TableId,
        path: PathBuf,
        existing: PathBuf,
    },

    #[error("A schema needs at least one field")]
    EmptySchema,

    #[error("Schema mismatch: expected [{expected}], got [{actual}]")]
    SchemaMismatch { expected: String, actual: String },

    #[error("Field index {index} is out of range for a schema with {num_fields} fields")]
    FieldIndexOutOfRange { index: usize, num_fields: usize },

    #[error("Field {index} expects a value of type {expected}, got {actual}")]
    TypeMismatch {
        index: usize,
        expected: TypeId,
        actual: TypeId,
    },

    #[error("Field {0} has not been set")]
    UnsetField(usize),

    #[error("No field named {0}")]
    UnknownField(String),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Invalid value {value:?} for type {type_id}")]
    InvalidValue { value: String, type_id: TypeId },

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Returns true if the transaction that caused this error has already been
    /// rolled back by the buffer pool. The caller may retry it from scratch.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::DeadlockDetected { .. } | Self::TransactionAborted(_)
        )
    }

    pub(crate) fn corrupt_page(page_id: PageId, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_id,
            reason: reason.into(),
        }
    }
}
