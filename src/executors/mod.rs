use crate::error::Result;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

pub mod seq_scan_executor;

/// The pull-based protocol every operator above the storage layer follows.
pub trait Executor {
    fn open(&mut self) -> Result<()>;
    /// Returns false if the executor is not open.
    fn has_next(&mut self) -> Result<bool>;
    fn next(&mut self) -> Result<Tuple>;
    /// Restarts from the first tuple. Fails if the executor was never opened.
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);
    /// Schema of the tuples this executor produces.
    fn schema(&self) -> Result<Schema>;
}
