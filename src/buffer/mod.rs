pub mod buffer_pool;
mod clock_replacer;

/// Position of a frame in the buffer pool.
pub type PoolPos = usize;
