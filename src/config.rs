use std::time::Duration;

use crate::common::{DEFAULT_LOCK_TIMEOUT, DEFAULT_PAGE_SIZE, DEFAULT_POOL_SIZE};
use crate::error::{Result, StorageError};

/// Process-wide storage settings.
///
/// The page size is not stored in heap files. Opening a file with a different
/// page size than it was written with yields corrupt or misaligned pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    pub page_size: usize,
    pub pool_size: usize,
    pub lock_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StorageConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Rejects settings the storage layer cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure_page_size(self.page_size)?;
        if self.pool_size == 0 {
            return Err(StorageError::InvalidConfig(
                "the buffer pool needs at least one frame".to_owned(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn ensure_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(StorageError::InvalidConfig(
            "page size must be positive".to_owned(),
        ));
    }
    Ok(())
}
