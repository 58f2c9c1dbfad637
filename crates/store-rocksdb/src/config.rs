//! RocksDB store configuration

use std::path::PathBuf;

/// Default number of keys read per listing page
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Configuration for the RocksDB route store
#[derive(Debug, Clone)]
pub struct RocksDbStoreOptions {
    /// Path to the RocksDB database directory
    pub path: PathBuf,

    /// Keys read per listing page
    pub page_size: usize,
}

impl RocksDbStoreOptions {
    /// Create a new configuration with the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}
