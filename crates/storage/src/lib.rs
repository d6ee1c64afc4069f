//! Storage for tokengate
//!
//! A small key-value abstraction used to persist proposals and the event
//! receipt log. Keys are `/`-separated paths such as
//! `governance/proposals/0`; values are opaque bytes, usually JSON written
//! through [`JsonStorage`].

use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub mod file_storage;
pub mod memory_storage;
pub mod mock_storage;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use mock_storage::MockStorage;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not encode or decode value: {0}")]
    Serialization(String),

    #[error("No value stored under key {0}")]
    KeyNotFound(String),

    #[error("Prefix {0} names a value, not a directory")]
    NotADirectory(String),

    #[error("Write to {0} was rejected")]
    WriteRejected(String),
}

impl StorageError {
    /// Whether the error only reports a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::KeyNotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Tuning knobs for [`FileStorage`]
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// fsync every write before renaming it into place
    pub sync_write: bool,
    /// Keep values read or written in memory
    pub use_cache: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            sync_write: true,
            use_cache: true,
        }
    }
}

/// A byte-oriented key-value backend
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Write `data` under `key`, replacing any earlier value
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Read the value under `key`
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Every key under `prefix`, sorted
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Directory backing the store, if it lives on disk
    fn base_path(&self) -> Option<PathBuf>;
}

/// JSON encoding on top of any [`Storage`]
#[async_trait]
pub trait JsonStorage: Storage {
    async fn put_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.put(key, &bytes).await
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<T> {
        let bytes = self.get(key).await?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl<T: Storage + ?Sized> JsonStorage for T {}
