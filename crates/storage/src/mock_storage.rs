//! Mock storage implementation for testing
//!
//! Behaves like [`MemoryStorage`](crate::MemoryStorage) until writes are
//! switched off, either for every key or only for keys under a prefix.
//! Rejected writes fail `put` and `delete`. Used to check that callers
//! leave no partial state behind when persistence fails.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{MemoryStorage, Storage, StorageError, StorageResult};

/// A memory-backed storage whose writes can be made to fail
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    inner: MemoryStorage,
    fail_writes: Arc<AtomicBool>,
    failing_prefixes: Arc<Mutex<Vec<String>>>,
    writes: Arc<AtomicUsize>,
}

impl MockStorage {
    /// Create a new MockStorage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes to keys starting with `prefix` fail
    pub fn fail_writes_matching(&self, prefix: impl Into<String>) {
        self.prefixes().push(prefix.into());
    }

    /// Stop failing writes by prefix
    pub fn clear_failing_prefixes(&self) {
        self.prefixes().clear();
    }

    fn prefixes(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.failing_prefixes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self, key: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst)
            || self.prefixes().iter().any(|prefix| key.starts_with(prefix.as_str()))
        {
            return Err(StorageError::WriteRejected(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.check_writable(key)?;
        self.inner.put(key, data).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_writable(key)?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn base_path(&self) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let storage = MockStorage::new();
        storage.put("test_key", b"test_data").await.unwrap();
        assert_eq!(storage.get("test_key").await.unwrap(), b"test_data");
        assert_eq!(storage.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let storage = MockStorage::new();
        storage.put("kept", b"1").await.unwrap();

        storage.set_fail_writes(true);
        assert!(matches!(storage.put("lost", b"2").await, Err(StorageError::WriteRejected(_))));
        assert!(storage.delete("kept").await.is_err());
        assert!(!storage.exists("lost").await.unwrap());
        assert!(storage.exists("kept").await.unwrap());

        storage.set_fail_writes(false);
        storage.put("lost", b"2").await.unwrap();
        assert_eq!(storage.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_writes_by_prefix() {
        let storage = MockStorage::new();
        storage.put("logs/0", b"1").await.unwrap();
        storage.fail_writes_matching("logs/");

        assert!(matches!(storage.put("logs/1", b"2").await, Err(StorageError::WriteRejected(_))));
        assert!(storage.delete("logs/0").await.is_err());
        storage.put("data/0", b"3").await.unwrap();
        storage.delete("data/0").await.unwrap();

        storage.clear_failing_prefixes();
        storage.put("logs/1", b"2").await.unwrap();
        assert_eq!(storage.list("logs/").await.unwrap(), vec!["logs/0", "logs/1"]);
    }
}
