use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError, StorageResult};

/// In-memory storage, the default backend for the governance engine.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.entries.write().await.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(key.to_owned()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let entries = self.entries.read().await;
        let range = (Bound::Included(prefix.to_owned()), Bound::Unbounded);
        Ok(entries
            .range::<String, _>(range)
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn base_path(&self) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JsonStorage;
    use serde::{Deserialize, Serialize};

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty().await);

        storage.put("governance/proposals/0", b"first").await.unwrap();
        storage.put("governance/proposals/0", b"second").await.unwrap();
        assert_eq!(storage.get("governance/proposals/0").await.unwrap(), b"second");
        assert!(storage.exists("governance/proposals/0").await.unwrap());

        storage.delete("governance/proposals/0").await.unwrap();
        storage.delete("governance/proposals/0").await.unwrap();
        assert!(storage.get("governance/proposals/0").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let storage = MemoryStorage::new();
        for key in ["governance/events/1", "governance/proposals/1", "governance/events/0", "other"] {
            storage.put(key, b"x").await.unwrap();
        }

        assert_eq!(
            storage.list("governance/events/").await.unwrap(),
            vec!["governance/events/0".to_string(), "governance/events/1".to_string()]
        );
        assert_eq!(storage.list("governance/").await.unwrap().len(), 3);
        assert!(storage.list("missing/").await.unwrap().is_empty());
        assert_eq!(storage.len().await, 4);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let storage = MemoryStorage::new();
        let view = storage.clone();
        storage.put("k", b"v").await.unwrap();
        assert_eq!(view.get("k").await.unwrap(), b"v");
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        sequence: u64,
        label: String,
    }

    #[tokio::test]
    async fn test_json_values() {
        let storage = MemoryStorage::new();
        let record = Record { sequence: 7, label: "VoteCast".into() };

        storage.put_json("governance/events/7", &record).await.unwrap();
        let back: Record = storage.get_json("governance/events/7").await.unwrap();
        assert_eq!(back, record);

        storage.put("garbage", b"{not json").await.unwrap();
        let result: StorageResult<Record> = storage.get_json("garbage").await;
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
