use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::{Storage, StorageError, StorageOptions, StorageResult};

/// Suffix of in-flight writes; such files are never listed
const PARTIAL_SUFFIX: &str = "partial";

/// A directory-backed storage.
///
/// Each key maps to one file below the base directory, one path segment
/// per `/`-separated key segment. Writes land in a sibling `.partial` file
/// that is renamed over the target, so readers never see half a record.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    options: StorageOptions,
    cache: RwLock<HashMap<String, Vec<u8>>>,
}

impl FileStorage {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file storage");

        Ok(Self {
            root,
            options: StorageOptions::default(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_options(mut self, options: StorageOptions) -> Self {
        self.options = options;
        self
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key.split('/').filter(|segment| !segment.is_empty()));
        path
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    async fn remember(&self, key: &str, data: &[u8]) {
        if self.options.use_cache {
            self.cache.write().await.insert(key.to_owned(), data.to_vec());
        }
    }

    async fn cached(&self, key: &str) -> Option<Vec<u8>> {
        if !self.options.use_cache {
            return None;
        }
        self.cache.read().await.get(key).cloned()
    }

    /// Every stored file below `dir`, as keys
    async fn walk(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![dir.to_path_buf()];

        while let Some(next) = stack.pop() {
            let mut entries = fs::read_dir(&next).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                    continue;
                }
                let partial = path.extension().map_or(false, |ext| ext == PARTIAL_SUFFIX);
                if !partial {
                    keys.extend(self.key_for(&path));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let staging = target.with_extension(PARTIAL_SUFFIX);
        {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(data).await?;
            if self.options.sync_write {
                file.sync_all().await?;
            }
        }
        fs::rename(&staging, &target).await?;

        self.remember(key, data).await;
        trace!(key, bytes = data.len(), "Wrote value");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        if let Some(data) = self.cached(key).await {
            return Ok(data);
        }

        let path = self.path_for(key);
        if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            return Err(StorageError::KeyNotFound(key.to_owned()));
        }
        let data = fs::read(&path).await?;
        self.remember(key, &data).await;
        Ok(data)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => trace!(key, "Deleted value"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if self.options.use_cache {
            self.cache.write().await.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        if self.cached(key).await.is_some() {
            return Ok(true);
        }
        Ok(fs::metadata(self.path_for(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = self.path_for(prefix);
        match fs::metadata(&dir).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
            Ok(meta) if !meta.is_dir() => Err(StorageError::NotADirectory(prefix.to_owned())),
            Ok(_) => self.walk(&dir).await,
        }
    }

    fn base_path(&self) -> Option<PathBuf> {
        Some(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nested_keys_map_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();

        storage.put("governance/proposals/0", b"zero").await.unwrap();
        storage.put("governance/proposals/1", b"one").await.unwrap();
        storage.put("governance/events/0", b"created").await.unwrap();

        assert_eq!(storage.get("governance/proposals/1").await.unwrap(), b"one");
        assert!(dir.path().join("governance").join("proposals").join("0").is_file());
        assert_eq!(
            storage.list("governance/proposals").await.unwrap(),
            vec!["governance/proposals/0".to_string(), "governance/proposals/1".to_string()]
        );
        assert_eq!(storage.list("governance").await.unwrap().len(), 3);
        assert_eq!(storage.base_path(), Some(dir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_uncached_reopen_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        FileStorage::new(dir.path())
            .await
            .unwrap()
            .put("a/b", b"persisted")
            .await
            .unwrap();

        let storage = FileStorage::new(dir.path())
            .await
            .unwrap()
            .with_options(StorageOptions { sync_write: false, use_cache: false });
        assert_eq!(storage.get("a/b").await.unwrap(), b"persisted");
        assert!(storage.exists("a/b").await.unwrap());
        assert!(storage.get("a/c").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_edge_cases() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        assert!(storage.list("nothing/here").await.unwrap().is_empty());

        storage.put("leaf", b"x").await.unwrap();
        assert!(matches!(storage.list("leaf").await, Err(StorageError::NotADirectory(_))));

        std::fs::write(dir.path().join("stray.partial"), b"half").unwrap();
        assert_eq!(storage.list("").await.unwrap(), vec!["leaf".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).await.unwrap();
        storage.put("k", b"v").await.unwrap();
        storage.delete("k").await.unwrap();
        storage.delete("k").await.unwrap();
        assert!(!storage.exists("k").await.unwrap());
    }
}
