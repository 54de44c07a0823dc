//! Filesystem cache backend
//!
//! One JSON document per key. File names are the SHA-256 hex digest of the
//! key so arbitrary keys map to safe names.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::store::CacheStore;
use crate::Result;

const EXTENSION: &str = "json";

/// Suffix counter keeping concurrent writes to separate temp files
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Store that persists entries as files under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    key: String,
    value: Value,
    /// Unix milliseconds, `None` never expires
    expires_at: Option<u64>,
}

impl FileEntry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl FileStore {
    /// Open a store rooted at `directory`, creating it when missing
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        debug!(directory = %directory.display(), "Opened file cache");
        Ok(Self { directory })
    }

    /// Directory holding the cache files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.directory
            .join(format!("{}.{EXTENSION}", hex::encode(digest)))
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("{}.{seq}.tmp", std::process::id()))
    }

    async fn remove_file(path: &Path) -> Result<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: FileEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding corrupt cache file");
                Self::remove_file(&path).await?;
                return Ok(None);
            }
        };

        if entry.key != key {
            return Ok(None);
        }
        if entry.is_expired(unix_millis(SystemTime::now())) {
            Self::remove_file(&path).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(unix_millis(SystemTime::now()).saturating_add(
                u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            ))
        };
        let entry = FileEntry {
            key: key.to_string(),
            value,
            expires_at,
        };
        let bytes = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let tmp = Self::temp_path_for(&path);
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Self::remove_file(&self.path_for(key)).await
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = match tokio::fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                Self::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store
            .set("podcast:article:42", json!({"title": "Rust"}), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            store.get("podcast:article:42").await.unwrap(),
            Some(json!({"title": "Rust"}))
        );
        assert_eq!(store.get("podcast:article:43").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_name_is_key_digest() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.set("a/b/../c", json!(1), Duration::ZERO).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].len(), 64 + 1 + EXTENSION.len());
        assert!(names[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn test_expiry_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.set("k", json!("v"), Duration::from_millis(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path()).await.unwrap();
            store.set("k", json!([1, 2, 3]), Duration::ZERO).await.unwrap();
        }
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        std::fs::write(store.path_for("k"), b"not json").unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_of_one_key() {
        let dir = TempDir::new().unwrap();
        let store = std::sync::Arc::new(FileStore::open(dir.path()).await.unwrap());

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .set("podcast:article:1", json!({ "revision": i }), Duration::ZERO)
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let value = store.get("podcast:article:1").await.unwrap().unwrap();
        assert!(value["revision"].as_u64().is_some_and(|r| r < 100));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.set("a", json!(1), Duration::ZERO).await.unwrap();
        store.set("b", json!(2), Duration::ZERO).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        store.clear().await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
