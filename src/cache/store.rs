//! Backing store abstraction for the cache manager

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Key-value store with per-entry TTL
///
/// Keys arrive already namespaced. A zero `ttl` stores the entry without
/// expiry. Expired entries must read as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch a live entry
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or overwrite an entry
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Remove an entry, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove several entries, returning how many existed
    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}
