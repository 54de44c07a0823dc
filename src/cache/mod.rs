//! Read-through caching with hit/miss metrics
//!
//! [`CacheManager`] namespaces keys, serializes values to JSON and delegates
//! storage to a [`CacheStore`] backend. Backend failures are logged and
//! degrade to a miss; they never fail a [`remember`](CacheManager::remember).

mod factory;
mod file;
mod memory;
mod metrics;
mod store;

pub use factory::create_cache;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use store::CacheStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::Result;

/// TTL used by [`CacheManager::remember_default`] and
/// [`CacheManager::set_default`] unless configured otherwise
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cache-aside manager over a pluggable store
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    namespace: String,
    enabled: bool,
    default_ttl: Duration,
    metrics: CacheMetrics,
}

impl CacheManager {
    /// Create an enabled manager over `store`
    ///
    /// An empty `namespace` leaves keys untouched.
    pub fn new(store: Arc<dyn CacheStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            enabled: true,
            default_ttl: DEFAULT_TTL,
            metrics: CacheMetrics::new(),
        }
    }

    /// In-memory manager with default capacity
    #[must_use]
    pub fn in_memory(namespace: &str) -> Self {
        Self::new(Arc::new(MemoryStore::default()), namespace)
    }

    /// Toggle caching; a disabled manager always computes and stores nothing
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// TTL applied by the `*_default` operations
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// TTL applied by the `*_default` operations
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether caching is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Key namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the backing store
    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    fn build_key(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.namespace)
        }
    }

    /// Look up `key`, counting a hit or miss
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache_key = self.build_key(key);
        let found = match self.store.get(&cache_key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        };

        let value = found.and_then(|raw| match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape");
                None
            }
        });

        if value.is_some() {
            self.metrics.record_hit();
            debug!(key = %key, "Cache hit");
        } else {
            self.metrics.record_miss();
            debug!(key = %key, "Cache miss");
        }
        value
    }

    /// Return the cached value for `key`, or compute, store and return it
    ///
    /// A zero `ttl` stores without expiry.
    ///
    /// # Errors
    ///
    /// Only errors from `operation` propagate; nothing is stored for them.
    pub async fn remember<T, F, Fut>(&self, key: &str, ttl: Duration, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.enabled {
            return operation().await;
        }

        if let Some(value) = self.lookup(key).await {
            return Ok(value);
        }

        let value = operation().await?;
        if let Err(e) = self.set(key, &value, ttl).await {
            warn!(key = %key, error = %e, "Failed to save cache");
        }
        Ok(value)
    }

    /// [`remember`](Self::remember) with the manager's default TTL
    ///
    /// # Errors
    ///
    /// Only errors from `operation` propagate.
    pub async fn remember_default<T, F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.remember(key, self.default_ttl, operation).await
    }

    /// Fetch a cached value, counting a hit or miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.enabled {
            return None;
        }
        self.lookup(key).await
    }

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or the store
    /// rejects the write.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let raw = serde_json::to_value(value)?;
        self.store.set(&self.build_key(key), raw, ttl).await?;
        debug!(key = %key, ttl_ms = ttl.as_millis(), "Cache set");
        Ok(())
    }

    /// [`set`](Self::set) with the manager's default TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or the store
    /// rejects the write.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl).await
    }

    /// Remove `key`, returning whether it was present
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(&self.build_key(key)).await
    }

    /// Remove several keys, returning how many were present
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_multiple(&self, keys: &[&str]) -> Result<usize> {
        let keys: Vec<String> = keys.iter().map(|key| self.build_key(key)).collect();
        self.store.delete_many(&keys).await
    }

    /// Drop every entry in the store and reset the metrics
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; metrics are then left untouched.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        self.metrics.reset();
        debug!(backend = self.store.name(), "Cache cleared");
        Ok(())
    }

    /// Hit/miss snapshot
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.store.name())
            .field("namespace", &self.namespace)
            .field("enabled", &self.enabled)
            .field("default_ttl", &self.default_ttl)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
