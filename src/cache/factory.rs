//! Build a cache manager from configuration

use std::sync::Arc;

use tracing::info;

use super::CacheManager;
use super::file::FileStore;
use super::memory::MemoryStore;
use super::store::CacheStore;
use crate::Result;
use crate::config::{CacheBackend, CacheConfig};

/// Create a [`CacheManager`] for the configured backend
///
/// # Errors
///
/// Returns an error when the configuration is invalid or the filesystem
/// directory cannot be created.
pub async fn create_cache(config: &CacheConfig) -> Result<CacheManager> {
    config.validate()?;

    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new(config.max_entries)),
        CacheBackend::Filesystem => {
            Arc::new(FileStore::open(config.directory_or_default()).await?)
        }
    };

    info!(
        backend = store.name(),
        namespace = %config.namespace,
        enabled = config.enabled,
        "Cache initialized"
    );

    Ok(CacheManager::new(store, &config.namespace)
        .with_enabled(config.enabled)
        .with_default_ttl(config.default_ttl))
}
