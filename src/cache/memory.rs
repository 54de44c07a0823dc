//! In-process cache backend

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use super::store::CacheStore;
use crate::Result;

/// Thread-safe in-memory store with TTL expiry and a size bound
pub struct MemoryStore {
    entries: DashMap<String, CachedEntry>,
    max_entries: usize,
}

/// A cached value with TTL metadata
struct CachedEntry {
    value: Value,
    stored_at: Instant,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl CachedEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

impl MemoryStore {
    /// Create an empty store holding at most `max_entries` (minimum 1)
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    /// Drop `key` unless a concurrent set has refreshed it
    fn remove_if_expired(&self, key: &str) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
    }

    /// Make room for one new entry
    fn ensure_capacity(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }
        if self.evict_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            trace!(key = %key, "Evicting oldest cache entry");
            self.entries.remove(&key);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry);
            self.remove_if_expired(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        if !self.entries.contains_key(key) {
            self.ensure_capacity();
        }
        let now = Instant::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                stored_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}
