//! In-process listing cache
//!
//! Listing responses are cached per owner and evicted by key prefix when the
//! worker commits a new video. Behind a trait so tests can observe eviction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Cache key for an owner's video listing page.
pub fn listing_key(owner_id: uuid::Uuid, limit: i64, offset: i64) -> String {
    format!("videos:{}:{}:{}", owner_id, limit, offset)
}

/// Prefix covering every listing page for an owner.
pub fn listing_prefix(owner_id: uuid::Uuid) -> String {
    format!("videos:{}:", owner_id)
}

#[async_trait]
pub trait ListingCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    async fn put(&self, key: &str, value: serde_json::Value);

    /// Evict every entry whose key starts with the prefix. Returns the
    /// number of entries removed.
    async fn invalidate_prefix(&self, prefix: &str) -> usize;
}

struct CachedEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Thread-safe in-memory cache with a fixed TTL.
///
/// Multiple async tasks read concurrently; writes and eviction take the
/// write lock briefly.
#[derive(Clone)]
pub struct MemoryListingCache {
    entries: Arc<RwLock<HashMap<String, CachedEntry>>>,
    ttl: Duration,
}

impl MemoryListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }
}

impl Default for MemoryListingCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl ListingCache for MemoryListingCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    async fn put(&self, key: &str, value: serde_json::Value) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();

        if removed > 0 {
            tracing::debug!(prefix = prefix, removed = removed, "Listing cache evicted");
        }

        removed
    }
}
