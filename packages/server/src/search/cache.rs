//! Search result caching over the registry.
//!
//! The cache never raises: every failure degrades to a miss on read and a
//! no-op on write.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::registry::Registry;
use crate::search::engine::SearchResponse;

pub struct SearchCache {
    registry: Arc<dyn Registry>,
    ttl: Duration,
    enabled: bool,
}

impl SearchCache {
    pub fn new(registry: Arc<dyn Registry>, ttl_seconds: u64, enabled: bool) -> Self {
        Self {
            registry,
            ttl: Duration::from_secs(ttl_seconds),
            enabled,
        }
    }

    pub async fn get(&self, cache_key: &str) -> Option<SearchResponse> {
        if !self.enabled {
            return None;
        }

        let stored = match self.registry.get_string(&registry_key(cache_key)).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(error = %e, "Search cache get failed");
                return None;
            }
        };

        match serde_json::from_str(&stored) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(error = %e, "Search cache entry corrupt, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, cache_key: &str, response: &SearchResponse) {
        if !self.enabled {
            return;
        }

        let serialized = match serde_json::to_string(response) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "Failed to serialize search results for cache");
                return;
            }
        };

        if let Err(e) = self
            .registry
            .set_string(&registry_key(cache_key), &serialized, self.ttl)
            .await
        {
            warn!(error = %e, "Search cache set failed");
        }
    }
}

fn registry_key(cache_key: &str) -> String {
    format!("search:{}", cache_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;

    fn response() -> SearchResponse {
        SearchResponse {
            items: Vec::new(),
            total_count: 0,
            has_more: false,
            next_cursor: None,
            search_time_ms: 12.0,
            engine: "postgres".to_string(),
            from_cache: false,
        }
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let cache = SearchCache::new(Arc::new(MemoryRegistry::new()), 60, true);
        cache.set("abc", &response()).await;

        let hit = cache.get("abc").await.unwrap();
        assert_eq!(hit.total_count, 0);
        assert_eq!(hit.engine, "postgres");
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = SearchCache::new(Arc::new(MemoryRegistry::new()), 60, false);
        cache.set("abc", &response()).await;
        assert!(cache.get("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .set_string("search:abc", "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let cache = SearchCache::new(registry, 60, true);
        assert!(cache.get("abc").await.is_none());
    }
}
