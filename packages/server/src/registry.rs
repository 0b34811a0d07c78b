//! Worker registry: key-value storage with TTL.
//!
//! Carries worker heartbeats (`worker:<id>`, TTL 300 s), feature flags
//! (`feature_flag:<name>`, TTL 24 h), and cached search results
//! (`search:<md5>`, TTL from configuration). The trait keeps the backing
//! store swappable; the in-memory implementation expires entries lazily.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[async_trait]
pub trait Registry: Send + Sync {
    async fn set_hash(&self, key: &str, fields: &[(String, String)], ttl: Duration) -> Result<()>;
    async fn get_hash(&self, key: &str) -> Result<Option<HashMap<String, String>>>;
    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn get_string(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
enum Entry {
    String(String),
    Hash(HashMap<String, String>),
}

struct Stored {
    entry: Entry,
    expires_at: Instant,
}

/// In-memory registry with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, Stored>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_live(&self, key: &str) -> Option<Entry> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Some(stored.entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn set_hash(&self, key: &str, fields: &[(String, String)], ttl: Duration) -> Result<()> {
        let hash: HashMap<String, String> = fields.iter().cloned().collect();
        self.entries.write().await.insert(
            key.to_string(),
            Stored {
                entry: Entry::Hash(hash),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(match self.get_live(key).await {
            Some(Entry::Hash(hash)) => Some(hash),
            _ => None,
        })
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.write().await.insert(
            key.to_string(),
            Stored {
                entry: Entry::String(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get_live(key).await {
            Some(Entry::String(value)) => Some(value),
            _ => None,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Feature flags resolved from the registry, then the environment, then a
/// caller default.
pub struct FeatureFlags {
    registry: Arc<dyn Registry>,
}

impl FeatureFlags {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    pub async fn is_enabled(&self, flag_name: &str, default: bool) -> bool {
        if let Ok(Some(value)) = self
            .registry
            .get_string(&format!("feature_flag:{}", flag_name))
            .await
        {
            return value.eq_ignore_ascii_case("true");
        }

        let env_key = format!("FEATURE_{}", flag_name.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            return matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }

        default
    }

    pub async fn set_flag(&self, flag_name: &str, enabled: bool) -> Result<()> {
        self.registry
            .set_string(
                &format!("feature_flag:{}", flag_name),
                if enabled { "true" } else { "false" },
                Duration::from_secs(24 * 60 * 60),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_roundtrip() {
        let registry = MemoryRegistry::new();
        registry
            .set_string("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(registry.get_string("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let registry = MemoryRegistry::new();
        registry
            .set_string("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.get_string("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_roundtrip() {
        let registry = MemoryRegistry::new();
        let fields = vec![
            ("status".to_string(), "running".to_string()),
            ("pages".to_string(), "42".to_string()),
        ];
        registry
            .set_hash("worker:test", &fields, Duration::from_secs(300))
            .await
            .unwrap();

        let hash = registry.get_hash("worker:test").await.unwrap().unwrap();
        assert_eq!(hash.get("status").map(String::as_str), Some("running"));
        assert_eq!(hash.get("pages").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn test_feature_flags_registry_wins() {
        let registry = Arc::new(MemoryRegistry::new());
        let flags = FeatureFlags::new(registry.clone());

        assert!(!flags.is_enabled("trending_discovery", false).await);

        flags.set_flag("trending_discovery", true).await.unwrap();
        assert!(flags.is_enabled("trending_discovery", false).await);
    }
}
