// Key-value cache holding cart snapshots and delivery quotes

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;
}

/// JSON helpers over any [`CacheBackend`]
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheBackend,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn CacheBackend,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, Some(ttl)).await
}

// In-memory cache for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::OperationFailed("cache lock poisoned".to_string())
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, expired or not
    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut store = self.store.write().map_err(poisoned)?;
        match store.get(key) {
            Some(entry) if entry.is_expired() => {
                store.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(poisoned)?;
        // Abandoned keys are never read again, so expiry happens on write too
        store.retain(|_, entry| !entry.is_expired());
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut store = self.store.write().map_err(poisoned)?;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let store = self.store.read().map_err(poisoned)?;
        Ok(store.get(key).map(|e| !e.is_expired()).unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Redis-backed cache sharing one multiplexed connection
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        match ttl {
            // PSETEX keeps sub-second TTLs exact
            Some(ttl) => {
                redis::cmd("PSETEX")
                    .arg(key)
                    .arg(ttl.as_millis().max(1) as u64)
                    .arg(value)
                    .query_async::<_, ()>(&mut conn)
                    .await?
            }
            None => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .query_async::<_, ()>(&mut conn)
                    .await?
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let found: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }
}

// Cache factory
pub struct CacheFactory;

impl CacheFactory {
    pub async fn create_cache(
        config: &crate::config::AppConfig,
    ) -> Result<Arc<dyn CacheBackend>, CacheError> {
        if config.uses_redis() {
            info!(url = %config.redis_url, "Using Redis cache");
            let cache = RedisCache::connect(&config.redis_url).await?;
            return Ok(Arc::new(cache));
        }

        info!("Using in-memory cache");
        Ok(Arc::new(InMemoryCache::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn writes_evict_expired_entries_nobody_reads() {
        let cache = InMemoryCache::new();
        for i in 0..1000 {
            cache
                .set(&format!("abandoned:{}", i), "v", Some(Duration::from_millis(1)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache
            .set("fresh", "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_backend() {
        let cache = InMemoryCache::new();
        set_json(&cache, "nums", &vec![1, 2, 3], Duration::from_secs(5))
            .await
            .unwrap();
        let back: Option<Vec<i32>> = get_json(&cache, "nums").await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        cache.delete("nums").await.unwrap();
        let gone: Option<Vec<i32>> = get_json(&cache, "nums").await.unwrap();
        assert_eq!(gone, None);
    }
}
