//! 本地内存缓存（Moka）
//!
//! 每个条目携带自己的 TTL，未指定时使用默认 TTL。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache as MokaCache;
use uas_errors::AppResult;
use uas_ports::CachePort;

#[derive(Clone)]
struct CacheEntry {
    value: String,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Clone)]
pub struct LocalCache {
    inner: MokaCache<String, CacheEntry>,
    default_ttl: Duration,
}

impl LocalCache {
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { inner, default_ttl }
    }
}

#[async_trait]
impl CachePort for LocalCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.inner.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let entry = CacheEntry {
            value: value.to_string(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = LocalCache::new(100, Duration::from_secs(60));

        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = LocalCache::new(100, Duration::from_secs(60));

        cache.set("short", "v", Some(Duration::from_millis(50))).await.unwrap();
        cache.set("long", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_many() {
        let cache = LocalCache::new(100, Duration::from_secs(60));
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();

        cache.delete_many(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_none());
    }
}
