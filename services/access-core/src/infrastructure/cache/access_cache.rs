//! 读穿缓存协调器
//!
//! 缓存完整的响应信封（成功与失败都缓存，取消除外）。
//! 缓存本身出错时降级为直接加载，读路径不会因为缓存故障而失败。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uas_ports::CachePort;

use super::keys::CacheKey;
use crate::response::Response;

pub struct AccessCache {
    port: Arc<dyn CachePort>,
    ttl: Duration,
}

impl AccessCache {
    pub fn new(port: Arc<dyn CachePort>, ttl: Duration) -> Self {
        Self { port, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 读穿：命中直接返回，未命中执行 `load` 并回填
    pub async fn get_or_load<T, F>(&self, key: &CacheKey, load: F) -> Response<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Response<T>>,
    {
        let key = key.to_string();

        match self.port.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Response<T>>(&raw) {
                Ok(cached) => {
                    counter!("access.cache.hit").increment(1);
                    debug!(key = %key, "Cache hit");
                    return cached;
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => {
                counter!("access.cache.error", "kind" => e.kind()).increment(1);
                warn!(key = %key, error = %e, "Cache read failed, loading directly");
            }
        }

        counter!("access.cache.miss").increment(1);
        debug!(key = %key, "Cache miss");

        let response = load.await;
        if response.is_cancelled() {
            return response;
        }

        match serde_json::to_string(&response) {
            Ok(raw) => {
                if let Err(e) = self.port.set(&key, &raw, Some(self.ttl)).await {
                    counter!("access.cache.error", "kind" => e.kind()).increment(1);
                    warn!(key = %key, error = %e, "Cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "Response not cacheable"),
        }
        response
    }

    /// 删除一组键
    ///
    /// 失效在提交之后执行，失败只记录日志，依靠 TTL 兜底。
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        let raw: Vec<String> = keys.iter().map(ToString::to_string).collect();
        match self.port.delete_many(&raw).await {
            Ok(()) => {
                counter!("access.cache.invalidate").increment(raw.len() as u64);
                debug!(keys = ?raw, "Cache invalidated");
            }
            Err(e) => {
                counter!("access.cache.error", "kind" => e.kind()).increment(1);
                warn!(keys = ?raw, error = %e, transient = e.is_transient(), "Cache invalidation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::infrastructure::cache::LocalCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uas_errors::{AppError, AppResult};

    fn cache(ttl: Duration) -> AccessCache {
        AccessCache::new(Arc::new(LocalCache::new(100, Duration::from_secs(60))), ttl)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = cache(Duration::from_secs(10));
        let loads = AtomicUsize::new(0);
        let key = CacheKey::GetAll("Group");

        for _ in 0..3 {
            let resp = cache
                .get_or_load(&key, async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Response::ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(resp.data, Some(vec![1, 2, 3]));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_cached_but_cancellation_is_not() {
        let cache = cache(Duration::from_secs(10));
        let key = CacheKey::ResolveUser(uuid::Uuid::nil());

        let first: Response<u8> = cache
            .get_or_load(&key, async { Response::error(ErrorCode::Cancelled, "cancelled") })
            .await;
        assert!(first.is_cancelled());

        let second: Response<u8> = cache
            .get_or_load(&key, async { Response::error(ErrorCode::UserNotFound, "missing") })
            .await;
        assert_eq!(second.error_code, ErrorCode::UserNotFound);

        let third: Response<u8> = cache.get_or_load(&key, async { Response::ok(1) }).await;
        assert_eq!(third.error_code, ErrorCode::UserNotFound);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let cache = cache(Duration::from_secs(10));
        let key = CacheKey::GroupUserCounts;

        cache.get_or_load(&key, async { Response::ok(1) }).await;
        cache.invalidate(&[key.clone()]).await;

        let resp = cache.get_or_load(&key, async { Response::ok(2) }).await;
        assert_eq!(resp.data, Some(2));
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = cache(Duration::from_millis(50));
        let key = CacheKey::GetAll("Permission");

        cache.get_or_load(&key, async { Response::ok(1) }).await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        let resp = cache.get_or_load(&key, async { Response::ok(2) }).await;
        assert_eq!(resp.data, Some(2));
    }

    struct BrokenCache;

    #[async_trait]
    impl CachePort for BrokenCache {
        async fn get(&self, _key: &str) -> AppResult<Option<String>> {
            Err(AppError::cache("redis down"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> AppResult<()> {
            Err(AppError::cache("redis down"))
        }

        async fn delete(&self, _key: &str) -> AppResult<()> {
            Err(AppError::cache("redis down"))
        }
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_direct_load() {
        let cache = AccessCache::new(Arc::new(BrokenCache), Duration::from_secs(1));

        let resp = cache
            .get_or_load(&CacheKey::GetAll("User"), async { Response::ok("fresh".to_string()) })
            .await;
        assert_eq!(resp.data.as_deref(), Some("fresh"));

        cache.invalidate(&[CacheKey::GetAll("User")]).await;
    }
}
