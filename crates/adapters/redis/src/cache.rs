//! Redis 缓存

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::debug;
use uas_errors::{AppError, AppResult};
use uas_ports::CachePort;

const DEFAULT_NAMESPACE: &str = "access";

/// 键统一加命名空间前缀；过期时间按毫秒写入（PSETEX），支持亚秒级 TTL
pub struct RedisCache {
    conn: ConnectionManager,
    namespace: String,
    default_ttl: Duration,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager, default_ttl: Duration) -> Self {
        Self {
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn failed(op: &'static str) -> impl Fn(RedisError) -> AppError {
    move |e| AppError::cache(format!("redis {}: {}", op, e))
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await.map_err(failed("GET"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl.unwrap_or(self.default_ttl));
        conn.pset_ex(self.key(key), value, millis)
            .await
            .map_err(failed("PSETEX"))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del(self.key(key)).await.map_err(failed("DEL"))
    }

    /// 单条 DEL 命令删除全部键
    async fn delete_many(&self, keys: &[String]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        debug!(count = keys.len(), "Deleting Redis keys");
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(failed("DEL"))
    }
}
