//! 缓存端口

use async_trait::async_trait;
use std::time::Duration;
use uas_errors::AppResult;

/// 字符串键值缓存
///
/// 值由调用方序列化；`ttl` 为 None 时使用实现方的默认过期时间。
/// 实现方出错时调用方应当绕过缓存，而不是让请求失败。
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 批量删除，默认逐个删除
    async fn delete_many(&self, keys: &[String]) -> AppResult<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}
