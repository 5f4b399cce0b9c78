//! Redis 连接

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;
use uas_errors::{AppError, AppResult};

/// 建立连接管理器并 PING 一次，连不上直接报错
pub async fn connect(url: &str) -> AppResult<ConnectionManager> {
    let client = Client::open(url).map_err(|e| AppError::cache(format!("redis url: {}", e)))?;
    let mut conn = ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::cache(format!("redis connect: {}", e)))?;

    let pong: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| AppError::cache(format!("redis PING: {}", e)))?;
    info!(reply = %pong, "Redis connection ready");
    Ok(conn)
}
