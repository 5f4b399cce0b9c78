//! PostgreSQL 连接池

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uas_errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PoolSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(self.min_connections);
        self
    }
}

pub async fn connect(settings: &PoolSettings) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(&settings.url)
        .await
        .map_err(|e| AppError::database(format!("connect: {}", e)))?;

    info!(max_connections = settings.max_connections, "PostgreSQL pool ready");
    Ok(pool)
}

/// 探活，返回服务端版本串
pub async fn server_version(pool: &PgPool) -> AppResult<String> {
    sqlx::query_scalar::<_, String>("SELECT version()")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::database(format!("health check: {}", e)))
}
