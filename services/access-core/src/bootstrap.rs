//! 组合根
//!
//! 显式构造：存储 → 关系图 → 解析器 → 变更服务 → 目录服务 → 门面，不使用全局状态。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing::info;
use uas_adapter_postgres::{PoolSettings, connect as connect_postgres, server_version};
use uas_adapter_redis::{RedisCache, connect as connect_redis};
use uas_config::{AccessConfig, CacheBackend, StorageBackend};
use uas_ports::CachePort;

use crate::application::{
    AccessControl, DirectoryService, MembershipGraph, MutationService, PermissionResolver,
};
use crate::domain::StoreSet;
use crate::infrastructure::cache::{AccessCache, LocalCache};
use crate::infrastructure::persistence::schema::run_migrations;

/// 默认缓存过期时间
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(150);
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// 组装完成的访问控制系统
#[derive(Clone)]
pub struct AccessSystem {
    pub stores: StoreSet,
    pub graph: Arc<MembershipGraph>,
    pub resolver: Arc<PermissionResolver>,
    pub mutations: Arc<MutationService>,
    pub directory: Arc<DirectoryService>,
    pub cache: Arc<AccessCache>,
    pub access: AccessControl,
}

pub struct AccessSystemBuilder {
    stores: Option<StoreSet>,
    cache_port: Option<Arc<dyn CachePort>>,
    cache_ttl: Duration,
    cache_capacity: u64,
}

impl Default for AccessSystemBuilder {
    fn default() -> Self {
        Self {
            stores: None,
            cache_port: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AccessSystemBuilder {
    pub fn stores(mut self, stores: StoreSet) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn cache_port(mut self, port: Arc<dyn CachePort>) -> Self {
        self.cache_port = Some(port);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// 未指定的部分使用内存实现
    pub fn build(self) -> AccessSystem {
        let stores = self.stores.unwrap_or_else(StoreSet::in_memory);
        let port = self
            .cache_port
            .unwrap_or_else(|| Arc::new(LocalCache::new(self.cache_capacity, self.cache_ttl)));
        let cache = Arc::new(AccessCache::new(port, self.cache_ttl));

        let graph = Arc::new(MembershipGraph::new(stores.clone()));
        let resolver = Arc::new(PermissionResolver::new(stores.clone()));
        let mutations = Arc::new(MutationService::new(stores.clone(), graph.clone(), cache.clone()));
        let directory = Arc::new(DirectoryService::new(
            stores.clone(),
            graph.clone(),
            resolver.clone(),
            cache.clone(),
        ));
        let access = AccessControl::new(
            resolver.clone(),
            mutations.clone(),
            directory.clone(),
            cache.clone(),
        );

        AccessSystem {
            stores,
            graph,
            resolver,
            mutations,
            directory,
            cache,
            access,
        }
    }
}

impl AccessSystem {
    pub fn builder() -> AccessSystemBuilder {
        AccessSystemBuilder::default()
    }

    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// 按配置连接存储与缓存后端
    pub async fn from_config(config: &AccessConfig) -> anyhow::Result<Self> {
        let ttl = Duration::from_millis(config.cache.ttl_ms);

        let stores = match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                StoreSet::in_memory()
            }
            StorageBackend::Postgres => {
                let db = config
                    .storage
                    .database
                    .as_ref()
                    .context("storage.database is required for the postgres backend")?;
                let settings = PoolSettings::new(db.url.expose_secret().clone())
                    .with_max_connections(db.max_connections);
                let pool = connect_postgres(&settings).await?;
                let version = server_version(&pool).await?;
                let report = run_migrations(&pool).await?;
                info!(server = %version, migrated = report.applied.len(), "Using PostgreSQL storage");
                StoreSet::postgres(pool)
            }
        };

        let port: Arc<dyn CachePort> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(LocalCache::new(config.cache.max_capacity, ttl)),
            CacheBackend::Redis => {
                let url = config
                    .cache
                    .redis_url
                    .as_ref()
                    .context("cache.redis_url is required for the redis backend")?;
                let conn = connect_redis(url.expose_secret()).await?;
                info!("Using Redis cache");
                Arc::new(RedisCache::new(conn, ttl))
            }
        };

        Ok(Self::builder()
            .stores(stores)
            .cache_port(port)
            .cache_ttl(ttl)
            .cache_capacity(config.cache.max_capacity)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OperationContext;
    use figment::Figment;
    use figment::providers::{Format, Toml};

    #[tokio::test]
    async fn test_from_config_with_memory_backends() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [storage]
            backend = "memory"

            [cache]
            backend = "memory"
            ttl_ms = 300
            "#,
        ));
        let config = AccessConfig::from_figment(figment).unwrap();

        let system = AccessSystem::from_config(&config).await.unwrap();
        assert_eq!(system.cache.ttl(), Duration::from_millis(300));

        let resp = system
            .access
            .list_groups_with_user_counts(&OperationContext::new())
            .await;
        assert!(resp.success);
        assert_eq!(resp.data, Some(Default::default()));
    }

    #[test]
    fn test_postgres_backend_requires_database() {
        let figment = Figment::new().merge(Toml::string(
            r#"
            [storage]
            backend = "postgres"
            "#,
        ));
        assert!(AccessConfig::from_figment(figment).is_err());
    }

    #[test]
    fn test_default_ttl() {
        let system = AccessSystem::in_memory();
        assert_eq!(system.cache.ttl(), DEFAULT_CACHE_TTL);
    }
}
