//! uas-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// 环境变量前缀
pub const ENV_PREFIX: &str = "UAS_";

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// 缓存后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub database: Option<DatabaseConfig>,
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// 条目过期时间（毫秒）
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// 本地缓存最大条目数
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
    pub redis_url: Option<Secret<String>>,
}

fn default_cache_ttl_ms() -> u64 {
    150
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_ms: default_cache_ttl_ms(),
            max_capacity: default_cache_capacity(),
            redis_url: None,
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub prometheus: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            prometheus: false,
        }
    }
}

/// 初始数据配置
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

fn default_app_name() -> String {
    "access-core".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AccessConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 顺序: `{dir}/default.toml` → `{dir}/{APP_ENV}.toml` → `UAS_` 前缀环境变量
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StorageBackend::Postgres && self.storage.database.is_none() {
            return Err(ConfigError::Invalid(
                "storage.database is required for the postgres backend".to_string(),
            ));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::Invalid(
                "cache.redis_url is required for the redis backend".to_string(),
            ));
        }
        if self.cache.ttl_ms == 0 {
            return Err(ConfigError::Invalid("cache.ttl_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_env: default_app_env(),
            telemetry: TelemetryConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            seed: SeedConfig::default(),
        }
    }
}
