//! uas-errors - 基础设施错误
//!
//! 适配器（数据库、迁移、缓存）统一返回 [`AppError`]。
//! 上层按 [`AppError::kind`] 打日志与指标标签，按 [`AppError::is_transient`] 判断能否降级。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 指标与日志使用的类别标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Migration(_) => "migration",
            Self::Cache(_) => "cache",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }

    /// 后端暂时不可用，重试或绕过即可
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Cache(_))
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(AppError::cache("x").kind(), "cache");
        assert_eq!(AppError::migration("x").kind(), "migration");
        assert_eq!(AppError::database("x").to_string(), "Database error: x");
    }

    #[test]
    fn test_transient() {
        assert!(AppError::cache("timeout").is_transient());
        assert!(AppError::database("pool exhausted").is_transient());
        assert!(!AppError::migration("checksum mismatch").is_transient());
        assert!(!AppError::serialization("bad json").is_transient());
    }
}
