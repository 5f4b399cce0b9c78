//! 访问控制错误
//!
//! `AccessError` 是服务内部的错误类型，`ErrorCode` 是信封中对外暴露的稳定错误码。

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uas_errors::AppError;
use uuid::Uuid;

use crate::domain::StoreError;

/// 信封错误码
///
/// 数值与旧版契约保持一致，9 以后为新增码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    None = -1,
    UnexpectedError = 1,
    NotFound = 2,
    UserNotFound = 4,
    GroupNotFound = 5,
    PermissionNotFound = 8,
    AlreadyGranted = 9,
    ConcurrencyConflict = 10,
    ValidationError = 11,
    Duplicate = 12,
    Cancelled = 13,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Group {0} not found")]
    GroupNotFound(Uuid),

    #[error("Permission {0} not found")]
    PermissionNotFound(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already granted")]
    AlreadyGranted(String),

    #[error("Concurrent modification of {0}")]
    ConcurrencyConflict(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type AccessResult<T> = Result<T, AccessError>;

impl AccessError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UserNotFound(_) => ErrorCode::UserNotFound,
            Self::GroupNotFound(_) => ErrorCode::GroupNotFound,
            Self::PermissionNotFound(_) => ErrorCode::PermissionNotFound,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::AlreadyGranted(_) => ErrorCode::AlreadyGranted,
            Self::ConcurrencyConflict(_) => ErrorCode::ConcurrencyConflict,
            Self::Duplicate(_) => ErrorCode::Duplicate,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Unexpected(_) => ErrorCode::UnexpectedError,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }
}

/// 存储错误到访问错误的默认映射
///
/// 唯一约束冲突默认视为重复；授予路径会在更早的位置把它改写为 AlreadyGranted。
impl From<StoreError> for AccessError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { kind, id } => Self::NotFound(format!("{} {}", kind, id)),
            StoreError::ConcurrencyConflict { kind, id, .. } => {
                Self::ConcurrencyConflict(format!("{} {}", kind, id))
            }
            StoreError::UniqueViolation { kind, key } => {
                Self::Duplicate(format!("{} '{}'", kind, key))
            }
            StoreError::Backend(msg) => {
                tracing::error!(error = %msg, "Storage backend failure");
                Self::Unexpected("storage failure".to_string())
            }
        }
    }
}

/// 端口层错误（缓存等）一律视为意外错误
impl From<AppError> for AccessError {
    fn from(error: AppError) -> Self {
        tracing::error!(error = %error, kind = error.kind(), "Infrastructure failure");
        Self::Unexpected("infrastructure failure".to_string())
    }
}
