//! 数据库错误映射
//!
//! 把 sqlx 错误转换为 StoreError，唯一约束冲突单独识别

use crate::domain::StoreError;

/// PostgreSQL 唯一约束违规
const UNIQUE_VIOLATION: &str = "23505";

pub fn map_sqlx_error(kind: &'static str, e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) if code.as_ref() == UNIQUE_VIOLATION => StoreError::UniqueViolation {
                kind,
                key: db_err.constraint().unwrap_or("unique").to_string(),
            },
            Some(code) => StoreError::Backend(format!("Database error ({}): {}", code, db_err)),
            None => StoreError::Backend(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend("Database connection pool timeout".to_string())
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend("Database connection pool is closed".to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_backend_error() {
        let err = map_sqlx_error("User", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_row_not_found_is_backend_error() {
        // 读取路径自行处理缺失行，走到这里说明是意外
        let err = map_sqlx_error("User", sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
