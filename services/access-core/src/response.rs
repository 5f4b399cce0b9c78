//! 统一响应信封

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult, ErrorCode};

/// 成功时的固定消息
pub const SUCCESS_MESSAGE: &str = "Success";

/// 统一响应信封
///
/// 成功时 `error_code` 为 `None`，失败时 `data` 为空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub success: bool,
    pub error_code: ErrorCode,
    pub message: String,
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error_code: ErrorCode::None,
            message: SUCCESS_MESSAGE.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: code,
            message: message.into(),
            data: None,
        }
    }

    pub fn from_error(error: &AccessError) -> Self {
        Self::error(error.code(), error.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_code == ErrorCode::Cancelled
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            success: self.success,
            error_code: self.error_code,
            message: self.message,
            data: self.data.map(f),
        }
    }
}

impl<T> From<AccessResult<T>> for Response<T> {
    fn from(result: AccessResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope() {
        let resp = Response::ok(42);
        assert!(resp.success);
        assert_eq!(resp.error_code, ErrorCode::None);
        assert_eq!(resp.message, SUCCESS_MESSAGE);
        assert_eq!(resp.data, Some(42));
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let resp: Response<u32> = Err(AccessError::AlreadyGranted("x".into())).into();
        assert!(!resp.success);
        assert_eq!(resp.error_code, ErrorCode::AlreadyGranted);
        assert!(resp.data.is_none());
        assert!(resp.message.contains("already granted"));
    }

    #[test]
    fn test_envelope_survives_json() {
        let resp = Response::ok(vec!["a".to_string()]);
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response<Vec<String>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
