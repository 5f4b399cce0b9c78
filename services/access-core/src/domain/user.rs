//! 用户实体

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use uas_common::CursorKey;
use uas_domain_core::{Entity, RecordMeta};

use super::repository::Queryable;
use crate::error::{AccessError, AccessResult};

define_id!(
    /// 用户 ID
    UserId
);

/// 用户名最大长度
pub const USERNAME_MAX_LEN: usize = 20;
/// 邮箱最大长度
pub const EMAIL_MAX_LEN: usize = 60;

/// 锁定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockStatus {
    #[default]
    None,
    Locked,
    Hold,
    PasswordMismatch,
}

impl LockStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::None => 0,
            Self::Locked => 1,
            Self::Hold => 2,
            Self::PasswordMismatch => 3,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Locked),
            2 => Some(Self::Hold),
            3 => Some(Self::PasswordMismatch),
            _ => None,
        }
    }
}

/// 凭据哈希（argon2 PHC 字符串）
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// 对明文口令加盐哈希
    pub fn hash(plain: &str) -> AccessResult<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing failed");
                AccessError::unexpected("credential hashing failed")
            })?;
        Ok(Self(hash.to_string()))
    }

    /// 从已存储的哈希恢复
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn verify(&self, plain: &str) -> bool {
        match PasswordHash::new(&self.0) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialHash([REDACTED])")
    }
}

/// 用户实体
#[derive(Debug, Clone)]
pub struct User {
    pub meta: RecordMeta,
    pub username: String,
    pub email: String,
    pub lock_status: LockStatus,
    pub credential: CredentialHash,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        credential: CredentialHash,
    ) -> Self {
        Self {
            meta: RecordMeta::new(),
            username: username.into(),
            email: email.into(),
            lock_status: LockStatus::None,
            credential,
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId(self.meta.id)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_status != LockStatus::None
    }
}

impl Entity for User {
    const KIND: &'static str = "User";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn unique_key(&self) -> Option<String> {
        Some(format!("username:{}", self.username))
    }
}

/// 用户查询条件
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub username: Option<String>,
    pub ids: Option<Vec<UserId>>,
    /// 只返回 (CreatedAt, Id) 严格排在游标之后的用户
    pub created_after: Option<CursorKey>,
}

impl UserFilter {
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }

    pub fn ids(ids: Vec<UserId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn created_after(after: Option<CursorKey>) -> Self {
        Self {
            created_after: after,
            ..Default::default()
        }
    }
}

impl Queryable for User {
    type Filter = UserFilter;

    fn matches(&self, filter: &UserFilter) -> bool {
        filter.username.as_ref().is_none_or(|u| &self.username == u)
            && filter.ids.as_ref().is_none_or(|ids| ids.contains(&self.user_id()))
            && filter
                .created_after
                .is_none_or(|key| key.precedes(self.meta.created_at, self.meta.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_hash_verifies() {
        let hash = CredentialHash::hash("s3cret").unwrap();
        assert!(hash.verify("s3cret"));
        assert!(!hash.verify("wrong"));
        assert!(hash.as_str().starts_with("$argon2"));
        assert_eq!(format!("{:?}", hash), "CredentialHash([REDACTED])");
    }

    #[test]
    fn test_lock_status_codes() {
        for status in [
            LockStatus::None,
            LockStatus::Locked,
            LockStatus::Hold,
            LockStatus::PasswordMismatch,
        ] {
            assert_eq!(LockStatus::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(LockStatus::from_i16(9), None);
    }

    #[test]
    fn test_user_filter() {
        let user = User::new("SU", "su@example.com", CredentialHash::from_hash("x"));
        assert!(user.matches(&UserFilter::default()));
        assert!(user.matches(&UserFilter::username("SU")));
        assert!(!user.matches(&UserFilter::username("su")));
        assert!(user.matches(&UserFilter::ids(vec![user.user_id()])));
        let own = CursorKey::new(user.meta.created_at, user.meta.id);
        assert!(!user.matches(&UserFilter::created_after(Some(own))));
        assert_eq!(user.unique_key().as_deref(), Some("username:SU"));
    }

    #[test]
    fn test_cursor_keeps_rows_sharing_a_timestamp() {
        let mut first = User::new("a", "a@example.com", CredentialHash::from_hash("x"));
        let mut second = User::new("b", "b@example.com", CredentialHash::from_hash("x"));
        first.meta.id = uuid::Uuid::from_u128(1);
        second.meta.id = uuid::Uuid::from_u128(2);
        second.meta.created_at = first.meta.created_at;

        let cursor = CursorKey::new(first.meta.created_at, first.meta.id);
        let filter = UserFilter::created_after(Some(cursor));
        assert!(second.matches(&filter));
        assert!(!first.matches(&filter));
    }
}
