//! 缓存键

use std::fmt;

use uuid::Uuid;

/// 缓存键
///
/// 字符串形式沿用 `GetAll_<Kind>` / `GetById_<Kind>_<id>` 约定。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    GetAll(&'static str),
    GetById(&'static str, Uuid),
    ResolveUser(Uuid),
    ResolveGroup(Uuid),
    UserGroups(Uuid),
    GroupMembers(Uuid),
    GroupUserCounts,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetAll(kind) => write!(f, "GetAll_{}", kind),
            Self::GetById(kind, id) => write!(f, "GetById_{}_{}", kind, id),
            Self::ResolveUser(id) => write!(f, "ResolveUser_{}", id),
            Self::ResolveGroup(id) => write!(f, "ResolveGroup_{}", id),
            Self::UserGroups(id) => write!(f, "UserGroups_{}", id),
            Self::GroupMembers(id) => write!(f, "GroupMembers_{}", id),
            Self::GroupUserCounts => f.write_str("GroupUserCounts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let id = Uuid::nil();
        assert_eq!(CacheKey::GetAll("Group").to_string(), "GetAll_Group");
        assert_eq!(
            CacheKey::GetById("User", id).to_string(),
            format!("GetById_User_{}", id)
        );
        assert_eq!(CacheKey::ResolveUser(id).to_string(), format!("ResolveUser_{}", id));
        assert_eq!(CacheKey::GroupUserCounts.to_string(), "GroupUserCounts");
    }
}
