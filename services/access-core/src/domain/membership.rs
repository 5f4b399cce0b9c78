//! 关联记录：用户↔组、组↔权限、用户↔组↔权限
//!
//! 三类关联都是带软删除的普通实体，自然键在未删除记录中唯一。
//! 撤销只打墓碑，再次授予时复活同一行。

use serde::{Deserialize, Serialize};
use uas_domain_core::{Entity, RecordMeta};

use super::group::GroupId;
use super::permission::PermissionId;
use super::repository::Queryable;
use super::user::UserId;

/// 关联记录
pub trait JoinRecord: Queryable {
    /// 自然键，同时用作进程内锁键与唯一约束键
    fn natural_key(&self) -> String;

    /// 精确匹配自然键的查询条件
    fn key_filter(&self) -> Self::Filter;

    /// 用于错误消息的描述
    fn describe(&self) -> String;
}

// ============ 用户 ↔ 组 ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGroupMembership {
    pub meta: RecordMeta,
    pub user_id: UserId,
    pub group_id: GroupId,
}

impl UserGroupMembership {
    pub fn new(user_id: UserId, group_id: GroupId) -> Self {
        Self {
            meta: RecordMeta::new(),
            user_id,
            group_id,
        }
    }
}

impl Entity for UserGroupMembership {
    const KIND: &'static str = "UserGroup";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.natural_key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MembershipFilter {
    pub user_id: Option<UserId>,
    pub group_id: Option<GroupId>,
}

impl MembershipFilter {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            group_id: None,
        }
    }

    pub fn group(group_id: GroupId) -> Self {
        Self {
            user_id: None,
            group_id: Some(group_id),
        }
    }

    pub fn pair(user_id: UserId, group_id: GroupId) -> Self {
        Self {
            user_id: Some(user_id),
            group_id: Some(group_id),
        }
    }
}

impl Queryable for UserGroupMembership {
    type Filter = MembershipFilter;

    fn matches(&self, filter: &MembershipFilter) -> bool {
        filter.user_id.is_none_or(|u| u == self.user_id)
            && filter.group_id.is_none_or(|g| g == self.group_id)
    }
}

impl JoinRecord for UserGroupMembership {
    fn natural_key(&self) -> String {
        format!("user_group:{}:{}", self.user_id, self.group_id)
    }

    fn key_filter(&self) -> MembershipFilter {
        MembershipFilter::pair(self.user_id, self.group_id)
    }

    fn describe(&self) -> String {
        format!("User {} in group {}", self.user_id, self.group_id)
    }
}

// ============ 组 ↔ 权限 ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPermission {
    pub meta: RecordMeta,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

impl GroupPermission {
    pub fn new(group_id: GroupId, permission_id: PermissionId) -> Self {
        Self {
            meta: RecordMeta::new(),
            group_id,
            permission_id,
        }
    }
}

impl Entity for GroupPermission {
    const KIND: &'static str = "GroupPermission";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.natural_key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupPermissionFilter {
    pub group_id: Option<GroupId>,
    pub permission_id: Option<PermissionId>,
}

impl GroupPermissionFilter {
    pub fn group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            permission_id: None,
        }
    }

    pub fn permission(permission_id: PermissionId) -> Self {
        Self {
            group_id: None,
            permission_id: Some(permission_id),
        }
    }

    pub fn pair(group_id: GroupId, permission_id: PermissionId) -> Self {
        Self {
            group_id: Some(group_id),
            permission_id: Some(permission_id),
        }
    }
}

impl Queryable for GroupPermission {
    type Filter = GroupPermissionFilter;

    fn matches(&self, filter: &GroupPermissionFilter) -> bool {
        filter.group_id.is_none_or(|g| g == self.group_id)
            && filter.permission_id.is_none_or(|p| p == self.permission_id)
    }
}

impl JoinRecord for GroupPermission {
    fn natural_key(&self) -> String {
        format!("group_permission:{}:{}", self.group_id, self.permission_id)
    }

    fn key_filter(&self) -> GroupPermissionFilter {
        GroupPermissionFilter::pair(self.group_id, self.permission_id)
    }

    fn describe(&self) -> String {
        format!("Permission {} on group {}", self.permission_id, self.group_id)
    }
}

// ============ 用户 ↔ 组 ↔ 权限 ============

/// 在某个组上下文中直接授予用户的权限
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermission {
    pub meta: RecordMeta,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

impl UserPermission {
    pub fn new(user_id: UserId, group_id: GroupId, permission_id: PermissionId) -> Self {
        Self {
            meta: RecordMeta::new(),
            user_id,
            group_id,
            permission_id,
        }
    }
}

impl Entity for UserPermission {
    const KIND: &'static str = "UserPermission";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn unique_key(&self) -> Option<String> {
        Some(self.natural_key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserPermissionFilter {
    pub user_id: Option<UserId>,
    pub group_id: Option<GroupId>,
    pub permission_id: Option<PermissionId>,
}

impl UserPermissionFilter {
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn group(group_id: GroupId) -> Self {
        Self {
            group_id: Some(group_id),
            ..Default::default()
        }
    }

    pub fn permission(permission_id: PermissionId) -> Self {
        Self {
            permission_id: Some(permission_id),
            ..Default::default()
        }
    }

    pub fn triple(user_id: UserId, group_id: GroupId, permission_id: PermissionId) -> Self {
        Self {
            user_id: Some(user_id),
            group_id: Some(group_id),
            permission_id: Some(permission_id),
        }
    }
}

impl Queryable for UserPermission {
    type Filter = UserPermissionFilter;

    fn matches(&self, filter: &UserPermissionFilter) -> bool {
        filter.user_id.is_none_or(|u| u == self.user_id)
            && filter.group_id.is_none_or(|g| g == self.group_id)
            && filter.permission_id.is_none_or(|p| p == self.permission_id)
    }
}

impl JoinRecord for UserPermission {
    fn natural_key(&self) -> String {
        format!(
            "user_permission:{}:{}:{}",
            self.user_id, self.group_id, self.permission_id
        )
    }

    fn key_filter(&self) -> UserPermissionFilter {
        UserPermissionFilter::triple(self.user_id, self.group_id, self.permission_id)
    }

    fn describe(&self) -> String {
        format!(
            "Permission {} for user {} in group {}",
            self.permission_id, self.user_id, self.group_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_filter_matches_only_same_pair() {
        let a = UserGroupMembership::new(UserId::new(), GroupId::new());
        let b = UserGroupMembership::new(a.user_id, GroupId::new());

        assert!(a.matches(&a.key_filter()));
        assert!(!b.matches(&a.key_filter()));
        assert!(b.matches(&MembershipFilter::user(a.user_id)));
    }

    #[test]
    fn test_natural_key_ignores_row_identity() {
        let user = UserId::new();
        let group = GroupId::new();
        let perm = PermissionId::new();
        let first = UserPermission::new(user, group, perm);
        let second = UserPermission::new(user, group, perm);

        assert_ne!(first.meta.id, second.meta.id);
        assert_eq!(first.unique_key(), second.unique_key());
    }
}
