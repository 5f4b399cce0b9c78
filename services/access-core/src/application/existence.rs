//! 存在性校验：缺失或已删除时返回对应的领域错误

use crate::domain::{
    Group, GroupId, Permission, PermissionId, StoreError, StoreSet, User, UserId,
};
use crate::error::{AccessError, AccessResult};

pub async fn require_user(stores: &StoreSet, id: UserId) -> AccessResult<User> {
    match stores.users.get_by_id(id.0).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound { .. }) => Err(AccessError::UserNotFound(id.0)),
        Err(e) => Err(e.into()),
    }
}

pub async fn require_group(stores: &StoreSet, id: GroupId) -> AccessResult<Group> {
    match stores.groups.get_by_id(id.0).await {
        Ok(group) => Ok(group),
        Err(StoreError::NotFound { .. }) => Err(AccessError::GroupNotFound(id.0)),
        Err(e) => Err(e.into()),
    }
}

pub async fn require_permission(stores: &StoreSet, id: PermissionId) -> AccessResult<Permission> {
    match stores.permissions.get_by_id(id.0).await {
        Ok(permission) => Ok(permission),
        Err(StoreError::NotFound { .. }) => Err(AccessError::PermissionNotFound(id.0)),
        Err(e) => Err(e.into()),
    }
}
