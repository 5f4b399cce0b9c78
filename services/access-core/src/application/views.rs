//! 对外返回的视图

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{GroupId, LockStatus, PermissionId, UserId};

/// 用户视图（不含凭据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub lock_status: LockStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub edited_at: DateTime<Utc>,
    pub group_ids: Vec<GroupId>,
    /// 直接授予的权限
    pub permission_ids: Vec<PermissionId>,
}

/// 组视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub version: i64,
    pub member_ids: Vec<UserId>,
    pub permission_ids: Vec<PermissionId>,
}
