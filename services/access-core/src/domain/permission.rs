//! 权限实体与解析结果

use serde::{Deserialize, Serialize};
use uas_domain_core::{Entity, RecordMeta};

use super::group::GroupId;
use super::repository::Queryable;

define_id!(
    /// 权限 ID
    PermissionId
);

/// 权限
///
/// `read_only` / `write_only` 是独立的标志位，可以同时为真。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub meta: RecordMeta,
    pub name: String,
    pub description: String,
    pub read_only: bool,
    pub write_only: bool,
}

impl Permission {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
            description: description.into(),
            read_only: false,
            write_only: false,
        }
    }

    pub fn with_flags(mut self, read_only: bool, write_only: bool) -> Self {
        self.read_only = read_only;
        self.write_only = write_only;
        self
    }

    pub fn permission_id(&self) -> PermissionId {
        PermissionId(self.meta.id)
    }
}

impl Entity for Permission {
    const KIND: &'static str = "Permission";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    pub name: Option<String>,
    pub ids: Option<Vec<PermissionId>>,
}

impl PermissionFilter {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn ids(ids: Vec<PermissionId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }
}

impl Queryable for Permission {
    type Filter = PermissionFilter;

    fn matches(&self, filter: &PermissionFilter) -> bool {
        filter.name.as_ref().is_none_or(|n| &self.name == n)
            && filter
                .ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&self.permission_id()))
    }
}

/// 权限来源类型
///
/// 排序即优先级：直接授予优先于组继承。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PermissionSourceType {
    /// 在某个组的上下文中直接授予用户
    UserInGroup,
    /// 通过组成员身份继承
    GroupLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionSource {
    pub source_type: PermissionSourceType,
    pub source_group_id: GroupId,
}

impl PermissionSource {
    pub fn direct(group_id: GroupId) -> Self {
        Self {
            source_type: PermissionSourceType::UserInGroup,
            source_group_id: group_id,
        }
    }

    pub fn inherited(group_id: GroupId) -> Self {
        Self {
            source_type: PermissionSourceType::GroupLevel,
            source_group_id: group_id,
        }
    }

    /// 是否比另一个来源更优先
    pub fn outranks(&self, other: &PermissionSource) -> bool {
        (self.source_type, self.source_group_id) < (other.source_type, other.source_group_id)
    }
}

/// 解析后的权限（带来源）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPermission {
    pub permission: Permission,
    pub source: PermissionSource,
}
