//! 用户组实体

use serde::{Deserialize, Serialize};
use uas_domain_core::{Entity, RecordMeta};

use super::repository::Queryable;

define_id!(
    /// 用户组 ID
    GroupId
);

/// 组名最大长度
pub const GROUP_NAME_MAX_LEN: usize = 20;
/// 组描述最大长度
pub const GROUP_DESCRIPTION_MAX_LEN: usize = 150;

/// 用户组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub meta: RecordMeta,
    pub name: String,
    pub description: String,
}

impl Group {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn group_id(&self) -> GroupId {
        GroupId(self.meta.id)
    }
}

impl Entity for Group {
    const KIND: &'static str = "Group";

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub name: Option<String>,
    pub ids: Option<Vec<GroupId>>,
}

impl GroupFilter {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn ids(ids: Vec<GroupId>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }
}

impl Queryable for Group {
    type Filter = GroupFilter;

    fn matches(&self, filter: &GroupFilter) -> bool {
        filter.name.as_ref().is_none_or(|n| &self.name == n)
            && filter.ids.as_ref().is_none_or(|ids| ids.contains(&self.group_id()))
    }
}
