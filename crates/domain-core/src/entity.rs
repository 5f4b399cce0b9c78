//! 实体基础 trait

use uuid::Uuid;

use crate::RecordMeta;

/// 实体 trait
///
/// 实体通过组合 [`RecordMeta`] 获得公共字段，存储层只依赖这个 trait。
pub trait Entity: Clone + Send + Sync + 'static {
    /// 实体类型名，用于缓存键和日志
    const KIND: &'static str;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn version(&self) -> i64 {
        self.meta().version
    }

    fn is_active(&self) -> bool {
        !self.meta().is_deleted
    }

    /// 在未删除记录中必须唯一的业务键
    ///
    /// 关联记录返回自然键，用户返回用户名；没有唯一约束时返回 None。
    fn unique_key(&self) -> Option<String> {
        None
    }
}
