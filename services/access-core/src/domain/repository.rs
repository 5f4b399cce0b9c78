//! 实体存储抽象
//!
//! 所有实体共用一个泛型存储接口：
//! - 读路径默认过滤墓碑记录，只有 `find_any` 能看到已删除行
//! - `add` / `update` 在同一临界区内检查唯一键
//! - `update` 以调用方读到的版本号做乐观并发检查

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uas_common::ActorId;
use uas_domain_core::Entity;
use uuid::Uuid;

use super::group::Group;
use super::membership::{GroupPermission, UserGroupMembership, UserPermission};
use super::permission::Permission;
use super::user::User;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("{kind} {id} version mismatch: expected {expected}, stored {actual}")]
    ConcurrencyConflict {
        kind: &'static str,
        id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("{kind} unique key '{key}' already taken")]
    UniqueViolation { kind: &'static str, key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 可按条件查询的实体
///
/// 每种实体自带强类型查询条件，`Default` 条件匹配全部记录。
pub trait Queryable: Entity + Debug {
    type Filter: Debug + Clone + Default + Send + Sync + 'static;

    fn matches(&self, filter: &Self::Filter) -> bool;
}

/// 实体存储
#[async_trait]
pub trait EntityStore<T: Queryable>: Send + Sync {
    /// 按 ID 获取未删除记录
    async fn get_by_id(&self, id: Uuid) -> StoreResult<T>;

    /// 全部未删除记录，按 (CreatedAt, Id) 排序
    async fn get_all(&self) -> StoreResult<Vec<T>>;

    /// 满足条件的未删除记录，按 (CreatedAt, Id) 排序
    async fn find(&self, filter: &T::Filter) -> StoreResult<Vec<T>>;

    /// 满足条件的全部记录（包括墓碑），仅用于复活
    async fn find_any(&self, filter: &T::Filter) -> StoreResult<Vec<T>>;

    async fn count(&self, filter: &T::Filter) -> StoreResult<usize>;

    /// 插入新记录：Version=1，IsDeleted=false
    async fn add(&self, entity: T, by: ActorId) -> StoreResult<T>;

    /// 更新记录：版本号必须与存储一致，成功后加一
    async fn update(&self, entity: T, by: ActorId) -> StoreResult<T>;

    /// 按 ID 软删除
    async fn delete(&self, id: Uuid, by: ActorId) -> StoreResult<T>;

    /// 软删除调用方持有的实体，同样受版本号检查
    async fn delete_entity(&self, entity: &T, by: ActorId) -> StoreResult<T> {
        if !entity.is_active() {
            return Err(StoreError::NotFound {
                kind: T::KIND,
                id: entity.id(),
            });
        }
        let mut tombstoned = entity.clone();
        tombstoned.meta_mut().is_deleted = true;
        self.update(tombstoned, by).await
    }
}

/// 六类实体的存储句柄
#[derive(Clone)]
pub struct StoreSet {
    pub users: Arc<dyn EntityStore<User>>,
    pub groups: Arc<dyn EntityStore<Group>>,
    pub permissions: Arc<dyn EntityStore<Permission>>,
    pub memberships: Arc<dyn EntityStore<UserGroupMembership>>,
    pub group_permissions: Arc<dyn EntityStore<GroupPermission>>,
    pub user_permissions: Arc<dyn EntityStore<UserPermission>>,
}
