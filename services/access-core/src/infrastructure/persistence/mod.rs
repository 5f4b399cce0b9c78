//! 持久化实现

mod error_mapper;
pub mod memory_store;
pub mod postgres_store;
pub mod schema;
pub mod sql;

use std::sync::Arc;

use sqlx::PgPool;

pub use memory_store::MemoryStore;
pub use postgres_store::PgStore;

use crate::domain::{
    Group, GroupPermission, Permission, StoreSet, User, UserGroupMembership, UserPermission,
};

impl StoreSet {
    /// 全内存存储
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryStore::<User>::new()),
            groups: Arc::new(MemoryStore::<Group>::new()),
            permissions: Arc::new(MemoryStore::<Permission>::new()),
            memberships: Arc::new(MemoryStore::<UserGroupMembership>::new()),
            group_permissions: Arc::new(MemoryStore::<GroupPermission>::new()),
            user_permissions: Arc::new(MemoryStore::<UserPermission>::new()),
        }
    }

    /// PostgreSQL 存储（调用方负责先执行迁移）
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgStore::<User>::new(pool.clone())),
            groups: Arc::new(PgStore::<Group>::new(pool.clone())),
            permissions: Arc::new(PgStore::<Permission>::new(pool.clone())),
            memberships: Arc::new(PgStore::<UserGroupMembership>::new(pool.clone())),
            group_permissions: Arc::new(PgStore::<GroupPermission>::new(pool.clone())),
            user_permissions: Arc::new(PgStore::<UserPermission>::new(pool)),
        }
    }
}
