//! 内存实体存储
//!
//! 单把读写锁保护整张表，唯一键检查与写入在同一个写锁临界区内完成。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uas_common::ActorId;
use uuid::Uuid;

use crate::domain::{EntityStore, Queryable, StoreError, StoreResult};

pub struct MemoryStore<T> {
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T: Queryable> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn sorted(mut rows: Vec<T>) -> Vec<T> {
        rows.sort_by(|a, b| (a.meta().created_at, a.id()).cmp(&(b.meta().created_at, b.id())));
        rows
    }

    /// 未删除记录中不得出现相同唯一键
    fn check_unique(rows: &HashMap<Uuid, T>, candidate: &T) -> StoreResult<()> {
        if !candidate.is_active() {
            return Ok(());
        }
        let Some(key) = candidate.unique_key() else {
            return Ok(());
        };
        let taken = rows.values().any(|row| {
            row.id() != candidate.id() && row.is_active() && row.unique_key().as_ref() == Some(&key)
        });
        if taken {
            return Err(StoreError::UniqueViolation { kind: T::KIND, key });
        }
        Ok(())
    }
}

impl<T: Queryable> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Queryable> EntityStore<T> for MemoryStore<T> {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<T> {
        let rows = self.rows.read().await;
        rows.get(&id)
            .filter(|row| row.is_active())
            .cloned()
            .ok_or(StoreError::NotFound { kind: T::KIND, id })
    }

    async fn get_all(&self) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(Self::sorted(
            rows.values().filter(|row| row.is_active()).cloned().collect(),
        ))
    }

    async fn find(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(Self::sorted(
            rows.values()
                .filter(|row| row.is_active() && row.matches(filter))
                .cloned()
                .collect(),
        ))
    }

    async fn find_any(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
        let rows = self.rows.read().await;
        Ok(Self::sorted(
            rows.values().filter(|row| row.matches(filter)).cloned().collect(),
        ))
    }

    async fn count(&self, filter: &T::Filter) -> StoreResult<usize> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| row.is_active() && row.matches(filter))
            .count())
    }

    async fn add(&self, mut entity: T, by: ActorId) -> StoreResult<T> {
        entity.meta_mut().stamp_created(by);

        let mut rows = self.rows.write().await;
        if rows.contains_key(&entity.id()) {
            return Err(StoreError::UniqueViolation {
                kind: T::KIND,
                key: format!("id:{}", entity.id()),
            });
        }
        Self::check_unique(&rows, &entity)?;
        rows.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, mut entity: T, by: ActorId) -> StoreResult<T> {
        let mut rows = self.rows.write().await;
        let stored = rows.get(&entity.id()).ok_or(StoreError::NotFound {
            kind: T::KIND,
            id: entity.id(),
        })?;
        if stored.version() != entity.version() {
            return Err(StoreError::ConcurrencyConflict {
                kind: T::KIND,
                id: entity.id(),
                expected: entity.version(),
                actual: stored.version(),
            });
        }
        Self::check_unique(&rows, &entity)?;

        let created_at = stored.meta().created_at;
        let meta = entity.meta_mut();
        meta.created_at = created_at;
        meta.touch(by);
        rows.insert(entity.id(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: Uuid, by: ActorId) -> StoreResult<T> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .filter(|row| row.is_active())
            .ok_or(StoreError::NotFound { kind: T::KIND, id })?;
        row.meta_mut().tombstone(by);
        Ok(row.clone())
    }
}
