//! PostgreSQL 实体存储
//!
//! 乐观并发通过 `UPDATE ... WHERE id = $1 AND version = $2` 实现，
//! 唯一键由 `WHERE is_deleted = false` 的部分唯一索引保证。

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uas_common::ActorId;
use uuid::Uuid;

use super::error_mapper::map_sqlx_error;
use super::sql::{META_COLUMNS, PgEntity, meta_values, push_condition, push_value};
use crate::domain::{EntityStore, StoreError, StoreResult};

pub struct PgStore<T> {
    pool: PgPool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: PgEntity> PgStore<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    fn columns() -> String {
        META_COLUMNS
            .iter()
            .chain(T::COLUMNS.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn decode(rows: &[sqlx::postgres::PgRow]) -> StoreResult<Vec<T>> {
        rows.iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error(T::KIND, e))
    }

    async fn select(&self, filter: &T::Filter, include_deleted: bool) -> StoreResult<Vec<T>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            Self::columns(),
            T::TABLE
        ));
        if !include_deleted {
            qb.push(" AND is_deleted = false");
        }
        for condition in T::conditions(filter) {
            push_condition(&mut qb, condition);
        }
        qb.push(" ORDER BY created_at, id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?;
        Self::decode(&rows)
    }

    /// 更新未命中时区分“不存在”与“版本冲突”
    async fn explain_missed_update(&self, id: Uuid, expected: i64) -> StoreError {
        let sql = format!("SELECT version FROM {} WHERE id = $1", T::TABLE);
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(Some(row)) => match row.try_get::<i64, _>("version") {
                Ok(actual) => StoreError::ConcurrencyConflict {
                    kind: T::KIND,
                    id,
                    expected,
                    actual,
                },
                Err(e) => map_sqlx_error(T::KIND, e),
            },
            Ok(None) => StoreError::NotFound { kind: T::KIND, id },
            Err(e) => map_sqlx_error(T::KIND, e),
        }
    }
}

#[async_trait]
impl<T: PgEntity> EntityStore<T> for PgStore<T> {
    async fn get_by_id(&self, id: Uuid) -> StoreResult<T> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND is_deleted = false",
            Self::columns(),
            T::TABLE
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?
            .ok_or(StoreError::NotFound { kind: T::KIND, id })?;
        T::from_row(&row).map_err(|e| map_sqlx_error(T::KIND, e))
    }

    async fn get_all(&self) -> StoreResult<Vec<T>> {
        self.select(&T::Filter::default(), false).await
    }

    async fn find(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
        self.select(filter, false).await
    }

    async fn find_any(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
        self.select(filter, true).await
    }

    async fn count(&self, filter: &T::Filter) -> StoreResult<usize> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) AS total FROM {} WHERE is_deleted = false",
            T::TABLE
        ));
        for condition in T::conditions(filter) {
            push_condition(&mut qb, condition);
        }
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?;
        let total: i64 = row
            .try_get("total")
            .map_err(|e| map_sqlx_error(T::KIND, e))?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    async fn add(&self, mut entity: T, by: ActorId) -> StoreResult<T> {
        entity.meta_mut().stamp_created(by);

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            T::TABLE,
            Self::columns()
        ));
        let values = meta_values(entity.meta()).into_iter().chain(entity.values());
        for (i, value) in values.enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(")");

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?;
        Ok(entity)
    }

    async fn update(&self, mut entity: T, by: ActorId) -> StoreResult<T> {
        let id = entity.id();
        let expected = entity.version();
        entity.meta_mut().touch(by);

        let meta = entity.meta().clone();
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET edited_at = ", T::TABLE));
        qb.push_bind(meta.edited_at);
        qb.push(", edited_by = ");
        qb.push_bind(meta.edited_by.0);
        qb.push(", version = ");
        qb.push_bind(meta.version);
        qb.push(", is_deleted = ");
        qb.push_bind(meta.is_deleted);
        for (column, value) in T::COLUMNS.iter().zip(entity.values()) {
            qb.push(format!(", {} = ", column));
            push_value(&mut qb, value);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND version = ");
        qb.push_bind(expected);
        qb.push(" RETURNING created_at");

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?;
        match row {
            Some(row) => {
                entity.meta_mut().created_at = row
                    .try_get("created_at")
                    .map_err(|e| map_sqlx_error(T::KIND, e))?;
                Ok(entity)
            }
            None => Err(self.explain_missed_update(id, expected).await),
        }
    }

    async fn delete(&self, id: Uuid, by: ActorId) -> StoreResult<T> {
        let sql = format!(
            "UPDATE {} SET is_deleted = true, version = version + 1, edited_at = $1, edited_by = $2 \
             WHERE id = $3 AND is_deleted = false RETURNING {}",
            T::TABLE,
            Self::columns()
        );
        let row = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(by.0)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(T::KIND, e))?
            .ok_or(StoreError::NotFound { kind: T::KIND, id })?;
        T::from_row(&row).map_err(|e| map_sqlx_error(T::KIND, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Group, UserPermission};

    #[test]
    fn test_column_list_starts_with_meta() {
        let columns = PgStore::<Group>::columns();
        assert_eq!(
            columns,
            "id, created_at, edited_at, edited_by, version, is_deleted, name, description"
        );
        assert!(PgStore::<UserPermission>::columns().ends_with("user_id, group_id, permission_id"));
    }
}
