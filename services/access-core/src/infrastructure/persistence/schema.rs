//! 数据库结构

use sqlx::PgPool;
use uas_adapter_postgres::{Migration, MigrationReport, MigrationSet};
use uas_errors::AppResult;

pub fn migrations() -> AppResult<MigrationSet> {
    MigrationSet::new(vec![Migration::new(
        1,
        "access_schema",
        include_str!("../../../migrations/0001_access_schema.sql"),
    )])
}

pub async fn run_migrations(pool: &PgPool) -> AppResult<MigrationReport> {
    uas_adapter_postgres::run_migrations(pool, &migrations()?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_partial_unique_indexes() {
        let set = migrations().unwrap();
        assert_eq!(set.len(), 1);
        let sql = &set.iter().next().unwrap().sql;
        for index in [
            "ux_users_username_active",
            "ux_user_groups_active",
            "ux_group_permissions_active",
            "ux_user_permissions_active",
        ] {
            assert!(sql.contains(index), "missing {}", index);
        }
        assert_eq!(sql.matches("WHERE is_deleted = false").count(), 4);
    }
}
