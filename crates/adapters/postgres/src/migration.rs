//! PostgreSQL 迁移
//!
//! 迁移集合在构造时校验版本；执行时先取咨询锁，再在同一事务中
//! 比对已执行迁移的校验和并应用剩余迁移，多个实例同时启动也只会执行一次。

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uas_errors::{AppError, AppResult};

const MIGRATION_TABLE: &str = "_access_migrations";

/// 咨询锁键，固定值即可
const MIGRATION_LOCK_KEY: i64 = 0x6163_6365_7373;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub sql: String,
    pub checksum: String,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let checksum = hex::encode(Sha256::digest(sql.as_bytes()));
        Self {
            version,
            name: name.into(),
            sql,
            checksum,
        }
    }
}

/// 按版本严格递增的迁移集合
#[derive(Debug, Clone)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    pub fn new(migrations: Vec<Migration>) -> AppResult<Self> {
        if let Some(first) = migrations.first()
            && first.version < 1
        {
            return Err(AppError::migration(format!(
                "migration versions start at 1, found {}",
                first.version
            )));
        }
        for pair in migrations.windows(2) {
            if pair[1].version <= pair[0].version {
                return Err(AppError::migration(format!(
                    "migration {} ({}) is out of order after {}",
                    pair[1].version, pair[1].name, pair[0].version
                )));
            }
        }
        Ok(Self { migrations })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// 迁移表中的一行
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub checksum: String,
}

/// 比对已执行记录，返回待执行的迁移
///
/// 已执行迁移的内容被修改，或数据库中存在本集合不认识的版本，都视为错误。
pub fn plan<'a>(set: &'a MigrationSet, applied: &[AppliedMigration]) -> AppResult<Vec<&'a Migration>> {
    for record in applied {
        match set.iter().find(|m| m.version == record.version) {
            Some(migration) if migration.checksum != record.checksum => {
                warn!(version = record.version, "Migration checksum mismatch");
                return Err(AppError::migration(format!(
                    "migration {} ({}) was modified after it was applied",
                    migration.version, migration.name
                )));
            }
            Some(_) => {}
            None => {
                return Err(AppError::migration(format!(
                    "database has unknown migration {}",
                    record.version
                )));
            }
        }
    }

    Ok(set
        .iter()
        .filter(|m| applied.iter().all(|r| r.version != m.version))
        .collect())
}

/// 执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub verified: usize,
}

/// 在单个事务中执行全部待执行迁移
pub async fn run_migrations(pool: &PgPool, set: &MigrationSet) -> AppResult<MigrationReport> {
    let db = |stage: &'static str| move |e: sqlx::Error| AppError::database(format!("{}: {}", stage, e));

    let mut tx = pool.begin().await.map_err(db("begin migration transaction"))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(db("acquire migration lock"))?;

    sqlx::raw_sql(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version BIGINT PRIMARY KEY,
            name TEXT NOT NULL,
            checksum CHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        MIGRATION_TABLE
    ))
    .execute(&mut *tx)
    .await
    .map_err(db("create migration table"))?;

    let applied = sqlx::query_as::<_, AppliedMigration>(&format!(
        "SELECT version, checksum FROM {} ORDER BY version",
        MIGRATION_TABLE
    ))
    .fetch_all(&mut *tx)
    .await
    .map_err(db("read applied migrations"))?;

    let pending = plan(set, &applied)?;
    let mut report = MigrationReport {
        applied: Vec::with_capacity(pending.len()),
        verified: applied.len(),
    };

    for migration in pending {
        debug!(version = migration.version, name = %migration.name, "Applying migration");
        sqlx::raw_sql(&migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::migration(format!("migration {} failed: {}", migration.version, e))
            })?;

        sqlx::query(&format!(
            "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3)",
            MIGRATION_TABLE
        ))
        .bind(migration.version)
        .bind(&migration.name)
        .bind(&migration.checksum)
        .execute(&mut *tx)
        .await
        .map_err(db("record migration"))?;

        report.applied.push(migration.version);
    }

    tx.commit().await.map_err(db("commit migrations"))?;

    info!(
        applied = report.applied.len(),
        verified = report.verified,
        "Migrations complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> MigrationSet {
        MigrationSet::new(vec![
            Migration::new(1, "users", "CREATE TABLE users (id UUID)"),
            Migration::new(2, "groups", "CREATE TABLE groups (id UUID)"),
        ])
        .unwrap()
    }

    fn record(m: &Migration) -> AppliedMigration {
        AppliedMigration {
            version: m.version,
            checksum: m.checksum.clone(),
        }
    }

    #[test]
    fn test_out_of_order_rejected() {
        let err = MigrationSet::new(vec![
            Migration::new(2, "b", "SELECT 2"),
            Migration::new(1, "a", "SELECT 1"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), "migration");
        assert!(MigrationSet::new(vec![Migration::new(0, "zero", "SELECT 0")]).is_err());
    }

    #[test]
    fn test_plan_skips_applied() {
        let set = set();
        let first = set.iter().next().unwrap();

        let pending = plan(&set, &[record(first)]).unwrap();
        assert_eq!(pending.iter().map(|m| m.version).collect::<Vec<_>>(), vec![2]);
        assert_eq!(plan(&set, &[]).unwrap().len(), 2);
    }

    #[test]
    fn test_plan_detects_modified_migration() {
        let set = set();
        let tampered = AppliedMigration {
            version: 1,
            checksum: Migration::new(1, "users", "CREATE TABLE users (id BIGINT)").checksum,
        };
        assert!(plan(&set, &[tampered]).is_err());
    }

    #[test]
    fn test_plan_rejects_unknown_version() {
        let set = set();
        let unknown = AppliedMigration {
            version: 9,
            checksum: String::new(),
        };
        assert!(plan(&set, &[unknown]).is_err());
    }

    #[test]
    fn test_checksum_is_sha256_hex() {
        let m = Migration::new(1, "users", "CREATE TABLE users (id UUID)");
        assert_eq!(m.checksum.len(), 64);
        assert!(m.checksum.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
