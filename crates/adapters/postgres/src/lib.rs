//! uas-adapter-postgres - PostgreSQL 连接与迁移

mod connection;
mod migration;

pub use connection::{PoolSettings, connect, server_version};
pub use migration::{
    AppliedMigration, Migration, MigrationReport, MigrationSet, plan, run_migrations,
};
