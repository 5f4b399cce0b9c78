//! 实体到表的映射
//!
//! 每张表都有相同的基础列（见 [`META_COLUMNS`]），实体只描述自己的业务列。

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};
use uas_common::{ActorId, CursorKey};
use uas_domain_core::RecordMeta;
use uuid::Uuid;

use crate::domain::{
    CredentialHash, Group, GroupFilter, GroupId, GroupPermission, GroupPermissionFilter,
    LockStatus, MembershipFilter, Permission, PermissionFilter, PermissionId, Queryable, User,
    UserFilter, UserGroupMembership, UserId, UserPermission, UserPermissionFilter,
};

/// 所有表共有的基础列
pub const META_COLUMNS: &[&str] = &[
    "id",
    "created_at",
    "edited_at",
    "edited_by",
    "version",
    "is_deleted",
];

/// 绑定值
#[derive(Debug, Clone)]
pub enum SqlValue {
    Uuid(Uuid),
    Text(String),
    Bool(bool),
    SmallInt(i16),
    BigInt(i64),
    Timestamp(DateTime<Utc>),
}

/// 查询条件（总是以 AND 连接）
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(&'static str, SqlValue),
    /// `(created_at, id) > (..)`，键集分页
    After(CursorKey),
    AnyOf(&'static str, Vec<Uuid>),
}

pub fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: SqlValue) {
    match value {
        SqlValue::Uuid(v) => qb.push_bind(v),
        SqlValue::Text(v) => qb.push_bind(v),
        SqlValue::Bool(v) => qb.push_bind(v),
        SqlValue::SmallInt(v) => qb.push_bind(v),
        SqlValue::BigInt(v) => qb.push_bind(v),
        SqlValue::Timestamp(v) => qb.push_bind(v),
    };
}

pub fn push_condition(qb: &mut QueryBuilder<'_, Postgres>, condition: Condition) {
    match condition {
        Condition::Eq(column, value) => {
            qb.push(format!(" AND {} = ", column));
            push_value(qb, value);
        }
        Condition::After(key) => {
            qb.push(" AND (created_at, id) > (");
            qb.push_bind(key.created_at);
            qb.push(", ");
            qb.push_bind(key.id);
            qb.push(")");
        }
        Condition::AnyOf(column, ids) => {
            qb.push(format!(" AND {} = ANY(", column));
            qb.push_bind(ids);
            qb.push(")");
        }
    }
}

pub fn meta_values(meta: &RecordMeta) -> Vec<SqlValue> {
    vec![
        SqlValue::Uuid(meta.id),
        SqlValue::Timestamp(meta.created_at),
        SqlValue::Timestamp(meta.edited_at),
        SqlValue::Uuid(meta.edited_by.0),
        SqlValue::BigInt(meta.version),
        SqlValue::Bool(meta.is_deleted),
    ]
}

pub fn meta_from_row(row: &PgRow) -> Result<RecordMeta, sqlx::Error> {
    Ok(RecordMeta {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        edited_at: row.try_get("edited_at")?,
        edited_by: ActorId::from_uuid(row.try_get("edited_by")?),
        version: row.try_get("version")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

/// 可持久化到 PostgreSQL 的实体
pub trait PgEntity: Queryable + Unpin {
    const TABLE: &'static str;

    /// 业务列，顺序与 [`PgEntity::values`] 一致
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;

    fn conditions(filter: &Self::Filter) -> Vec<Condition>;

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

fn uuids<T>(ids: &[T], f: impl Fn(&T) -> Uuid) -> Vec<Uuid> {
    ids.iter().map(f).collect()
}

// ============ 实体映射 ============

impl PgEntity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &["username", "email", "lock_status", "credential"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.username.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::SmallInt(self.lock_status.as_i16()),
            SqlValue::Text(self.credential.as_str().to_string()),
        ]
    }

    fn conditions(filter: &UserFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(username) = &filter.username {
            conditions.push(Condition::Eq("username", SqlValue::Text(username.clone())));
        }
        if let Some(ids) = &filter.ids {
            conditions.push(Condition::AnyOf("id", uuids(ids, UserId::as_uuid)));
        }
        if let Some(after) = filter.created_after {
            conditions.push(Condition::After(after));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let raw_status: i16 = row.try_get("lock_status")?;
        let lock_status = LockStatus::from_i16(raw_status).ok_or_else(|| {
            sqlx::Error::Decode(format!("invalid lock_status {}", raw_status).into())
        })?;
        Ok(Self {
            meta: meta_from_row(row)?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            lock_status,
            credential: CredentialHash::from_hash(row.try_get::<String, _>("credential")?),
        })
    }
}

impl PgEntity for Group {
    const TABLE: &'static str = "groups";
    const COLUMNS: &'static [&'static str] = &["name", "description"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.description.clone()),
        ]
    }

    fn conditions(filter: &GroupFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(name) = &filter.name {
            conditions.push(Condition::Eq("name", SqlValue::Text(name.clone())));
        }
        if let Some(ids) = &filter.ids {
            conditions.push(Condition::AnyOf("id", uuids(ids, GroupId::as_uuid)));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: meta_from_row(row)?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
        })
    }
}

impl PgEntity for Permission {
    const TABLE: &'static str = "permissions";
    const COLUMNS: &'static [&'static str] = &["name", "description", "read_only", "write_only"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.description.clone()),
            SqlValue::Bool(self.read_only),
            SqlValue::Bool(self.write_only),
        ]
    }

    fn conditions(filter: &PermissionFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(name) = &filter.name {
            conditions.push(Condition::Eq("name", SqlValue::Text(name.clone())));
        }
        if let Some(ids) = &filter.ids {
            conditions.push(Condition::AnyOf("id", uuids(ids, PermissionId::as_uuid)));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: meta_from_row(row)?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            read_only: row.try_get("read_only")?,
            write_only: row.try_get("write_only")?,
        })
    }
}

impl PgEntity for UserGroupMembership {
    const TABLE: &'static str = "user_groups";
    const COLUMNS: &'static [&'static str] = &["user_id", "group_id"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.user_id.0),
            SqlValue::Uuid(self.group_id.0),
        ]
    }

    fn conditions(filter: &MembershipFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(user_id) = filter.user_id {
            conditions.push(Condition::Eq("user_id", SqlValue::Uuid(user_id.0)));
        }
        if let Some(group_id) = filter.group_id {
            conditions.push(Condition::Eq("group_id", SqlValue::Uuid(group_id.0)));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: meta_from_row(row)?,
            user_id: UserId(row.try_get("user_id")?),
            group_id: GroupId(row.try_get("group_id")?),
        })
    }
}

impl PgEntity for GroupPermission {
    const TABLE: &'static str = "group_permissions";
    const COLUMNS: &'static [&'static str] = &["group_id", "permission_id"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.group_id.0),
            SqlValue::Uuid(self.permission_id.0),
        ]
    }

    fn conditions(filter: &GroupPermissionFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(group_id) = filter.group_id {
            conditions.push(Condition::Eq("group_id", SqlValue::Uuid(group_id.0)));
        }
        if let Some(permission_id) = filter.permission_id {
            conditions.push(Condition::Eq("permission_id", SqlValue::Uuid(permission_id.0)));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: meta_from_row(row)?,
            group_id: GroupId(row.try_get("group_id")?),
            permission_id: PermissionId(row.try_get("permission_id")?),
        })
    }
}

impl PgEntity for UserPermission {
    const TABLE: &'static str = "user_permissions";
    const COLUMNS: &'static [&'static str] = &["user_id", "group_id", "permission_id"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.user_id.0),
            SqlValue::Uuid(self.group_id.0),
            SqlValue::Uuid(self.permission_id.0),
        ]
    }

    fn conditions(filter: &UserPermissionFilter) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Some(user_id) = filter.user_id {
            conditions.push(Condition::Eq("user_id", SqlValue::Uuid(user_id.0)));
        }
        if let Some(group_id) = filter.group_id {
            conditions.push(Condition::Eq("group_id", SqlValue::Uuid(group_id.0)));
        }
        if let Some(permission_id) = filter.permission_id {
            conditions.push(Condition::Eq("permission_id", SqlValue::Uuid(permission_id.0)));
        }
        conditions
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: meta_from_row(row)?,
            user_id: UserId(row.try_get("user_id")?),
            group_id: GroupId(row.try_get("group_id")?),
            permission_id: PermissionId(row.try_get("permission_id")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_line_up_with_values() {
        let user = User::new("SU", "su@example.com", CredentialHash::from_hash("h"));
        assert_eq!(User::COLUMNS.len(), user.values().len());

        let group = Group::new("Admins", "High Tower");
        assert_eq!(Group::COLUMNS.len(), group.values().len());

        let perm = Permission::new("All", "All permissions");
        assert_eq!(Permission::COLUMNS.len(), perm.values().len());

        let up = UserPermission::new(UserId::new(), GroupId::new(), PermissionId::new());
        assert_eq!(UserPermission::COLUMNS.len(), up.values().len());
        assert_eq!(META_COLUMNS.len(), meta_values(&up.meta).len());
    }

    #[test]
    fn test_filter_conditions() {
        assert!(User::conditions(&UserFilter::default()).is_empty());
        assert_eq!(
            UserPermission::conditions(&UserPermissionFilter::triple(
                UserId::new(),
                GroupId::new(),
                PermissionId::new()
            ))
            .len(),
            3
        );
        assert!(matches!(
            Group::conditions(&GroupFilter::ids(vec![GroupId::new()]))[0],
            Condition::AnyOf("id", _)
        ));
    }
}
