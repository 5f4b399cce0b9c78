//! 通用类型定义

use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 操作人 ID（审计用，记录在 EditedBy 上）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 系统操作者
    pub fn system() -> Self {
        Self(crate::utils::system_actor())
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::system()
    }
}

/// 分页游标：上一页最后一条记录的 (CreatedAt, Id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CursorKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl CursorKey {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    /// 记录是否排在游标之后；创建时间相同的按 Id 区分
    pub fn precedes(&self, created_at: DateTime<Utc>, id: Uuid) -> bool {
        (created_at, id) > (self.created_at, self.id)
    }
}

/// 游标分页参数
///
/// 按 (CreatedAt, Id) 排序，`after` 为上一页最后一条的键。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPage {
    pub after: Option<CursorKey>,
    pub limit: usize,
}

impl Default for CursorPage {
    fn default() -> Self {
        Self {
            after: None,
            limit: 100,
        }
    }
}

impl CursorPage {
    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }

    pub fn after(created_at: DateTime<Utc>, id: Uuid, limit: usize) -> Self {
        Self {
            after: Some(CursorKey::new(created_at, id)),
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_actor_is_nil() {
        assert_eq!(ActorId::system().0, Uuid::nil());
        assert_eq!(ActorId::default(), ActorId::system());
    }

    #[test]
    fn test_cursor_pages() {
        assert_eq!(CursorPage::default().limit, 100);
        assert!(CursorPage::first(10).after.is_none());
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id = Uuid::new_v4();
        assert_eq!(CursorPage::after(ts, id, 5).after, Some(CursorKey::new(ts, id)));
    }

    #[test]
    fn test_cursor_breaks_timestamp_ties_by_id() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let (low, high) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let cursor = CursorKey::new(ts, low);

        assert!(cursor.precedes(ts, high));
        assert!(!cursor.precedes(ts, low));
        assert!(!CursorKey::new(ts, high).precedes(ts, low));
        assert!(cursor.precedes(ts + chrono::Duration::milliseconds(1), Uuid::nil()));
    }
}
