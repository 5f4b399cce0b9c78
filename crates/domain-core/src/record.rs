//! 基础记录字段

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uas_common::{ActorId, new_id};
use uuid::Uuid;

/// 基础记录
///
/// Version 从 1 开始，每次写入递增；IsDeleted 为墓碑标记，记录永不物理删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub edited_at: DateTime<Utc>,
    pub edited_by: ActorId,
    pub version: i64,
    pub is_deleted: bool,
}

impl RecordMeta {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            created_at: now,
            edited_at: now,
            edited_by: ActorId::system(),
            version: 1,
            is_deleted: false,
        }
    }

    /// 首次写入
    pub fn stamp_created(&mut self, by: ActorId) {
        let now = Utc::now();
        self.created_at = now;
        self.edited_at = now;
        self.edited_by = by;
        self.version = 1;
        self.is_deleted = false;
    }

    /// 后续写入：版本号加一并记录修改人
    pub fn touch(&mut self, by: ActorId) {
        self.version += 1;
        self.edited_at = Utc::now();
        self.edited_by = by;
    }

    /// 软删除
    pub fn tombstone(&mut self, by: ActorId) {
        self.is_deleted = true;
        self.touch(by);
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_starts_at_version_one() {
        let meta = RecordMeta::new();
        assert_eq!(meta.version, 1);
        assert!(!meta.is_deleted);
        assert_eq!(meta.edited_by, ActorId::system());
    }

    #[test]
    fn test_tombstone_bumps_version() {
        let actor = ActorId::from_uuid(Uuid::new_v4());
        let mut meta = RecordMeta::new();

        meta.tombstone(actor);
        assert!(meta.is_deleted);
        assert_eq!(meta.version, 2);
        assert_eq!(meta.edited_by, actor);
        assert!(meta.edited_at >= meta.created_at);
    }

    #[test]
    fn test_stamp_created_resets_lineage() {
        let mut meta = RecordMeta::new();
        meta.touch(ActorId::system());
        meta.is_deleted = true;

        meta.stamp_created(ActorId::system());
        assert_eq!(meta.version, 1);
        assert!(!meta.is_deleted);
        assert_eq!(meta.created_at, meta.edited_at);
    }
}
