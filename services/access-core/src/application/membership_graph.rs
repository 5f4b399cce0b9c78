//! 成员关系图
//!
//! 用户↔组、组↔权限、用户↔组↔权限三类关联的授予与撤销。
//! 授予采用“复活或插入”：已有墓碑行时复活它，否则插入新行。
//! 同一自然键最多只有一行未删除记录。

use tracing::{instrument, warn};
use uas_common::ActorId;

use super::keyed_locks::KeyedLocks;
use crate::domain::{
    EntityStore, GroupId, GroupPermission, GroupPermissionFilter, JoinRecord, MembershipFilter,
    PermissionId, StoreError, StoreSet, UserGroupMembership, UserId, UserPermission,
    UserPermissionFilter,
};
use crate::error::{AccessError, AccessResult};

pub struct MembershipGraph {
    stores: StoreSet,
    locks: KeyedLocks,
}

impl MembershipGraph {
    pub fn new(stores: StoreSet) -> Self {
        Self {
            stores,
            locks: KeyedLocks::new(),
        }
    }

    // ============ 授予 / 撤销 ============

    #[instrument(skip(self, by))]
    pub async fn grant_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
        by: ActorId,
    ) -> AccessResult<UserGroupMembership> {
        self.grant(
            self.stores.memberships.as_ref(),
            UserGroupMembership::new(user_id, group_id),
            by,
        )
        .await
    }

    #[instrument(skip(self, by))]
    pub async fn revoke_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
        by: ActorId,
    ) -> AccessResult<UserGroupMembership> {
        self.revoke(
            self.stores.memberships.as_ref(),
            UserGroupMembership::new(user_id, group_id),
            by,
        )
        .await
    }

    #[instrument(skip(self, by))]
    pub async fn grant_group_permission(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        by: ActorId,
    ) -> AccessResult<GroupPermission> {
        self.grant(
            self.stores.group_permissions.as_ref(),
            GroupPermission::new(group_id, permission_id),
            by,
        )
        .await
    }

    #[instrument(skip(self, by))]
    pub async fn revoke_group_permission(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
        by: ActorId,
    ) -> AccessResult<GroupPermission> {
        self.revoke(
            self.stores.group_permissions.as_ref(),
            GroupPermission::new(group_id, permission_id),
            by,
        )
        .await
    }

    #[instrument(skip(self, by))]
    pub async fn grant_user_permission(
        &self,
        user_id: UserId,
        group_id: GroupId,
        permission_id: PermissionId,
        by: ActorId,
    ) -> AccessResult<UserPermission> {
        self.grant(
            self.stores.user_permissions.as_ref(),
            UserPermission::new(user_id, group_id, permission_id),
            by,
        )
        .await
    }

    #[instrument(skip(self, by))]
    pub async fn revoke_user_permission(
        &self,
        user_id: UserId,
        group_id: GroupId,
        permission_id: PermissionId,
        by: ActorId,
    ) -> AccessResult<UserPermission> {
        self.revoke(
            self.stores.user_permissions.as_ref(),
            UserPermission::new(user_id, group_id, permission_id),
            by,
        )
        .await
    }

    /// 复活或插入
    async fn grant<T: JoinRecord>(
        &self,
        store: &dyn EntityStore<T>,
        candidate: T,
        by: ActorId,
    ) -> AccessResult<T> {
        let key = candidate.natural_key();
        let description = candidate.describe();
        let _guard = self.locks.lock(&key).await;

        let rows = store.find_any(&candidate.key_filter()).await?;
        if rows.iter().any(|row| row.is_active()) {
            warn!(key = %key, "Grant rejected: already active");
            return Err(AccessError::AlreadyGranted(description));
        }

        // 历史上可能留下多行墓碑，复活最近修改的那一行
        let latest = rows.into_iter().max_by_key(|row| row.meta().edited_at);
        let outcome = match latest {
            Some(mut tombstone) => {
                tombstone.meta_mut().is_deleted = false;
                store.update(tombstone, by).await
            }
            None => store.add(candidate.clone(), by).await,
        };

        match outcome {
            Ok(row) => Ok(row),
            Err(StoreError::UniqueViolation { .. }) => {
                warn!(key = %key, "Grant lost a uniqueness race");
                Err(AccessError::AlreadyGranted(description))
            }
            Err(StoreError::ConcurrencyConflict { .. }) => {
                // 另一个写入者先改了这行，重新读取判断它是否已经生效
                let active = store.count(&candidate.key_filter()).await?;
                if active > 0 {
                    Err(AccessError::AlreadyGranted(description))
                } else {
                    Err(AccessError::ConcurrencyConflict(description))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 撤销：墓碑化唯一的未删除行
    async fn revoke<T: JoinRecord>(
        &self,
        store: &dyn EntityStore<T>,
        target: T,
        by: ActorId,
    ) -> AccessResult<T> {
        let key = target.natural_key();
        let _guard = self.locks.lock(&key).await;

        let Some(active) = store.find(&target.key_filter()).await?.into_iter().next() else {
            warn!(key = %key, "Revoke rejected: nothing active");
            return Err(AccessError::NotFound(target.describe()));
        };

        match store.delete(active.id(), by).await {
            Ok(row) => Ok(row),
            Err(StoreError::NotFound { .. }) => Err(AccessError::NotFound(target.describe())),
            Err(e) => Err(e.into()),
        }
    }

    // ============ 查询 ============

    pub async fn active_memberships_of_user(
        &self,
        user_id: UserId,
    ) -> AccessResult<Vec<UserGroupMembership>> {
        Ok(self.stores.memberships.find(&MembershipFilter::user(user_id)).await?)
    }

    pub async fn active_members_of_group(
        &self,
        group_id: GroupId,
    ) -> AccessResult<Vec<UserGroupMembership>> {
        Ok(self.stores.memberships.find(&MembershipFilter::group(group_id)).await?)
    }

    pub async fn active_group_permissions(
        &self,
        group_id: GroupId,
    ) -> AccessResult<Vec<GroupPermission>> {
        Ok(self
            .stores
            .group_permissions
            .find(&GroupPermissionFilter::group(group_id))
            .await?)
    }

    pub async fn active_user_permissions(
        &self,
        user_id: UserId,
    ) -> AccessResult<Vec<UserPermission>> {
        Ok(self
            .stores
            .user_permissions
            .find(&UserPermissionFilter::user(user_id))
            .await?)
    }

    /// 在某个组上下文中授予的全部直接权限
    pub async fn active_user_permissions_in_group(
        &self,
        group_id: GroupId,
    ) -> AccessResult<Vec<UserPermission>> {
        Ok(self
            .stores
            .user_permissions
            .find(&UserPermissionFilter::group(group_id))
            .await?)
    }

    /// 持有某个权限的组关联
    pub async fn groups_holding(
        &self,
        permission_id: PermissionId,
    ) -> AccessResult<Vec<GroupPermission>> {
        Ok(self
            .stores
            .group_permissions
            .find(&GroupPermissionFilter::permission(permission_id))
            .await?)
    }

    /// 直接持有某个权限的用户关联
    pub async fn users_holding(
        &self,
        permission_id: PermissionId,
    ) -> AccessResult<Vec<UserPermission>> {
        Ok(self
            .stores
            .user_permissions
            .find(&UserPermissionFilter::permission(permission_id))
            .await?)
    }

    pub async fn membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> AccessResult<Option<UserGroupMembership>> {
        Ok(self
            .stores
            .memberships
            .find(&MembershipFilter::pair(user_id, group_id))
            .await?
            .into_iter()
            .next())
    }

    pub async fn group_permission(
        &self,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> AccessResult<Option<GroupPermission>> {
        Ok(self
            .stores
            .group_permissions
            .find(&GroupPermissionFilter::pair(group_id, permission_id))
            .await?
            .into_iter()
            .next())
    }

    pub async fn user_permission(
        &self,
        user_id: UserId,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> AccessResult<Option<UserPermission>> {
        Ok(self
            .stores
            .user_permissions
            .find(&UserPermissionFilter::triple(user_id, group_id, permission_id))
            .await?
            .into_iter()
            .next())
    }
}
