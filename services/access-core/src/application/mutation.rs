//! 关联变更服务
//!
//! 每个动词的流程：存在性校验（用户 → 组 → 权限）→ 提交 → 失效缓存。
//! 只有校验受取消信号控制；提交一旦开始就执行到底，随后必定失效缓存。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::commands::*;
use super::existence::{require_group, require_permission, require_user};
use super::invalidation;
use super::record;
use super::membership_graph::MembershipGraph;
use crate::context::OperationContext;
use crate::domain::{
    GroupId, GroupPermission, StoreSet, UserGroupMembership, UserId, UserPermission,
};
use crate::error::AccessResult;
use crate::infrastructure::cache::AccessCache;

pub struct MutationService {
    stores: StoreSet,
    graph: Arc<MembershipGraph>,
    cache: Arc<AccessCache>,
}

impl MutationService {
    pub fn new(stores: StoreSet, graph: Arc<MembershipGraph>, cache: Arc<AccessCache>) -> Self {
        Self {
            stores,
            graph,
            cache,
        }
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn grant_user_to_group(
        &self,
        ctx: &OperationContext,
        cmd: GrantUserToGroupCommand,
    ) -> AccessResult<UserGroupMembership> {
        let outcome = ctx
            .commit(
                async {
                    require_user(&self.stores, cmd.user_id).await?;
                    require_group(&self.stores, cmd.group_id).await
                },
                move |_| self.graph.grant_membership(cmd.user_id, cmd.group_id, ctx.actor()),
            )
            .await;
        let row = record("grant_user_to_group", outcome)?;

        self.invalidate_membership(cmd.user_id, cmd.group_id).await;
        info!(user_id = %cmd.user_id, group_id = %cmd.group_id, version = row.meta.version, "User added to group");
        Ok(row)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn revoke_user_from_group(
        &self,
        ctx: &OperationContext,
        cmd: RevokeUserFromGroupCommand,
    ) -> AccessResult<UserGroupMembership> {
        let outcome = ctx
            .commit(
                async {
                    require_user(&self.stores, cmd.user_id).await?;
                    require_group(&self.stores, cmd.group_id).await
                },
                move |_| self.graph.revoke_membership(cmd.user_id, cmd.group_id, ctx.actor()),
            )
            .await;
        let row = record("revoke_user_from_group", outcome)?;

        self.invalidate_membership(cmd.user_id, cmd.group_id).await;
        info!(user_id = %cmd.user_id, group_id = %cmd.group_id, "User removed from group");
        Ok(row)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn grant_permission_to_group(
        &self,
        ctx: &OperationContext,
        cmd: GrantPermissionToGroupCommand,
    ) -> AccessResult<GroupPermission> {
        let outcome = ctx
            .commit(
                async {
                    require_group(&self.stores, cmd.group_id).await?;
                    require_permission(&self.stores, cmd.permission_id).await
                },
                move |_| {
                    self.graph
                        .grant_group_permission(cmd.group_id, cmd.permission_id, ctx.actor())
                },
            )
            .await;
        let row = record("grant_permission_to_group", outcome)?;

        let members = self.members_of(cmd.group_id).await;
        self.cache
            .invalidate(&invalidation::group_permission_changed(
                cmd.group_id,
                row.permission_id,
                &members,
            ))
            .await;
        info!(group_id = %cmd.group_id, permission_id = %cmd.permission_id, "Permission granted to group");
        Ok(row)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn revoke_permission_from_group(
        &self,
        ctx: &OperationContext,
        cmd: RevokePermissionFromGroupCommand,
    ) -> AccessResult<GroupPermission> {
        let outcome = ctx
            .commit(
                async {
                    require_group(&self.stores, cmd.group_id).await?;
                    require_permission(&self.stores, cmd.permission_id).await
                },
                move |_| {
                    self.graph
                        .revoke_group_permission(cmd.group_id, cmd.permission_id, ctx.actor())
                },
            )
            .await;
        let row = record("revoke_permission_from_group", outcome)?;

        let members = self.members_of(cmd.group_id).await;
        self.cache
            .invalidate(&invalidation::group_permission_changed(
                cmd.group_id,
                row.permission_id,
                &members,
            ))
            .await;
        info!(group_id = %cmd.group_id, permission_id = %cmd.permission_id, "Permission revoked from group");
        Ok(row)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn grant_permission_to_user(
        &self,
        ctx: &OperationContext,
        cmd: GrantPermissionToUserCommand,
    ) -> AccessResult<UserPermission> {
        let outcome = ctx
            .commit(
                async {
                    require_user(&self.stores, cmd.user_id).await?;
                    require_group(&self.stores, cmd.group_id).await?;
                    require_permission(&self.stores, cmd.permission_id).await
                },
                move |_| {
                    self.graph.grant_user_permission(
                        cmd.user_id,
                        cmd.group_id,
                        cmd.permission_id,
                        ctx.actor(),
                    )
                },
            )
            .await;
        let row = record("grant_permission_to_user", outcome)?;

        let groups = self.groups_of(cmd.user_id).await;
        self.cache
            .invalidate(&invalidation::user_permission_changed(
                cmd.user_id,
                cmd.group_id,
                cmd.permission_id,
                &groups,
            ))
            .await;
        info!(user_id = %cmd.user_id, group_id = %cmd.group_id, permission_id = %cmd.permission_id, "Permission granted to user");
        Ok(row)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn revoke_permission_from_user(
        &self,
        ctx: &OperationContext,
        cmd: RevokePermissionFromUserCommand,
    ) -> AccessResult<UserPermission> {
        let outcome = ctx
            .commit(
                async {
                    require_user(&self.stores, cmd.user_id).await?;
                    require_group(&self.stores, cmd.group_id).await?;
                    require_permission(&self.stores, cmd.permission_id).await
                },
                move |_| {
                    self.graph.revoke_user_permission(
                        cmd.user_id,
                        cmd.group_id,
                        cmd.permission_id,
                        ctx.actor(),
                    )
                },
            )
            .await;
        let row = record("revoke_permission_from_user", outcome)?;

        let groups = self.groups_of(cmd.user_id).await;
        self.cache
            .invalidate(&invalidation::user_permission_changed(
                cmd.user_id,
                cmd.group_id,
                cmd.permission_id,
                &groups,
            ))
            .await;
        info!(user_id = %cmd.user_id, group_id = %cmd.group_id, permission_id = %cmd.permission_id, "Permission revoked from user");
        Ok(row)
    }

    // ============ 失效 ============

    /// 成员关系两端的聚合视图都要失效：组内其他成员的组列表，用户其他组的成员列表
    async fn invalidate_membership(&self, user_id: UserId, group_id: GroupId) {
        let groups = self.groups_of(user_id).await;
        let members = self.members_of(group_id).await;
        self.cache
            .invalidate(&invalidation::membership_changed(
                user_id, group_id, &groups, &members,
            ))
            .await;
    }

    // 读不到关联时只能依赖 TTL 过期
    async fn groups_of(&self, user_id: UserId) -> Vec<GroupId> {
        match self.graph.active_memberships_of_user(user_id).await {
            Ok(rows) => rows.into_iter().map(|m| m.group_id).collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not list groups for invalidation");
                Vec::new()
            }
        }
    }

    async fn members_of(&self, group_id: GroupId) -> Vec<UserId> {
        match self.graph.active_members_of_group(group_id).await {
            Ok(rows) => rows.into_iter().map(|m| m.user_id).collect(),
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Could not list members for invalidation");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CredentialHash, EntityStore, Group, MembershipFilter, Permission, PermissionId, Queryable,
        StoreResult, User,
    };
    use crate::error::AccessError;
    use crate::infrastructure::cache::{CacheKey, LocalCache};
    use crate::response::Response;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use uas_common::ActorId;
    use uuid::Uuid;

    fn service() -> (MutationService, StoreSet) {
        let stores = StoreSet::in_memory();
        let (svc, _) = service_over(stores.clone(), Duration::from_millis(150));
        (svc, stores)
    }

    fn service_over(stores: StoreSet, ttl: Duration) -> (MutationService, Arc<AccessCache>) {
        let graph = Arc::new(MembershipGraph::new(stores.clone()));
        let cache = Arc::new(AccessCache::new(
            Arc::new(LocalCache::new(100, Duration::from_secs(30))),
            ttl,
        ));
        (MutationService::new(stores, graph, cache.clone()), cache)
    }

    /// 写入已落库、但调用还要等一段时间才返回的存储
    struct SlowCommitStore<T: Queryable> {
        inner: Arc<dyn EntityStore<T>>,
        delay: Duration,
    }

    #[async_trait]
    impl<T: Queryable> EntityStore<T> for SlowCommitStore<T> {
        async fn get_by_id(&self, id: Uuid) -> StoreResult<T> {
            self.inner.get_by_id(id).await
        }

        async fn get_all(&self) -> StoreResult<Vec<T>> {
            self.inner.get_all().await
        }

        async fn find(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
            self.inner.find(filter).await
        }

        async fn find_any(&self, filter: &T::Filter) -> StoreResult<Vec<T>> {
            self.inner.find_any(filter).await
        }

        async fn count(&self, filter: &T::Filter) -> StoreResult<usize> {
            self.inner.count(filter).await
        }

        async fn add(&self, entity: T, by: ActorId) -> StoreResult<T> {
            let row = self.inner.add(entity, by).await?;
            tokio::time::sleep(self.delay).await;
            Ok(row)
        }

        async fn update(&self, entity: T, by: ActorId) -> StoreResult<T> {
            let row = self.inner.update(entity, by).await?;
            tokio::time::sleep(self.delay).await;
            Ok(row)
        }

        async fn delete(&self, id: Uuid, by: ActorId) -> StoreResult<T> {
            let row = self.inner.delete(id, by).await?;
            tokio::time::sleep(self.delay).await;
            Ok(row)
        }
    }

    async fn seed(stores: &StoreSet) -> (UserId, GroupId, PermissionId) {
        let by = ActorId::system();
        let user = stores
            .users
            .add(User::new("SU", "su@example.com", CredentialHash::from_hash("h")), by)
            .await
            .unwrap();
        let group = stores.groups.add(Group::new("Admins", "High Tower"), by).await.unwrap();
        let perm = stores
            .permissions
            .add(Permission::new("All", "All permissions"), by)
            .await
            .unwrap();
        (user.user_id(), group.group_id(), perm.permission_id())
    }

    #[tokio::test]
    async fn test_validation_order_user_then_group_then_permission() {
        let (svc, stores) = service();
        let (user, group, perm) = seed(&stores).await;
        let ctx = OperationContext::new();

        let err = svc
            .grant_permission_to_user(
                &ctx,
                GrantPermissionToUserCommand {
                    user_id: UserId::new(),
                    group_id: GroupId::new(),
                    permission_id: PermissionId::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::UserNotFound(_)));

        let err = svc
            .grant_permission_to_user(
                &ctx,
                GrantPermissionToUserCommand {
                    user_id: user,
                    group_id: GroupId::new(),
                    permission_id: PermissionId::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::GroupNotFound(_)));

        let err = svc
            .grant_permission_to_user(
                &ctx,
                GrantPermissionToUserCommand {
                    user_id: user,
                    group_id: group,
                    permission_id: PermissionId::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::PermissionNotFound(_)));

        svc.grant_permission_to_user(
            &ctx,
            GrantPermissionToUserCommand {
                user_id: user,
                group_id: group,
                permission_id: perm,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_before_commit_writes_nothing() {
        let (svc, stores) = service();
        let (user, group, _) = seed(&stores).await;

        let token = CancellationToken::new();
        token.cancel();
        let ctx = OperationContext::new().with_cancellation(token);

        let err = svc
            .grant_user_to_group(&ctx, GrantUserToGroupCommand { user_id: user, group_id: group })
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Cancelled));
        assert!(
            stores
                .memberships
                .find_any(&MembershipFilter::pair(user, group))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_edited_by_comes_from_context() {
        let (svc, stores) = service();
        let (user, group, _) = seed(&stores).await;
        let actor = ActorId::from_uuid(uuid::Uuid::new_v4());
        let ctx = OperationContext::new().with_actor(actor);

        let row = svc
            .grant_user_to_group(&ctx, GrantUserToGroupCommand { user_id: user, group_id: group })
            .await
            .unwrap();
        assert_eq!(row.meta.edited_by, actor);

        let row = svc
            .revoke_user_from_group(
                &OperationContext::new(),
                RevokeUserFromGroupCommand { user_id: user, group_id: group },
            )
            .await
            .unwrap();
        assert_eq!(row.meta.edited_by, ActorId::system());
    }

    #[tokio::test]
    async fn test_cancel_during_commit_keeps_write_and_invalidates() {
        let mut stores = StoreSet::in_memory();
        stores.memberships = Arc::new(SlowCommitStore {
            inner: stores.memberships.clone(),
            delay: Duration::from_millis(100),
        });
        let (svc, cache) = service_over(stores.clone(), Duration::from_secs(30));
        let (user, group, _) = seed(&stores).await;

        let key = CacheKey::UserGroups(user.0);
        let stale = cache
            .get_or_load(&key, async { Response::ok(Vec::<GroupId>::new()) })
            .await;
        assert_eq!(stale.data, Some(vec![]));

        let token = CancellationToken::new();
        let ctx = OperationContext::new().with_cancellation(token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            token.cancel();
        });

        let outcome = svc
            .grant_user_to_group(&ctx, GrantUserToGroupCommand { user_id: user, group_id: group })
            .await;
        canceller.await.unwrap();

        let active = stores
            .memberships
            .count(&MembershipFilter::pair(user, group))
            .await
            .unwrap();
        assert_eq!(active, 1);
        let row = outcome.expect("committed grant must not report Cancelled");
        assert_eq!(row.group_id, group);

        let fresh = cache
            .get_or_load(&key, async { Response::ok(vec![group]) })
            .await;
        assert_eq!(fresh.data, Some(vec![group]));
    }
}
