//! 访问控制门面
//!
//! 对外的唯一入口：所有动词都返回统一信封，读路径经缓存。

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uas_common::CursorPage;
use uas_domain_core::Entity;

use super::commands::*;
use super::directory::DirectoryService;
use super::mutation::MutationService;
use super::resolver::PermissionResolver;
use super::views::{GroupView, UserView};
use crate::context::OperationContext;
use crate::domain::{Group, GroupId, Permission, PermissionId, ResolvedPermission, User, UserId};
use crate::error::{AccessError, AccessResult};
use crate::infrastructure::cache::{AccessCache, CacheKey};
use crate::response::Response;

#[derive(Clone)]
pub struct AccessControl {
    resolver: Arc<PermissionResolver>,
    mutations: Arc<MutationService>,
    directory: Arc<DirectoryService>,
    cache: Arc<AccessCache>,
}

impl AccessControl {
    pub fn new(
        resolver: Arc<PermissionResolver>,
        mutations: Arc<MutationService>,
        directory: Arc<DirectoryService>,
        cache: Arc<AccessCache>,
    ) -> Self {
        Self {
            resolver,
            mutations,
            directory,
            cache,
        }
    }

    /// 经缓存读取；取消时返回 Cancelled 且不写缓存
    async fn cached<T, F>(&self, ctx: &OperationContext, key: CacheKey, load: F) -> Response<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = AccessResult<T>>,
    {
        let read = async {
            Ok::<_, AccessError>(
                self.cache
                    .get_or_load(&key, async { Response::from(load.await) })
                    .await,
            )
        };
        match ctx.run(read).await {
            Ok(response) => response,
            Err(e) => Response::from_error(&e),
        }
    }

    /// 写操作结果转换为信封
    fn write<T, U>(outcome: AccessResult<T>, f: impl FnOnce(T) -> U) -> Response<U> {
        Response::from(outcome.map(f))
    }

    // ============ 解析 ============

    pub async fn resolve_user_permissions(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
    ) -> Response<Vec<ResolvedPermission>> {
        self.cached(
            ctx,
            CacheKey::ResolveUser(user_id.0),
            self.resolver.resolve_user(user_id),
        )
        .await
    }

    pub async fn resolve_group_permissions(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
    ) -> Response<Vec<ResolvedPermission>> {
        self.cached(
            ctx,
            CacheKey::ResolveGroup(group_id.0),
            self.resolver.resolve_group(group_id),
        )
        .await
    }

    /// 基于缓存的解析结果判断
    pub async fn user_has_permission(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        permission_name: &str,
    ) -> Response<bool> {
        self.resolve_user_permissions(ctx, user_id)
            .await
            .map(|resolved| resolved.iter().any(|r| r.permission.name == permission_name))
    }

    pub async fn list_groups_with_user_counts(
        &self,
        ctx: &OperationContext,
    ) -> Response<BTreeMap<String, usize>> {
        self.cached(ctx, CacheKey::GroupUserCounts, self.resolver.group_user_counts())
            .await
    }

    pub async fn list_user_groups(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
    ) -> Response<Vec<GroupView>> {
        self.cached(
            ctx,
            CacheKey::UserGroups(user_id.0),
            self.directory.list_user_groups(user_id),
        )
        .await
    }

    pub async fn list_group_members(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
    ) -> Response<Vec<UserView>> {
        self.cached(
            ctx,
            CacheKey::GroupMembers(group_id.0),
            self.directory.list_group_members(group_id),
        )
        .await
    }

    // ============ 关联变更 ============

    pub async fn grant_user_to_group(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        group_id: GroupId,
    ) -> Response<()> {
        let cmd = GrantUserToGroupCommand { user_id, group_id };
        Self::write(self.mutations.grant_user_to_group(ctx, cmd).await, |_| ())
    }

    pub async fn revoke_user_from_group(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        group_id: GroupId,
    ) -> Response<()> {
        let cmd = RevokeUserFromGroupCommand { user_id, group_id };
        Self::write(self.mutations.revoke_user_from_group(ctx, cmd).await, |_| ())
    }

    pub async fn grant_permission_to_group(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> Response<()> {
        let cmd = GrantPermissionToGroupCommand { group_id, permission_id };
        Self::write(self.mutations.grant_permission_to_group(ctx, cmd).await, |_| ())
    }

    pub async fn revoke_permission_from_group(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> Response<()> {
        let cmd = RevokePermissionFromGroupCommand { group_id, permission_id };
        Self::write(self.mutations.revoke_permission_from_group(ctx, cmd).await, |_| ())
    }

    pub async fn grant_permission_to_user(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> Response<()> {
        let cmd = GrantPermissionToUserCommand {
            user_id,
            group_id,
            permission_id,
        };
        Self::write(self.mutations.grant_permission_to_user(ctx, cmd).await, |_| ())
    }

    pub async fn revoke_permission_from_user(
        &self,
        ctx: &OperationContext,
        user_id: UserId,
        group_id: GroupId,
        permission_id: PermissionId,
    ) -> Response<()> {
        let cmd = RevokePermissionFromUserCommand {
            user_id,
            group_id,
            permission_id,
        };
        Self::write(self.mutations.revoke_permission_from_user(ctx, cmd).await, |_| ())
    }

    // ============ 用户 ============

    pub async fn create_user(
        &self,
        ctx: &OperationContext,
        cmd: CreateUserCommand,
    ) -> Response<UserView> {
        Response::from(self.directory.create_user(ctx, cmd).await)
    }

    pub async fn get_user(&self, ctx: &OperationContext, user_id: UserId) -> Response<UserView> {
        self.cached(
            ctx,
            CacheKey::GetById(User::KIND, user_id.0),
            self.directory.get_user(user_id),
        )
        .await
    }

    pub async fn get_user_by_username(
        &self,
        ctx: &OperationContext,
        username: &str,
    ) -> Response<UserView> {
        match ctx.run(self.directory.get_user_by_username(username)).await {
            Ok(user) => Response::ok(user),
            Err(e) => Response::from_error(&e),
        }
    }

    /// 分页结果直接读取，不经缓存
    pub async fn list_users(
        &self,
        ctx: &OperationContext,
        page: CursorPage,
    ) -> Response<Vec<UserView>> {
        Response::from(ctx.run(self.directory.list_users(page)).await)
    }

    pub async fn update_user(
        &self,
        ctx: &OperationContext,
        cmd: UpdateUserCommand,
    ) -> Response<UserView> {
        Response::from(self.directory.update_user(ctx, cmd).await)
    }

    pub async fn set_lock_status(
        &self,
        ctx: &OperationContext,
        cmd: SetLockStatusCommand,
    ) -> Response<UserView> {
        Response::from(self.directory.set_lock_status(ctx, cmd).await)
    }

    pub async fn delete_user(&self, ctx: &OperationContext, user_id: UserId) -> Response<()> {
        Response::from(self.directory.delete_user(ctx, user_id).await)
    }

    // ============ 组 ============

    pub async fn create_group(
        &self,
        ctx: &OperationContext,
        cmd: CreateGroupCommand,
    ) -> Response<GroupView> {
        Response::from(self.directory.create_group(ctx, cmd).await)
    }

    pub async fn get_group(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
    ) -> Response<GroupView> {
        self.cached(
            ctx,
            CacheKey::GetById(Group::KIND, group_id.0),
            self.directory.get_group(group_id),
        )
        .await
    }

    pub async fn list_groups(&self, ctx: &OperationContext) -> Response<Vec<GroupView>> {
        self.cached(ctx, CacheKey::GetAll(Group::KIND), self.directory.list_groups())
            .await
    }

    pub async fn update_group(
        &self,
        ctx: &OperationContext,
        cmd: UpdateGroupCommand,
    ) -> Response<GroupView> {
        Response::from(self.directory.update_group(ctx, cmd).await)
    }

    pub async fn delete_group(&self, ctx: &OperationContext, group_id: GroupId) -> Response<()> {
        Response::from(self.directory.delete_group(ctx, group_id).await)
    }

    // ============ 权限 ============

    pub async fn create_permission(
        &self,
        ctx: &OperationContext,
        cmd: CreatePermissionCommand,
    ) -> Response<Permission> {
        Response::from(self.directory.create_permission(ctx, cmd).await)
    }

    pub async fn get_permission(
        &self,
        ctx: &OperationContext,
        permission_id: PermissionId,
    ) -> Response<Permission> {
        self.cached(
            ctx,
            CacheKey::GetById(Permission::KIND, permission_id.0),
            self.directory.get_permission(permission_id),
        )
        .await
    }

    pub async fn list_permissions(&self, ctx: &OperationContext) -> Response<Vec<Permission>> {
        self.cached(ctx, CacheKey::GetAll(Permission::KIND), self.directory.list_permissions())
            .await
    }

    pub async fn update_permission(
        &self,
        ctx: &OperationContext,
        cmd: UpdatePermissionCommand,
    ) -> Response<Permission> {
        Response::from(self.directory.update_permission(ctx, cmd).await)
    }

    pub async fn delete_permission(
        &self,
        ctx: &OperationContext,
        permission_id: PermissionId,
    ) -> Response<()> {
        Response::from(self.directory.delete_permission(ctx, permission_id).await)
    }
}
