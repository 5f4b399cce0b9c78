//! 目录服务：用户、组、权限的增删改查
//!
//! 读操作由门面经缓存调用；写操作成功后在这里失效相关缓存键。
//! 写操作的校验受取消信号控制，存储写入一旦开始就不再响应取消。

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uas_common::CursorPage;
use uas_domain_core::Entity;

use super::commands::*;
use super::existence::{require_group, require_permission, require_user};
use super::invalidation;
use super::record;
use super::membership_graph::MembershipGraph;
use super::resolver::PermissionResolver;
use super::views::{GroupView, UserView};
use crate::context::OperationContext;
use crate::domain::{
    CredentialHash, Group, GroupId, Permission, PermissionId, StoreError, StoreSet, User,
    UserFilter, UserId,
};
use crate::error::{AccessError, AccessResult};
use crate::infrastructure::cache::AccessCache;

pub struct DirectoryService {
    stores: StoreSet,
    graph: Arc<MembershipGraph>,
    resolver: Arc<PermissionResolver>,
    cache: Arc<AccessCache>,
}

impl DirectoryService {
    pub fn new(
        stores: StoreSet,
        graph: Arc<MembershipGraph>,
        resolver: Arc<PermissionResolver>,
        cache: Arc<AccessCache>,
    ) -> Self {
        Self {
            stores,
            graph,
            resolver,
            cache,
        }
    }

    // ============ 用户 ============

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn create_user(
        &self,
        ctx: &OperationContext,
        cmd: CreateUserCommand,
    ) -> AccessResult<UserView> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    let credential = CredentialHash::hash(&cmd.password)?;
                    Ok(User::new(cmd.username.clone(), cmd.email.clone(), credential))
                },
                move |user| async move {
                    let username = user.username.clone();
                    self.stores
                        .users
                        .add(user, ctx.actor())
                        .await
                        .map_err(|e| duplicate_username(e, &username))
                },
            )
            .await;
        let user = record("create_user", outcome)?;

        info!(user_id = %user.user_id(), username = %user.username, "User created");
        self.user_view(user).await
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: UserId) -> AccessResult<UserView> {
        let user = require_user(&self.stores, user_id).await?;
        self.user_view(user).await
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_username(&self, username: &str) -> AccessResult<UserView> {
        let user = self
            .stores
            .users
            .find(&UserFilter::username(username))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AccessError::NotFound(format!("User '{}'", username)))?;
        self.user_view(user).await
    }

    /// 按 (CreatedAt, Id) 的键集分页
    #[instrument(skip(self))]
    pub async fn list_users(&self, page: CursorPage) -> AccessResult<Vec<UserView>> {
        let users = self
            .stores
            .users
            .find(&UserFilter::created_after(page.after))
            .await?;

        let mut views = Vec::with_capacity(page.limit.min(users.len()));
        for user in users.into_iter().take(page.limit) {
            views.push(self.user_view(user).await?);
        }
        Ok(views)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn update_user(
        &self,
        ctx: &OperationContext,
        cmd: UpdateUserCommand,
    ) -> AccessResult<UserView> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    let mut user = require_user(&self.stores, cmd.user_id).await?;
                    check_version(&user, cmd.expected_version)?;
                    if let Some(username) = &cmd.username {
                        user.username = username.clone();
                    }
                    if let Some(email) = &cmd.email {
                        user.email = email.clone();
                    }
                    Ok(user)
                },
                move |user| async move {
                    let username = user.username.clone();
                    self.stores
                        .users
                        .update(user, ctx.actor())
                        .await
                        .map_err(|e| duplicate_username(e, &username))
                },
            )
            .await;
        let user = record("update_user", outcome)?;

        self.invalidate_user(user.user_id()).await;
        info!(user_id = %user.user_id(), version = user.version(), "User updated");
        self.user_view(user).await
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn set_lock_status(
        &self,
        ctx: &OperationContext,
        cmd: SetLockStatusCommand,
    ) -> AccessResult<UserView> {
        let outcome = ctx
            .commit(
                async {
                    let mut user = require_user(&self.stores, cmd.user_id).await?;
                    user.lock_status = cmd.lock_status;
                    Ok(user)
                },
                move |user| async move {
                    self.stores
                        .users
                        .update(user, ctx.actor())
                        .await
                        .map_err(AccessError::from)
                },
            )
            .await;
        let user = record("set_lock_status", outcome)?;

        self.invalidate_user(user.user_id()).await;
        info!(user_id = %user.user_id(), lock_status = ?user.lock_status, "User lock status changed");
        self.user_view(user).await
    }

    /// 软删除用户，关联行保留，解析时随用户一起失效
    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn delete_user(&self, ctx: &OperationContext, user_id: UserId) -> AccessResult<()> {
        let outcome = ctx
            .commit(require_user(&self.stores, user_id), move |_| async move {
                self.stores
                    .users
                    .delete(user_id.0, ctx.actor())
                    .await
                    .map_err(AccessError::from)
            })
            .await;
        record("delete_user", outcome)?;

        self.invalidate_user(user_id).await;
        info!(user_id = %user_id, "User deleted");
        Ok(())
    }

    /// 用户所在组
    #[instrument(skip(self))]
    pub async fn list_user_groups(&self, user_id: UserId) -> AccessResult<Vec<GroupView>> {
        let groups = self.resolver.user_groups(user_id).await?;
        let mut views = Vec::with_capacity(groups.len());
        for group in groups {
            views.push(self.group_view(group).await?);
        }
        Ok(views)
    }

    // ============ 组 ============

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn create_group(
        &self,
        ctx: &OperationContext,
        cmd: CreateGroupCommand,
    ) -> AccessResult<GroupView> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    Ok(Group::new(cmd.name.clone(), cmd.description.clone()))
                },
                move |group| async move {
                    self.stores
                        .groups
                        .add(group, ctx.actor())
                        .await
                        .map_err(AccessError::from)
                },
            )
            .await;
        let group = record("create_group", outcome)?;

        self.cache
            .invalidate(&invalidation::group_changed(group.group_id(), &[]))
            .await;
        info!(group_id = %group.group_id(), name = %group.name, "Group created");
        self.group_view(group).await
    }

    #[instrument(skip(self))]
    pub async fn get_group(&self, group_id: GroupId) -> AccessResult<GroupView> {
        let group = require_group(&self.stores, group_id).await?;
        self.group_view(group).await
    }

    /// 全部组，按组名排序
    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> AccessResult<Vec<GroupView>> {
        let mut groups = self.stores.groups.get_all().await?;
        groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.meta.id.cmp(&b.meta.id)));

        let mut views = Vec::with_capacity(groups.len());
        for group in groups {
            views.push(self.group_view(group).await?);
        }
        Ok(views)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn update_group(
        &self,
        ctx: &OperationContext,
        cmd: UpdateGroupCommand,
    ) -> AccessResult<GroupView> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    let mut group = require_group(&self.stores, cmd.group_id).await?;
                    check_version(&group, cmd.expected_version)?;
                    if let Some(name) = &cmd.name {
                        group.name = name.clone();
                    }
                    if let Some(description) = &cmd.description {
                        group.description = description.clone();
                    }
                    Ok(group)
                },
                move |group| async move {
                    self.stores
                        .groups
                        .update(group, ctx.actor())
                        .await
                        .map_err(AccessError::from)
                },
            )
            .await;
        let group = record("update_group", outcome)?;

        self.invalidate_group(group.group_id()).await;
        info!(group_id = %group.group_id(), version = group.version(), "Group updated");
        self.group_view(group).await
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn delete_group(
        &self,
        ctx: &OperationContext,
        group_id: GroupId,
    ) -> AccessResult<()> {
        let outcome = ctx
            .commit(require_group(&self.stores, group_id), move |_| async move {
                self.stores
                    .groups
                    .delete(group_id.0, ctx.actor())
                    .await
                    .map_err(AccessError::from)
            })
            .await;
        record("delete_group", outcome)?;

        self.invalidate_group(group_id).await;
        info!(group_id = %group_id, "Group deleted");
        Ok(())
    }

    /// 组内成员
    #[instrument(skip(self))]
    pub async fn list_group_members(&self, group_id: GroupId) -> AccessResult<Vec<UserView>> {
        let users = self.resolver.group_members(group_id).await?;
        let mut views = Vec::with_capacity(users.len());
        for user in users {
            views.push(self.user_view(user).await?);
        }
        Ok(views)
    }

    // ============ 权限 ============

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn create_permission(
        &self,
        ctx: &OperationContext,
        cmd: CreatePermissionCommand,
    ) -> AccessResult<Permission> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    Ok(Permission::new(cmd.name.clone(), cmd.description.clone())
                        .with_flags(cmd.read_only, cmd.write_only))
                },
                move |permission| async move {
                    self.stores
                        .permissions
                        .add(permission, ctx.actor())
                        .await
                        .map_err(AccessError::from)
                },
            )
            .await;
        let permission = record("create_permission", outcome)?;

        self.cache
            .invalidate(&invalidation::permission_changed(permission.permission_id(), &[], &[]))
            .await;
        info!(permission_id = %permission.permission_id(), name = %permission.name, "Permission created");
        Ok(permission)
    }

    #[instrument(skip(self))]
    pub async fn get_permission(&self, permission_id: PermissionId) -> AccessResult<Permission> {
        require_permission(&self.stores, permission_id).await
    }

    /// 全部权限，按名称排序
    #[instrument(skip(self))]
    pub async fn list_permissions(&self) -> AccessResult<Vec<Permission>> {
        let mut permissions = self.stores.permissions.get_all().await?;
        permissions.sort_by(|a, b| a.name.cmp(&b.name).then(a.meta.id.cmp(&b.meta.id)));
        Ok(permissions)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn update_permission(
        &self,
        ctx: &OperationContext,
        cmd: UpdatePermissionCommand,
    ) -> AccessResult<Permission> {
        let outcome = ctx
            .commit(
                async {
                    cmd.validate()?;
                    let mut permission = require_permission(&self.stores, cmd.permission_id).await?;
                    check_version(&permission, cmd.expected_version)?;
                    if let Some(name) = &cmd.name {
                        permission.name = name.clone();
                    }
                    if let Some(description) = &cmd.description {
                        permission.description = description.clone();
                    }
                    if let Some(read_only) = cmd.read_only {
                        permission.read_only = read_only;
                    }
                    if let Some(write_only) = cmd.write_only {
                        permission.write_only = write_only;
                    }
                    Ok(permission)
                },
                move |permission| async move {
                    self.stores
                        .permissions
                        .update(permission, ctx.actor())
                        .await
                        .map_err(AccessError::from)
                },
            )
            .await;
        let permission = record("update_permission", outcome)?;

        self.invalidate_permission(permission.permission_id()).await;
        info!(permission_id = %permission.permission_id(), version = permission.version(), "Permission updated");
        Ok(permission)
    }

    #[instrument(skip(self, ctx), fields(actor = %ctx.actor()))]
    pub async fn delete_permission(
        &self,
        ctx: &OperationContext,
        permission_id: PermissionId,
    ) -> AccessResult<()> {
        let outcome = ctx
            .commit(require_permission(&self.stores, permission_id), move |_| async move {
                self.stores
                    .permissions
                    .delete(permission_id.0, ctx.actor())
                    .await
                    .map_err(AccessError::from)
            })
            .await;
        record("delete_permission", outcome)?;

        self.invalidate_permission(permission_id).await;
        info!(permission_id = %permission_id, "Permission deleted");
        Ok(())
    }

    // ============ 视图与失效 ============

    async fn user_view(&self, user: User) -> AccessResult<UserView> {
        let user_id = user.user_id();
        let group_ids = self
            .graph
            .active_memberships_of_user(user_id)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();
        let permission_ids = self
            .graph
            .active_user_permissions(user_id)
            .await?
            .into_iter()
            .map(|up| up.permission_id)
            .collect();

        Ok(UserView {
            id: user_id,
            username: user.username,
            email: user.email,
            lock_status: user.lock_status,
            version: user.meta.version,
            created_at: user.meta.created_at,
            edited_at: user.meta.edited_at,
            group_ids,
            permission_ids,
        })
    }

    async fn group_view(&self, group: Group) -> AccessResult<GroupView> {
        let group_id = group.group_id();
        let member_ids = self
            .graph
            .active_members_of_group(group_id)
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect();
        let permission_ids = self
            .graph
            .active_group_permissions(group_id)
            .await?
            .into_iter()
            .map(|gp| gp.permission_id)
            .collect();

        Ok(GroupView {
            id: group_id,
            name: group.name,
            description: group.description,
            version: group.meta.version,
            member_ids,
            permission_ids,
        })
    }

    async fn invalidate_user(&self, user_id: UserId) {
        let groups: Vec<GroupId> = match self.graph.active_memberships_of_user(user_id).await {
            Ok(rows) => rows.into_iter().map(|m| m.group_id).collect(),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not list groups for invalidation");
                Vec::new()
            }
        };
        self.cache
            .invalidate(&invalidation::user_changed(user_id, &groups))
            .await;
    }

    async fn invalidate_group(&self, group_id: GroupId) {
        let mut users: Vec<UserId> = Vec::new();
        match self.graph.active_members_of_group(group_id).await {
            Ok(rows) => users.extend(rows.into_iter().map(|m| m.user_id)),
            Err(e) => warn!(group_id = %group_id, error = %e, "Could not list members for invalidation"),
        }
        match self.graph.active_user_permissions_in_group(group_id).await {
            Ok(rows) => users.extend(rows.into_iter().map(|up| up.user_id)),
            Err(e) => warn!(group_id = %group_id, error = %e, "Could not list direct grants for invalidation"),
        }
        users.sort();
        users.dedup();
        self.cache
            .invalidate(&invalidation::group_changed(group_id, &users))
            .await;
    }

    async fn invalidate_permission(&self, permission_id: PermissionId) {
        let mut groups: Vec<GroupId> = Vec::new();
        let mut users: Vec<UserId> = Vec::new();

        match self.graph.groups_holding(permission_id).await {
            Ok(rows) => groups.extend(rows.into_iter().map(|gp| gp.group_id)),
            Err(e) => warn!(permission_id = %permission_id, error = %e, "Could not list holder groups"),
        }
        for group in &groups {
            match self.graph.active_members_of_group(*group).await {
                Ok(rows) => users.extend(rows.into_iter().map(|m| m.user_id)),
                Err(e) => warn!(group_id = %group, error = %e, "Could not list members for invalidation"),
            }
        }
        match self.graph.users_holding(permission_id).await {
            Ok(rows) => users.extend(rows.into_iter().map(|up| up.user_id)),
            Err(e) => warn!(permission_id = %permission_id, error = %e, "Could not list holder users"),
        }
        users.sort();
        users.dedup();

        self.cache
            .invalidate(&invalidation::permission_changed(permission_id, &groups, &users))
            .await;
    }
}

fn check_version<T: Entity>(entity: &T, expected: i64) -> AccessResult<()> {
    if entity.version() != expected {
        return Err(AccessError::ConcurrencyConflict(format!(
            "{} {} (expected version {}, found {})",
            T::KIND,
            entity.id(),
            expected,
            entity.version()
        )));
    }
    Ok(())
}

fn duplicate_username(error: StoreError, username: &str) -> AccessError {
    match error {
        StoreError::UniqueViolation { .. } => {
            AccessError::Duplicate(format!("Username '{}'", username))
        }
        other => other.into(),
    }
}
