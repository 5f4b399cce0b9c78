//! 权限解析
//!
//! 用户的有效权限 = 直接授予 ∪ 所在组的权限，按权限去重。
//! 同一权限有多个来源时：直接授予优先，其次组 ID 较小者优先。
//! 已删除的组、权限、关联行都不参与解析。

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::instrument;

use super::existence::{require_group, require_user};
use crate::domain::{
    Group, GroupFilter, GroupId, GroupPermissionFilter, MembershipFilter, PermissionFilter,
    PermissionId, PermissionSource, ResolvedPermission, StoreSet, User, UserFilter, UserId,
    UserPermissionFilter,
};
use crate::error::AccessResult;

pub struct PermissionResolver {
    stores: StoreSet,
}

impl PermissionResolver {
    pub fn new(stores: StoreSet) -> Self {
        Self { stores }
    }

    /// 用户的有效权限
    #[instrument(skip(self))]
    pub async fn resolve_user(&self, user_id: UserId) -> AccessResult<Vec<ResolvedPermission>> {
        require_user(&self.stores, user_id).await?;

        let memberships = self
            .stores
            .memberships
            .find(&MembershipFilter::user(user_id))
            .await?;
        let direct = self
            .stores
            .user_permissions
            .find(&UserPermissionFilter::user(user_id))
            .await?;

        let referenced: Vec<GroupId> = memberships
            .iter()
            .map(|m| m.group_id)
            .chain(direct.iter().map(|up| up.group_id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let live = self.live_group_ids(referenced).await?;

        let mut candidates = Vec::new();
        for grant in direct.iter().filter(|up| live.contains(&up.group_id)) {
            candidates.push((grant.permission_id, PermissionSource::direct(grant.group_id)));
        }
        for membership in memberships.iter().filter(|m| live.contains(&m.group_id)) {
            let inherited = self
                .stores
                .group_permissions
                .find(&GroupPermissionFilter::group(membership.group_id))
                .await?;
            for grant in inherited {
                candidates.push((
                    grant.permission_id,
                    PermissionSource::inherited(membership.group_id),
                ));
            }
        }

        self.materialise(candidates).await
    }

    /// 组的有效权限
    #[instrument(skip(self))]
    pub async fn resolve_group(&self, group_id: GroupId) -> AccessResult<Vec<ResolvedPermission>> {
        require_group(&self.stores, group_id).await?;

        let candidates = self
            .stores
            .group_permissions
            .find(&GroupPermissionFilter::group(group_id))
            .await?
            .into_iter()
            .map(|grant| (grant.permission_id, PermissionSource::inherited(group_id)))
            .collect();

        self.materialise(candidates).await
    }

    /// 用户是否拥有指定名称的权限
    #[instrument(skip(self))]
    pub async fn user_has_permission(&self, user_id: UserId, name: &str) -> AccessResult<bool> {
        Ok(self
            .resolve_user(user_id)
            .await?
            .iter()
            .any(|resolved| resolved.permission.name == name))
    }

    /// 用户所在的未删除组，按组名排序
    #[instrument(skip(self))]
    pub async fn user_groups(&self, user_id: UserId) -> AccessResult<Vec<Group>> {
        require_user(&self.stores, user_id).await?;

        let ids = self
            .stores
            .memberships
            .find(&MembershipFilter::user(user_id))
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut groups = self.stores.groups.find(&GroupFilter::ids(ids)).await?;
        groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.meta.id.cmp(&b.meta.id)));
        Ok(groups)
    }

    /// 组内的未删除用户，按用户名排序
    #[instrument(skip(self))]
    pub async fn group_members(&self, group_id: GroupId) -> AccessResult<Vec<User>> {
        require_group(&self.stores, group_id).await?;

        let ids = self
            .stores
            .memberships
            .find(&MembershipFilter::group(group_id))
            .await?
            .into_iter()
            .map(|m| m.user_id)
            .collect::<Vec<_>>();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut users = self.stores.users.find(&UserFilter::ids(ids)).await?;
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// 组名 → 未删除成员数
    ///
    /// 组名不唯一，同名组的成员数合并计入同一个键。
    #[instrument(skip(self))]
    pub async fn group_user_counts(&self) -> AccessResult<BTreeMap<String, usize>> {
        let groups = self.stores.groups.get_all().await?;
        let live_users: HashSet<UserId> = self
            .stores
            .users
            .get_all()
            .await?
            .iter()
            .map(User::user_id)
            .collect();

        let mut counts = BTreeMap::new();
        for group in groups {
            let members = self
                .stores
                .memberships
                .find(&MembershipFilter::group(group.group_id()))
                .await?
                .into_iter()
                .filter(|m| live_users.contains(&m.user_id))
                .count();
            *counts.entry(group.name).or_insert(0) += members;
        }
        Ok(counts)
    }

    async fn live_group_ids(&self, ids: Vec<GroupId>) -> AccessResult<HashSet<GroupId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        Ok(self
            .stores
            .groups
            .find(&GroupFilter::ids(ids))
            .await?
            .iter()
            .map(Group::group_id)
            .collect())
    }

    /// 去重、加载权限实体并排序
    async fn materialise(
        &self,
        candidates: Vec<(PermissionId, PermissionSource)>,
    ) -> AccessResult<Vec<ResolvedPermission>> {
        let mut best: HashMap<PermissionId, PermissionSource> = HashMap::new();
        for (permission_id, source) in candidates {
            best.entry(permission_id)
                .and_modify(|current| {
                    if source.outranks(current) {
                        *current = source;
                    }
                })
                .or_insert(source);
        }
        if best.is_empty() {
            return Ok(Vec::new());
        }

        let permissions = self
            .stores
            .permissions
            .find(&PermissionFilter::ids(best.keys().copied().collect()))
            .await?;

        let mut resolved: Vec<ResolvedPermission> = permissions
            .into_iter()
            .filter_map(|permission| {
                best.get(&permission.permission_id()).map(|source| ResolvedPermission {
                    permission,
                    source: *source,
                })
            })
            .collect();
        resolved.sort_by(|a, b| {
            a.permission
                .name
                .cmp(&b.permission.name)
                .then(a.permission.meta.id.cmp(&b.permission.meta.id))
        });
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialHash, Permission, PermissionSourceType};
    use crate::error::AccessError;
    use crate::application::membership_graph::MembershipGraph;
    use uas_common::ActorId;
    use uas_domain_core::Entity;

    struct Fixture {
        stores: StoreSet,
        graph: MembershipGraph,
        resolver: PermissionResolver,
    }

    impl Fixture {
        fn new() -> Self {
            let stores = StoreSet::in_memory();
            Self {
                graph: MembershipGraph::new(stores.clone()),
                resolver: PermissionResolver::new(stores.clone()),
                stores,
            }
        }

        async fn user(&self, name: &str) -> UserId {
            let email = format!("{name}@example.com");
            let user = User::new(name, email, CredentialHash::from_hash("h"));
            self.stores.users.add(user, ActorId::system()).await.unwrap().user_id()
        }

        async fn group(&self, name: &str) -> GroupId {
            self.stores
                .groups
                .add(Group::new(name, ""), ActorId::system())
                .await
                .unwrap()
                .group_id()
        }

        async fn permission(&self, name: &str) -> PermissionId {
            self.stores
                .permissions
                .add(Permission::new(name, ""), ActorId::system())
                .await
                .unwrap()
                .permission_id()
        }
    }

    #[tokio::test]
    async fn test_union_deduplicates_and_prefers_direct_grant() {
        let fx = Fixture::new();
        let by = ActorId::system();
        let user = fx.user("alice").await;
        let (g1, g2) = (fx.group("G1").await, fx.group("G2").await);
        let (p1, p2) = (fx.permission("P1").await, fx.permission("P2").await);

        fx.graph.grant_membership(user, g1, by).await.unwrap();
        fx.graph.grant_membership(user, g2, by).await.unwrap();
        fx.graph.grant_group_permission(g1, p1, by).await.unwrap();
        fx.graph.grant_group_permission(g2, p2, by).await.unwrap();
        fx.graph.grant_user_permission(user, g2, p1, by).await.unwrap();

        let resolved = fx.resolver.resolve_user(user).await.unwrap();
        let names: Vec<_> = resolved.iter().map(|r| r.permission.name.as_str()).collect();
        assert_eq!(names, vec!["P1", "P2"]);

        let p1_source = resolved[0].source;
        assert_eq!(p1_source.source_type, PermissionSourceType::UserInGroup);
        assert_eq!(p1_source.source_group_id, g2);
        assert_eq!(resolved[1].source, PermissionSource::inherited(g2));
    }

    #[tokio::test]
    async fn test_inherited_tie_breaks_on_smallest_group_id() {
        let fx = Fixture::new();
        let by = ActorId::system();
        let user = fx.user("bob").await;
        let (a, b) = (fx.group("A").await, fx.group("B").await);
        let perm = fx.permission("Shared").await;

        for group in [a, b] {
            fx.graph.grant_membership(user, group, by).await.unwrap();
            fx.graph.grant_group_permission(group, perm, by).await.unwrap();
        }

        let resolved = fx.resolver.resolve_user(user).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].source.source_group_id, a.min(b));
    }

    #[tokio::test]
    async fn test_revoked_membership_stops_inheritance() {
        let fx = Fixture::new();
        let by = ActorId::system();
        let user = fx.user("carol").await;
        let group = fx.group("G").await;
        let perm = fx.permission("P").await;

        fx.graph.grant_membership(user, group, by).await.unwrap();
        fx.graph.grant_group_permission(group, perm, by).await.unwrap();
        assert_eq!(fx.resolver.resolve_user(user).await.unwrap().len(), 1);

        fx.graph.revoke_membership(user, group, by).await.unwrap();
        assert!(fx.resolver.resolve_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tombstoned_group_and_permission_are_excluded() {
        let fx = Fixture::new();
        let by = ActorId::system();
        let user = fx.user("dave").await;
        let (g1, g2) = (fx.group("G1").await, fx.group("G2").await);
        let (p1, p2) = (fx.permission("P1").await, fx.permission("P2").await);

        fx.graph.grant_membership(user, g1, by).await.unwrap();
        fx.graph.grant_group_permission(g1, p1, by).await.unwrap();
        fx.graph.grant_user_permission(user, g2, p2, by).await.unwrap();
        assert_eq!(fx.resolver.resolve_user(user).await.unwrap().len(), 2);

        // 组被删除，关联行仍在，但不再生效
        fx.stores.groups.delete(g2.0, by).await.unwrap();
        let names: Vec<_> = fx
            .resolver
            .resolve_user(user)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.permission.name)
            .collect();
        assert_eq!(names, vec!["P1"]);

        fx.stores.permissions.delete(p1.0, by).await.unwrap();
        assert!(fx.resolver.resolve_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_principals() {
        let fx = Fixture::new();

        let err = fx.resolver.resolve_user(UserId::new()).await.unwrap_err();
        assert!(matches!(err, AccessError::UserNotFound(_)));

        let err = fx.resolver.resolve_group(GroupId::new()).await.unwrap_err();
        assert!(matches!(err, AccessError::GroupNotFound(_)));

        let user = fx.user("erin").await;
        fx.stores.users.delete(user.0, ActorId::system()).await.unwrap();
        let err = fx.resolver.resolve_user(user).await.unwrap_err();
        assert!(matches!(err, AccessError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_group_user_counts_ignore_deleted_users() {
        let fx = Fixture::new();
        let by = ActorId::system();
        let admins = fx.group("Admins").await;
        fx.group("CC").await;
        let (u1, u2) = (fx.user("u1").await, fx.user("u2").await);

        fx.graph.grant_membership(u1, admins, by).await.unwrap();
        fx.graph.grant_membership(u2, admins, by).await.unwrap();
        fx.stores.users.delete(u2.0, by).await.unwrap();

        let counts = fx.resolver.group_user_counts().await.unwrap();
        assert_eq!(counts.get("Admins"), Some(&1));
        assert_eq!(counts.get("CC"), Some(&0));

        let members = fx.resolver.group_members(admins).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id(), u1.0);
        assert!(fx.resolver.user_has_permission(u1, "anything").await.map(|b| !b).unwrap());
    }
}
