//! 各类变更需要失效的缓存键

use std::collections::HashSet;

use crate::domain::{Group, GroupId, Permission, PermissionId, User, UserId};
use crate::infrastructure::cache::CacheKey;
use uas_domain_core::Entity;

/// 成员关系变化
///
/// `user_groups` 为用户当前所在的组，`group_members` 为组的当前成员；
/// 它们的聚合视图分别携带 `member_ids` 与 `group_ids`。
pub fn membership_changed(
    user_id: UserId,
    group_id: GroupId,
    user_groups: &[GroupId],
    group_members: &[UserId],
) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(User::KIND, user_id.0),
        CacheKey::GetById(Group::KIND, group_id.0),
        CacheKey::GetAll(Group::KIND),
        CacheKey::GroupUserCounts,
        CacheKey::ResolveUser(user_id.0),
        CacheKey::UserGroups(user_id.0),
        CacheKey::GroupMembers(group_id.0),
    ];
    keys.extend(group_members.iter().map(|m| CacheKey::UserGroups(m.0)));
    keys.extend(user_groups.iter().map(|g| CacheKey::GroupMembers(g.0)));
    dedup(keys)
}

/// 组权限变化会影响组内每个成员的解析结果和组列表
pub fn group_permission_changed(
    group_id: GroupId,
    permission_id: PermissionId,
    members: &[UserId],
) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(Group::KIND, group_id.0),
        CacheKey::GetAll(Group::KIND),
        CacheKey::GetById(Permission::KIND, permission_id.0),
        CacheKey::ResolveGroup(group_id.0),
    ];
    for member in members {
        keys.push(CacheKey::ResolveUser(member.0));
        keys.push(CacheKey::UserGroups(member.0));
    }
    keys
}

/// 直接授权变化；`user_groups` 的成员列表中携带该用户的直接权限
pub fn user_permission_changed(
    user_id: UserId,
    group_id: GroupId,
    permission_id: PermissionId,
    user_groups: &[GroupId],
) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(User::KIND, user_id.0),
        CacheKey::GetById(Group::KIND, group_id.0),
        CacheKey::GetById(Permission::KIND, permission_id.0),
        CacheKey::ResolveUser(user_id.0),
        CacheKey::GroupMembers(group_id.0),
    ];
    keys.extend(user_groups.iter().map(|g| CacheKey::GroupMembers(g.0)));
    dedup(keys)
}

/// 用户资料或状态变化
pub fn user_changed(user_id: UserId, groups: &[GroupId]) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(User::KIND, user_id.0),
        CacheKey::ResolveUser(user_id.0),
        CacheKey::UserGroups(user_id.0),
        CacheKey::GroupUserCounts,
    ];
    for group in groups {
        keys.push(CacheKey::GetById(Group::KIND, group.0));
        keys.push(CacheKey::GroupMembers(group.0));
    }
    if !groups.is_empty() {
        keys.push(CacheKey::GetAll(Group::KIND));
    }
    keys
}

/// 组资料变化或删除
pub fn group_changed(group_id: GroupId, affected_users: &[UserId]) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(Group::KIND, group_id.0),
        CacheKey::GetAll(Group::KIND),
        CacheKey::GroupUserCounts,
        CacheKey::ResolveGroup(group_id.0),
        CacheKey::GroupMembers(group_id.0),
    ];
    for user in affected_users {
        keys.push(CacheKey::GetById(User::KIND, user.0));
        keys.push(CacheKey::ResolveUser(user.0));
        keys.push(CacheKey::UserGroups(user.0));
    }
    keys
}

/// 权限资料变化或删除：所有持有者的解析结果都要失效
pub fn permission_changed(
    permission_id: PermissionId,
    holder_groups: &[GroupId],
    affected_users: &[UserId],
) -> Vec<CacheKey> {
    let mut keys = vec![
        CacheKey::GetById(Permission::KIND, permission_id.0),
        CacheKey::GetAll(Permission::KIND),
    ];
    for group in holder_groups {
        keys.push(CacheKey::GetById(Group::KIND, group.0));
        keys.push(CacheKey::ResolveGroup(group.0));
    }
    if !holder_groups.is_empty() {
        keys.push(CacheKey::GetAll(Group::KIND));
    }
    for user in affected_users {
        keys.push(CacheKey::GetById(User::KIND, user.0));
        keys.push(CacheKey::ResolveUser(user.0));
    }
    keys
}

fn dedup(keys: Vec<CacheKey>) -> Vec<CacheKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_permission_change_reaches_members() {
        let (group, perm) = (GroupId::new(), PermissionId::new());
        let members = [UserId::new(), UserId::new()];

        let keys = group_permission_changed(group, perm, &members);
        for member in members {
            assert!(keys.contains(&CacheKey::ResolveUser(member.0)));
        }
        assert!(keys.contains(&CacheKey::ResolveGroup(group.0)));
    }

    #[test]
    fn test_group_permission_change_drops_member_group_lists() {
        let (group, perm) = (GroupId::new(), PermissionId::new());
        let member = UserId::new();

        let keys = group_permission_changed(group, perm, &[member]);
        assert!(keys.contains(&CacheKey::UserGroups(member.0)));
    }

    #[test]
    fn test_membership_change_covers_both_sides() {
        let (user, group) = (UserId::new(), GroupId::new());
        let other_group = GroupId::new();
        let other_member = UserId::new();

        let keys = membership_changed(user, group, &[group, other_group], &[user, other_member]);
        assert!(keys.contains(&CacheKey::ResolveUser(user.0)));
        assert!(keys.contains(&CacheKey::GroupMembers(group.0)));
        assert!(keys.contains(&CacheKey::GroupUserCounts));
        assert!(keys.contains(&CacheKey::UserGroups(other_member.0)));
        assert!(keys.contains(&CacheKey::GroupMembers(other_group.0)));

        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_user_permission_change_drops_member_lists_of_user_groups() {
        let (user, group, perm) = (UserId::new(), GroupId::new(), PermissionId::new());
        let other_group = GroupId::new();

        let keys = user_permission_changed(user, group, perm, &[other_group]);
        assert!(keys.contains(&CacheKey::GroupMembers(group.0)));
        assert!(keys.contains(&CacheKey::GroupMembers(other_group.0)));
        assert!(!keys.contains(&CacheKey::UserGroups(user.0)));
    }
}
