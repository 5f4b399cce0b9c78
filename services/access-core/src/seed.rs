//! 初始数据
//!
//! 按名称匹配已有实体，重复执行不会产生重复数据。

use tracing::{debug, info};

use crate::application::{
    CreateGroupCommand, CreatePermissionCommand, CreateUserCommand, GrantPermissionToGroupCommand,
    GrantUserToGroupCommand,
};
use crate::bootstrap::AccessSystem;
use crate::context::OperationContext;
use crate::domain::{GroupFilter, PermissionFilter, UserFilter, UserId};
use crate::error::{AccessError, AccessResult};

const SEED_PERMISSIONS: &[(&str, &str, bool, bool)] = &[
    ("All", "All permissions", false, false),
    ("AccountLookup_Level1", "Level 1 permission", true, false),
    ("SU", "Not so super user", false, true),
    ("Level 2", "Poor user permission pack", true, true),
];

const SEED_GROUPS: &[(&str, &str)] = &[("Admins", "High Tower"), ("CC", "Call center")];

const SEED_USER: (&str, &str, &str) = ("SU", "null@undefined.com", "ecdsa");

/// 本次执行新建的条目数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub groups: usize,
    pub permissions: usize,
    pub grants: usize,
}

pub async fn apply_seed(system: &AccessSystem, ctx: &OperationContext) -> AccessResult<SeedReport> {
    let mut report = SeedReport::default();

    let mut permission_ids = Vec::new();
    ctx.ensure_active()?;
    for (name, description, read_only, write_only) in SEED_PERMISSIONS {
        let existing = system
            .stores
            .permissions
            .find(&PermissionFilter::name(*name))
            .await?
            .into_iter()
            .next();
        let id = match existing {
            Some(permission) => permission.permission_id(),
            None => {
                let cmd = CreatePermissionCommand {
                    name: name.to_string(),
                    description: description.to_string(),
                    read_only: *read_only,
                    write_only: *write_only,
                };
                report.permissions += 1;
                system.directory.create_permission(ctx, cmd).await?.permission_id()
            }
        };
        permission_ids.push((*name, id));
    }

    let mut group_ids = Vec::new();
    ctx.ensure_active()?;
    for (name, description) in SEED_GROUPS {
        let existing = system
            .stores
            .groups
            .find(&GroupFilter::name(*name))
            .await?
            .into_iter()
            .next();
        let id = match existing {
            Some(group) => group.group_id(),
            None => {
                let cmd = CreateGroupCommand {
                    name: name.to_string(),
                    description: description.to_string(),
                };
                report.groups += 1;
                system.directory.create_group(ctx, cmd).await?.id
            }
        };
        group_ids.push((*name, id));
    }

    ctx.ensure_active()?;
    let (username, email, password) = SEED_USER;
    let existing = system
        .stores
        .users
        .find(&UserFilter::username(username))
        .await?
        .into_iter()
        .next();
    let su: UserId = match existing {
        Some(user) => user.user_id(),
        None => {
            let cmd = CreateUserCommand {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            };
            report.users += 1;
            system.directory.create_user(ctx, cmd).await?.id
        }
    };

    let admins = lookup(&group_ids, "Admins")?;
    let all = lookup(&permission_ids, "All")?;

    let grants = [
        system
            .mutations
            .grant_user_to_group(ctx, GrantUserToGroupCommand { user_id: su, group_id: admins })
            .await
            .map(|_| ()),
        system
            .mutations
            .grant_permission_to_group(
                ctx,
                GrantPermissionToGroupCommand {
                    group_id: admins,
                    permission_id: all,
                },
            )
            .await
            .map(|_| ()),
    ];
    for outcome in grants {
        match outcome {
            Ok(()) => report.grants += 1,
            Err(AccessError::AlreadyGranted(what)) => debug!(what = %what, "Seed grant already present"),
            Err(e) => return Err(e),
        }
    }

    info!(?report, "Seed data applied");
    Ok(report)
}

fn lookup<T: Copy>(entries: &[(&str, T)], name: &str) -> AccessResult<T> {
    entries
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
        .ok_or_else(|| AccessError::unexpected(format!("seed entry '{}' missing", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let system = AccessSystem::in_memory();
        let ctx = OperationContext::new();

        let first = apply_seed(&system, &ctx).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                users: 1,
                groups: 2,
                permissions: 4,
                grants: 2
            }
        );

        let second = apply_seed(&system, &ctx).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(system.stores.permissions.get_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_seed_flags() {
        let system = AccessSystem::in_memory();
        apply_seed(&system, &OperationContext::new()).await.unwrap();

        let level2 = system
            .stores
            .permissions
            .find(&PermissionFilter::name("Level 2"))
            .await
            .unwrap()
            .remove(0);
        assert!(level2.read_only && level2.write_only);

        let su = system
            .stores
            .permissions
            .find(&PermissionFilter::name("SU"))
            .await
            .unwrap()
            .remove(0);
        assert!(!su.read_only && su.write_only);
    }

    #[tokio::test]
    async fn test_cancelled_seed_writes_nothing() {
        let system = AccessSystem::in_memory();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let ctx = OperationContext::new().with_cancellation(token);

        let err = apply_seed(&system, &ctx).await.unwrap_err();
        assert!(matches!(err, AccessError::Cancelled));
        assert_eq!(system.stores.permissions.count(&Default::default()).await.unwrap(), 0);
    }
}
