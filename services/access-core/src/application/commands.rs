//! 命令定义
//!
//! 操作人不在命令里，统一从 `OperationContext` 取。

use crate::domain::group::{GROUP_DESCRIPTION_MAX_LEN, GROUP_NAME_MAX_LEN};
use crate::domain::user::{EMAIL_MAX_LEN, USERNAME_MAX_LEN};
use crate::domain::{GroupId, LockStatus, PermissionId, UserId};
use crate::error::{AccessError, AccessResult};

// ============ 关联授予 / 撤销 ============

/// 把用户加入组
#[derive(Debug, Clone, Copy)]
pub struct GrantUserToGroupCommand {
    pub user_id: UserId,
    pub group_id: GroupId,
}

/// 把用户移出组
#[derive(Debug, Clone, Copy)]
pub struct RevokeUserFromGroupCommand {
    pub user_id: UserId,
    pub group_id: GroupId,
}

/// 授予组权限
#[derive(Debug, Clone, Copy)]
pub struct GrantPermissionToGroupCommand {
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

/// 撤销组权限
#[derive(Debug, Clone, Copy)]
pub struct RevokePermissionFromGroupCommand {
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

/// 在组上下文中直接授予用户权限
#[derive(Debug, Clone, Copy)]
pub struct GrantPermissionToUserCommand {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

/// 撤销用户的直接权限
#[derive(Debug, Clone, Copy)]
pub struct RevokePermissionFromUserCommand {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub permission_id: PermissionId,
}

// ============ 用户 ============

fn check_username(username: &str) -> AccessResult<()> {
    if username.trim().is_empty() {
        return Err(AccessError::validation("Username cannot be empty"));
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(AccessError::validation(format!(
            "Username cannot exceed {} characters",
            USERNAME_MAX_LEN
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> AccessResult<()> {
    if !email.contains('@') {
        return Err(AccessError::validation("Email must contain '@'"));
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(AccessError::validation(format!(
            "Email cannot exceed {} characters",
            EMAIL_MAX_LEN
        )));
    }
    Ok(())
}

/// 创建用户
#[derive(Clone)]
pub struct CreateUserCommand {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for CreateUserCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserCommand")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl CreateUserCommand {
    pub fn validate(&self) -> AccessResult<()> {
        check_username(&self.username)?;
        check_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AccessError::validation("Password cannot be empty"));
        }
        Ok(())
    }
}

/// 更新用户资料
#[derive(Debug, Clone)]
pub struct UpdateUserCommand {
    pub user_id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub expected_version: i64,
}

impl UpdateUserCommand {
    pub fn validate(&self) -> AccessResult<()> {
        if let Some(username) = &self.username {
            check_username(username)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        Ok(())
    }
}

/// 设置锁定状态
#[derive(Debug, Clone, Copy)]
pub struct SetLockStatusCommand {
    pub user_id: UserId,
    pub lock_status: LockStatus,
}

// ============ 组 ============

fn check_group_fields(name: Option<&str>, description: Option<&str>) -> AccessResult<()> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(AccessError::validation("Group name cannot be empty"));
        }
        if name.chars().count() > GROUP_NAME_MAX_LEN {
            return Err(AccessError::validation(format!(
                "Group name cannot exceed {} characters",
                GROUP_NAME_MAX_LEN
            )));
        }
    }
    if let Some(description) = description
        && description.chars().count() > GROUP_DESCRIPTION_MAX_LEN
    {
        return Err(AccessError::validation(format!(
            "Group description cannot exceed {} characters",
            GROUP_DESCRIPTION_MAX_LEN
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CreateGroupCommand {
    pub name: String,
    pub description: String,
}

impl CreateGroupCommand {
    pub fn validate(&self) -> AccessResult<()> {
        check_group_fields(Some(&self.name), Some(&self.description))
    }
}

#[derive(Debug, Clone)]
pub struct UpdateGroupCommand {
    pub group_id: GroupId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub expected_version: i64,
}

impl UpdateGroupCommand {
    pub fn validate(&self) -> AccessResult<()> {
        check_group_fields(self.name.as_deref(), self.description.as_deref())
    }
}

// ============ 权限 ============

#[derive(Debug, Clone)]
pub struct CreatePermissionCommand {
    pub name: String,
    pub description: String,
    pub read_only: bool,
    pub write_only: bool,
}

impl CreatePermissionCommand {
    pub fn validate(&self) -> AccessResult<()> {
        if self.name.trim().is_empty() {
            return Err(AccessError::validation("Permission name cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpdatePermissionCommand {
    pub permission_id: PermissionId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub read_only: Option<bool>,
    pub write_only: Option<bool>,
    pub expected_version: i64,
}

impl UpdatePermissionCommand {
    pub fn validate(&self) -> AccessResult<()> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(AccessError::validation("Permission name cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_user_limits() {
        let mut cmd = CreateUserCommand {
            username: "SU".into(),
            email: "su@example.com".into(),
            password: "pw".into(),
        };
        assert!(cmd.validate().is_ok());

        cmd.username = "x".repeat(21);
        assert!(matches!(cmd.validate(), Err(AccessError::Validation(_))));

        cmd.username = "SU".into();
        cmd.email = format!("{}@example.com", "e".repeat(60));
        assert!(cmd.validate().is_err());

        cmd.email = "no-at-sign".into();
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_create_user_debug_hides_password() {
        let cmd = CreateUserCommand {
            username: "SU".into(),
            email: "su@example.com".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", cmd).contains("hunter2"));
    }

    #[test]
    fn test_group_limits() {
        let ok = CreateGroupCommand {
            name: "x".repeat(20),
            description: "d".repeat(150),
        };
        assert!(ok.validate().is_ok());

        let long_name = CreateGroupCommand {
            name: "x".repeat(21),
            description: String::new(),
        };
        assert!(long_name.validate().is_err());

        let long_desc = UpdateGroupCommand {
            group_id: GroupId::new(),
            name: None,
            description: Some("d".repeat(151)),
            expected_version: 1,
        };
        assert!(long_desc.validate().is_err());
    }
}
