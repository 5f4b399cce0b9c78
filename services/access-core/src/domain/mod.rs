//! 领域层

/// 定义基于 UUID 的强类型 ID
macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uas_common::new_id())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

pub mod group;
pub mod membership;
pub mod permission;
pub mod repository;
pub mod user;

pub use group::{Group, GroupFilter, GroupId};
pub use membership::{
    GroupPermission, GroupPermissionFilter, JoinRecord, MembershipFilter, UserGroupMembership,
    UserPermission, UserPermissionFilter,
};
pub use permission::{
    Permission, PermissionFilter, PermissionId, PermissionSource, PermissionSourceType,
    ResolvedPermission,
};
pub use repository::{EntityStore, Queryable, StoreError, StoreResult, StoreSet};
pub use user::{CredentialHash, LockStatus, User, UserFilter, UserId};
