//! access-core - 访问控制聚合核心
//!
//! 用户、组、权限三类实体，加上成员关系与授权关系；
//! 解析用户的有效权限（直接授予 ∪ 经组继承），并带来源说明。
//!
//! 所有对外动词返回 [`Response`] 信封，并接受 [`OperationContext`] 作为取消信号。

pub mod application;
pub mod bootstrap;
pub mod context;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod response;
pub mod seed;

pub use application::{AccessControl, GroupView, UserView};
pub use bootstrap::{AccessSystem, AccessSystemBuilder, DEFAULT_CACHE_TTL};
pub use context::OperationContext;
pub use error::{AccessError, AccessResult, ErrorCode};
pub use response::Response;
pub use seed::{SeedReport, apply_seed};
