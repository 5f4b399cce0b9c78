//! domain-core - 跨模块共享的领域核心类型
//!
//! 所有持久化实体共用的基础记录（软删除 + 版本号）与实体 trait

mod entity;
mod record;

pub use entity::*;
pub use record::*;

// Re-export common types
pub use uas_common::ActorId;
