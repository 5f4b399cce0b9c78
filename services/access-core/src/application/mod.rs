//! 应用层

pub mod access_control;
pub mod commands;
pub mod directory;
mod existence;
mod invalidation;
pub mod keyed_locks;
pub mod membership_graph;
pub mod mutation;
pub mod resolver;
pub mod views;

pub use access_control::AccessControl;
pub use commands::*;
pub use directory::DirectoryService;
pub use membership_graph::MembershipGraph;
pub use mutation::MutationService;
pub use resolver::PermissionResolver;
pub use views::{GroupView, UserView};

use metrics::counter;
use tracing::warn;

use crate::error::AccessResult;

/// 记录写操作结果的指标与日志
fn record<T>(verb: &'static str, outcome: AccessResult<T>) -> AccessResult<T> {
    match &outcome {
        Ok(_) => counter!("access.mutation.committed", "verb" => verb).increment(1),
        Err(e) => {
            counter!("access.mutation.rejected", "verb" => verb).increment(1);
            warn!(verb, code = ?e.code(), error = %e, "Mutation rejected");
        }
    }
    outcome
}
