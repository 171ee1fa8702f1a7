//! Facilitators: pluggable strategy deciding how a node's work is carried
//! out (inline, out of process, remote task, or fan-out to children).

pub mod children;
pub mod registry;
pub mod step;

pub use children::{AllSucceedCombiner, AnySucceedCombiner, ChildCombiner, ChildrenFacilitator};
pub use registry::FacilitatorRegistry;
pub use step::{AsyncFacilitator, StepExecutor, StepInput, StepOutcome, SyncFacilitator, TaskFacilitator};

use crate::core::{ExecutionStatus, FailureInfo, NodeExecution};
use crate::errors::OrchestrationError;
use crate::plan::PlanNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Type tag identifying a facilitator implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilitatorType {
    /// The caller computes the outcome inline.
    Sync,
    /// Execution happens out of process; completion arrives later.
    Async,
    /// Work is handed to a remote executor with a correlation token.
    Task,
    /// The node fans out into child node executions.
    Children,
}

impl fmt::Display for FacilitatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Async => write!(f, "async"),
            Self::Task => write!(f, "task"),
            Self::Children => write!(f, "children"),
        }
    }
}

/// How a node's execution will proceed.
#[derive(Clone)]
pub enum FacilitationResponse {
    /// The work completed inline with this outcome.
    Sync {
        /// Terminal status of the work.
        status: ExecutionStatus,
        /// Response payload.
        output: Option<serde_json::Value>,
        /// Failure details when the work failed.
        failure_info: Option<FailureInfo>,
    },
    /// The work runs out of process; a later status update completes it.
    Async,
    /// The work was handed off; the token correlates its completion.
    Task {
        /// Opaque correlation token registered with wait-notify.
        correlation_token: String,
    },
    /// The node fans out into the given children.
    Children {
        /// Plan node ids of the children to schedule.
        child_node_ids: Vec<String>,
        /// Policy computing the parent outcome from child outcomes.
        combiner: Arc<dyn ChildCombiner>,
    },
}

impl fmt::Debug for FacilitationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync { status, .. } => f.debug_struct("Sync").field("status", status).finish(),
            Self::Async => f.debug_struct("Async").finish(),
            Self::Task { correlation_token } => f
                .debug_struct("Task")
                .field("correlation_token", correlation_token)
                .finish(),
            Self::Children { child_node_ids, .. } => f
                .debug_struct("Children")
                .field("child_node_ids", child_node_ids)
                .finish(),
        }
    }
}

/// Pluggable execution strategy for plan nodes.
///
/// Exactly one facilitator is registered per type; resolvability is
/// checked when an execution starts, not mid-run.
#[async_trait]
pub trait Facilitator: Send + Sync {
    /// The type tag this facilitator is registered under.
    fn facilitator_type(&self) -> FacilitatorType;

    /// Decides how the node executes and, for sync modes, runs it.
    async fn facilitate(
        &self,
        node: &NodeExecution,
        plan_node: &PlanNode,
    ) -> Result<FacilitationResponse, OrchestrationError>;

    /// Best-effort cancellation hook for mid-flight external work.
    async fn cancel(&self, _node: &NodeExecution) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facilitator_type_display() {
        assert_eq!(FacilitatorType::Sync.to_string(), "sync");
        assert_eq!(FacilitatorType::Children.to_string(), "children");
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&FacilitatorType::Task).unwrap();
        assert_eq!(json, r#""task""#);
        let back: FacilitatorType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FacilitatorType::Task);
    }
}
