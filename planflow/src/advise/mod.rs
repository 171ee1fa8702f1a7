//! Advisers: pluggable policy deciding the next control-flow action after
//! a node completes.

pub mod ignore;
pub mod registry;
pub mod retry;
pub mod simple;

pub use ignore::IgnoreFailureAdviser;
pub use registry::AdviserRegistry;
pub use retry::{RepairAction, RetryAdviser, RetryAdviserParameters};
pub use simple::{OnAbortAdviser, OnFailAdviser, OnMarkSuccessAdviser, OnSuccessAdviser};

use crate::core::{ExecutionStatus, FailureType, NodeExecution};
use crate::errors::OrchestrationError;
use crate::plan::PlanNode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Type tag identifying an adviser implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviserType {
    /// Retries failed nodes per configured policy.
    Retry,
    /// Converts a failure into an ignore interrupt.
    IgnoreFailure,
    /// Proceeds to the next node on success.
    OnSuccess,
    /// Ends the plan on failure.
    OnFail,
    /// Ends the plan on abort.
    OnAbort,
    /// Marks a failed node successful and proceeds.
    OnMarkSuccess,
}

impl fmt::Display for AdviserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::IgnoreFailure => write!(f, "ignore_failure"),
            Self::OnSuccess => write!(f, "on_success"),
            Self::OnFail => write!(f, "on_fail"),
            Self::OnAbort => write!(f, "on_abort"),
            Self::OnMarkSuccess => write!(f, "on_mark_success"),
        }
    }
}

/// The outcome handed to an adviser once a node reaches a decidable status.
#[derive(Debug, Clone)]
pub struct AdviseEvent {
    /// Snapshot of the completed node execution.
    pub node: NodeExecution,
    /// The plan node definition, including declared edges.
    pub plan_node: PlanNode,
    /// The status that triggered advising.
    pub status: ExecutionStatus,
    /// Failure categories extracted from the node's failure info.
    pub failure_types: Vec<FailureType>,
}

impl AdviseEvent {
    /// Builds an advise event from a node execution and its plan node.
    #[must_use]
    pub fn new(node: NodeExecution, plan_node: PlanNode) -> Self {
        let status = node.status;
        let failure_types = node
            .failure_info
            .as_ref()
            .map(|f| f.failure_types.clone())
            .unwrap_or_default();
        Self {
            node,
            plan_node,
            status,
            failure_types,
        }
    }
}

/// The decision an adviser produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdviserResponse {
    /// Proceed to the given node, or finish the current scope when `None`.
    NextStep {
        /// The node to proceed to.
        next_node_id: Option<String>,
    },
    /// Re-arm the same node for another attempt after `wait`.
    Retry {
        /// The node execution to retry.
        node_execution_id: Uuid,
        /// Delay before the fresh attempt.
        wait: Duration,
    },
    /// Treat the failure as ignored and proceed to the given node.
    Ignore {
        /// The node to proceed to.
        next_node_id: Option<String>,
    },
    /// End the whole plan execution with the node's outcome.
    EndPlan,
    /// Park the node pending manual operator action.
    InterventionWait {
        /// Deadline after which the node expires.
        timeout: Duration,
    },
    /// Mark the node successful and proceed to the given node.
    MarkSuccess {
        /// The node to proceed to.
        next_node_id: Option<String>,
    },
}

/// Pluggable post-completion policy.
///
/// `can_advise` is always evaluated before `on_advise_event`; an adviser
/// that cannot handle an event is never invoked for it.
#[async_trait]
pub trait Adviser: Send + Sync {
    /// The type tag this adviser is registered under.
    fn adviser_type(&self) -> AdviserType;

    /// Returns true if this adviser can handle the event.
    fn can_advise(&self, event: &AdviseEvent) -> bool;

    /// Produces the next control-flow action.
    ///
    /// Returning `Ok(None)` means the adviser resolved the event through a
    /// side channel (e.g. by registering an interrupt) and the engine
    /// should apply pending interrupts instead of a direct advice.
    async fn on_advise_event(&self, event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureInfo;
    use crate::facilitate::FacilitatorType;
    use crate::utils::generate_uuid;

    #[test]
    fn test_advise_event_extracts_failure_types() {
        let mut node = NodeExecution::new(generate_uuid(), "build", "Build");
        node.status = ExecutionStatus::Failed;
        node.failure_info = Some(FailureInfo::timeout("deadline"));
        let plan_node = PlanNode::new("build", "Build", FacilitatorType::Sync);

        let event = AdviseEvent::new(node, plan_node);
        assert_eq!(event.status, ExecutionStatus::Failed);
        assert_eq!(event.failure_types, vec![FailureType::Timeout]);
    }

    #[test]
    fn test_adviser_type_display() {
        assert_eq!(AdviserType::Retry.to_string(), "retry");
        assert_eq!(AdviserType::IgnoreFailure.to_string(), "ignore_failure");
    }
}
