//! Persisted execution records for plans and nodes.

use super::ambiance::Ambiance;
use super::failure::FailureInfo;
use super::status::ExecutionStatus;
use crate::utils::{generate_uuid, now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One run of a compiled plan.
///
/// Created when an execution starts, mutated only by the engine on
/// status-changing events, and retained after completion for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecution {
    /// Unique id of this run.
    pub id: Uuid,
    /// Id of the immutable plan being executed.
    pub plan_id: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run reached a terminal status.
    pub ended_at: Option<Timestamp>,
}

impl PlanExecution {
    /// Creates a new running plan execution.
    #[must_use]
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            id: generate_uuid(),
            plan_id: plan_id.into(),
            status: ExecutionStatus::Running,
            started_at: now(),
            ended_at: None,
        }
    }
}

/// One execution of one plan node within a plan execution.
///
/// Node identity is stable across retries: a retry re-arms the same record
/// with an incremented `retry_count` rather than creating a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Unique id of this node execution.
    pub id: Uuid,
    /// The plan execution this node belongs to.
    pub plan_execution_id: Uuid,
    /// The plan node being executed.
    pub node_id: String,
    /// Display name of the node.
    pub name: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Execution-context stack.
    pub ambiance: Ambiance,
    /// Number of adviser-issued retries so far.
    pub retry_count: u32,
    /// Failure details when the node failed.
    pub failure_info: Option<FailureInfo>,
    /// Opaque adviser-type-specific configuration copied from the plan.
    pub adviser_params: Option<serde_json::Value>,
    /// Strategy/concurrency metadata for looped or matrix nodes.
    pub strategy_metadata: Option<serde_json::Value>,
    /// Input parameters handed to the step.
    pub input: Option<serde_json::Value>,
    /// Response payload produced by the step.
    pub output: Option<serde_json::Value>,
    /// When this node execution was created.
    pub started_at: Timestamp,
    /// When this node execution reached a terminal status.
    pub ended_at: Option<Timestamp>,
}

impl NodeExecution {
    /// Creates a queued node execution.
    #[must_use]
    pub fn new(plan_execution_id: Uuid, node_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: generate_uuid(),
            plan_execution_id,
            node_id: node_id.into(),
            name: name.into(),
            status: ExecutionStatus::Queued,
            ambiance: Ambiance::new(),
            retry_count: 0,
            failure_info: None,
            adviser_params: None,
            strategy_metadata: None,
            input: None,
            output: None,
            started_at: now(),
            ended_at: None,
        }
    }

    /// Sets the ambiance stack.
    #[must_use]
    pub fn with_ambiance(mut self, ambiance: Ambiance) -> Self {
        self.ambiance = ambiance;
        self
    }

    /// Sets the adviser parameter blob.
    #[must_use]
    pub fn with_adviser_params(mut self, params: serde_json::Value) -> Self {
        self.adviser_params = Some(params);
        self
    }

    /// Sets the step input.
    #[must_use]
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_execution_starts_running() {
        let exec = PlanExecution::new("deploy");
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert!(exec.ended_at.is_none());
    }

    #[test]
    fn test_node_execution_starts_queued() {
        let plan_exec = PlanExecution::new("deploy");
        let node = NodeExecution::new(plan_exec.id, "build", "Build");
        assert_eq!(node.status, ExecutionStatus::Queued);
        assert_eq!(node.retry_count, 0);
        assert_eq!(node.plan_execution_id, plan_exec.id);
    }

    #[test]
    fn test_node_execution_serde_round_trip() {
        let node = NodeExecution::new(generate_uuid(), "build", "Build")
            .with_input(serde_json::json!({"target": "release"}));
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, node.id);
        assert_eq!(back.input, node.input);
    }
}
