//! Node Execution Store: the single source of truth for execution state.
//!
//! All mutations are conditional on an expected prior status so that
//! concurrent advisers and interrupts racing on the same record cannot
//! lose updates.

pub mod memory;
pub mod retry;

pub use memory::InMemoryExecutionStore;
pub use retry::{with_store_retry, StoreRetryPolicy};

use crate::core::{ExecutionStatus, FailureInfo, NodeExecution, PlanExecution};
use crate::errors::OrchestrationError;
use async_trait::async_trait;
use uuid::Uuid;

/// A conditional mutation applied to a node execution.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    /// The new status.
    pub status: ExecutionStatus,
    /// New step output, if produced.
    pub output: Option<serde_json::Value>,
    /// New failure info, if the node failed.
    pub failure_info: Option<FailureInfo>,
    /// Whether to increment the retry counter.
    pub increment_retry: bool,
}

impl NodeUpdate {
    /// Creates a status-only update.
    #[must_use]
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Sets the output payload.
    #[must_use]
    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Sets the failure info.
    #[must_use]
    pub fn with_failure(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }

    /// Marks the update as a retry re-arm.
    #[must_use]
    pub fn incrementing_retry(mut self) -> Self {
        self.increment_retry = true;
        self
    }
}

/// Document-style persistence collaborator for execution records.
///
/// No specific storage engine is mandated; [`InMemoryExecutionStore`] is
/// provided for tests and embedding.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persists a new plan execution.
    async fn create_plan_execution(&self, execution: PlanExecution) -> Result<(), OrchestrationError>;

    /// Fetches a plan execution by id.
    async fn get_plan_execution(&self, id: Uuid) -> Result<Option<PlanExecution>, OrchestrationError>;

    /// Conditionally transitions a plan execution's status.
    ///
    /// Fails with [`OrchestrationError::StoreConflict`] when the stored
    /// status does not match `expected`. Sets `ended_at` when the new
    /// status is terminal.
    async fn update_plan_status(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        new_status: ExecutionStatus,
    ) -> Result<PlanExecution, OrchestrationError>;

    /// Persists a new node execution.
    async fn create_node_execution(&self, execution: NodeExecution) -> Result<(), OrchestrationError>;

    /// Fetches a node execution by id.
    async fn get_node_execution(&self, id: Uuid) -> Result<Option<NodeExecution>, OrchestrationError>;

    /// Conditionally mutates a node execution.
    ///
    /// Fails with [`OrchestrationError::StoreConflict`] when the stored
    /// status does not match `expected`. Sets `ended_at` when the new
    /// status is terminal and clears it when the node is re-armed.
    async fn update_node(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        update: NodeUpdate,
    ) -> Result<NodeExecution, OrchestrationError>;

    /// Returns all node executions of a plan execution.
    async fn nodes_for_plan(&self, plan_execution_id: Uuid) -> Result<Vec<NodeExecution>, OrchestrationError>;

    /// Returns the node executions of a plan execution with the given status.
    async fn nodes_with_status(
        &self,
        plan_execution_id: Uuid,
        status: ExecutionStatus,
    ) -> Result<Vec<NodeExecution>, OrchestrationError>;
}
