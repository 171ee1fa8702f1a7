//! Step-backed facilitators and the step execution collaborator contract.

use super::{FacilitationResponse, Facilitator, FacilitatorType};
use crate::core::{ExecutionStatus, FailureInfo, NodeExecution};
use crate::errors::OrchestrationError;
use crate::plan::PlanNode;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

/// Input handed to a step executor.
#[derive(Debug, Clone)]
pub struct StepInput {
    /// The node execution id.
    pub node_execution_id: Uuid,
    /// The plan node id.
    pub node_id: String,
    /// Display name of the node.
    pub name: String,
    /// Declared step parameters.
    pub parameters: Option<serde_json::Value>,
    /// Which attempt this is.
    pub retry_count: u32,
}

impl StepInput {
    /// Builds a step input from a node execution and its plan node.
    #[must_use]
    pub fn from_node(node: &NodeExecution, plan_node: &PlanNode) -> Self {
        Self {
            node_execution_id: node.id,
            node_id: node.node_id.clone(),
            name: node.name.clone(),
            parameters: plan_node.step_parameters.clone(),
            retry_count: node.retry_count,
        }
    }
}

/// Outcome of invoking a step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step finished with this result.
    Completed {
        /// Terminal status of the work.
        status: ExecutionStatus,
        /// Response payload.
        output: Option<serde_json::Value>,
        /// Failure details when the work failed.
        failure_info: Option<FailureInfo>,
    },
    /// The step handed work to a remote executor; completion is correlated
    /// by this token.
    Suspended {
        /// Opaque correlation token.
        correlation_token: String,
    },
}

impl StepOutcome {
    /// A successful completion with output.
    #[must_use]
    pub fn succeeded(output: Option<serde_json::Value>) -> Self {
        Self::Completed {
            status: ExecutionStatus::Succeeded,
            output,
            failure_info: None,
        }
    }

    /// A failed completion.
    #[must_use]
    pub fn failed(failure_info: FailureInfo) -> Self {
        Self::Completed {
            status: ExecutionStatus::Failed,
            output: None,
            failure_info: Some(failure_info),
        }
    }
}

/// Capability interface for the external step/task execution collaborator.
///
/// The engine knows nothing about how steps work internally; it requires
/// only this contract plus a cancellation hook.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Executes the step.
    async fn execute(&self, input: StepInput) -> Result<StepOutcome, OrchestrationError>;

    /// Best-effort cancellation of in-flight work.
    async fn cancel(&self, _node_execution_id: Uuid) {}
}

/// Facilitator that runs the step inline and returns its outcome.
pub struct SyncFacilitator {
    executor: Arc<dyn StepExecutor>,
}

impl SyncFacilitator {
    /// Creates a sync facilitator around a step executor.
    #[must_use]
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Facilitator for SyncFacilitator {
    fn facilitator_type(&self) -> FacilitatorType {
        FacilitatorType::Sync
    }

    async fn facilitate(
        &self,
        node: &NodeExecution,
        plan_node: &PlanNode,
    ) -> Result<FacilitationResponse, OrchestrationError> {
        let outcome = self.executor.execute(StepInput::from_node(node, plan_node)).await?;
        Ok(match outcome {
            StepOutcome::Completed {
                status,
                output,
                failure_info,
            } => FacilitationResponse::Sync {
                status,
                output,
                failure_info,
            },
            // The executor opted into remote completion after all.
            StepOutcome::Suspended { correlation_token } => FacilitationResponse::Task { correlation_token },
        })
    }

    async fn cancel(&self, node: &NodeExecution) {
        self.executor.cancel(node.id).await;
    }
}

/// Facilitator that dispatches the step out of process.
///
/// The step executor is expected to deliver its outcome through the SDK
/// response queue; this facilitator only fires the dispatch.
pub struct AsyncFacilitator {
    executor: Arc<dyn StepExecutor>,
}

impl AsyncFacilitator {
    /// Creates an async facilitator around a step executor.
    #[must_use]
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Facilitator for AsyncFacilitator {
    fn facilitator_type(&self) -> FacilitatorType {
        FacilitatorType::Async
    }

    async fn facilitate(
        &self,
        node: &NodeExecution,
        plan_node: &PlanNode,
    ) -> Result<FacilitationResponse, OrchestrationError> {
        let executor = Arc::clone(&self.executor);
        let input = StepInput::from_node(node, plan_node);
        let node_id = node.id;
        tokio::spawn(async move {
            if let Err(e) = executor.execute(input).await {
                error!(node_execution_id = %node_id, error = %e, "Async step dispatch failed");
            }
        });
        Ok(FacilitationResponse::Async)
    }

    async fn cancel(&self, node: &NodeExecution) {
        self.executor.cancel(node.id).await;
    }
}

/// Facilitator that hands the step to a remote executor and correlates its
/// completion by token.
pub struct TaskFacilitator {
    executor: Arc<dyn StepExecutor>,
}

impl TaskFacilitator {
    /// Creates a task facilitator around a step executor.
    #[must_use]
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Facilitator for TaskFacilitator {
    fn facilitator_type(&self) -> FacilitatorType {
        FacilitatorType::Task
    }

    async fn facilitate(
        &self,
        node: &NodeExecution,
        plan_node: &PlanNode,
    ) -> Result<FacilitationResponse, OrchestrationError> {
        let outcome = self.executor.execute(StepInput::from_node(node, plan_node)).await?;
        Ok(match outcome {
            StepOutcome::Suspended { correlation_token } => FacilitationResponse::Task { correlation_token },
            // Fast path: the executor finished before handing off.
            StepOutcome::Completed {
                status,
                output,
                failure_info,
            } => {
                warn!(node_execution_id = %node.id, "Task executor completed inline");
                FacilitationResponse::Sync {
                    status,
                    output,
                    failure_info,
                }
            }
        })
    }

    async fn cancel(&self, node: &NodeExecution) {
        self.executor.cancel(node.id).await;
    }
}
