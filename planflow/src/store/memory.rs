//! In-memory execution store.

use super::{ExecutionStore, NodeUpdate};
use crate::core::{ExecutionStatus, NodeExecution, PlanExecution};
use crate::errors::OrchestrationError;
use crate::utils::now;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Thread-safe in-memory implementation of [`ExecutionStore`].
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    plans: DashMap<Uuid, PlanExecution>,
    nodes: DashMap<Uuid, NodeExecution>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored node executions.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_plan_execution(&self, execution: PlanExecution) -> Result<(), OrchestrationError> {
        self.plans.insert(execution.id, execution);
        Ok(())
    }

    async fn get_plan_execution(&self, id: Uuid) -> Result<Option<PlanExecution>, OrchestrationError> {
        Ok(self.plans.get(&id).map(|e| e.clone()))
    }

    async fn update_plan_status(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        new_status: ExecutionStatus,
    ) -> Result<PlanExecution, OrchestrationError> {
        let mut entry = self.plans.get_mut(&id).ok_or(OrchestrationError::NotFound {
            entity: "plan_execution",
            id: id.to_string(),
        })?;

        if entry.status != expected {
            return Err(OrchestrationError::StoreConflict {
                entity: "plan_execution",
                id: id.to_string(),
                expected: expected.to_string(),
                actual: entry.status.to_string(),
            });
        }

        entry.status = new_status;
        if new_status.is_terminal() {
            entry.ended_at = Some(now());
        }
        Ok(entry.clone())
    }

    async fn create_node_execution(&self, execution: NodeExecution) -> Result<(), OrchestrationError> {
        self.nodes.insert(execution.id, execution);
        Ok(())
    }

    async fn get_node_execution(&self, id: Uuid) -> Result<Option<NodeExecution>, OrchestrationError> {
        Ok(self.nodes.get(&id).map(|e| e.clone()))
    }

    async fn update_node(
        &self,
        id: Uuid,
        expected: ExecutionStatus,
        update: NodeUpdate,
    ) -> Result<NodeExecution, OrchestrationError> {
        let mut entry = self.nodes.get_mut(&id).ok_or(OrchestrationError::NotFound {
            entity: "node_execution",
            id: id.to_string(),
        })?;

        if entry.status != expected {
            return Err(OrchestrationError::StoreConflict {
                entity: "node_execution",
                id: id.to_string(),
                expected: expected.to_string(),
                actual: entry.status.to_string(),
            });
        }

        entry.status = update.status;
        if let Some(output) = update.output {
            entry.output = Some(output);
        }
        if let Some(failure_info) = update.failure_info {
            entry.failure_info = Some(failure_info);
        }
        if update.increment_retry {
            entry.retry_count += 1;
        }
        if update.status.is_terminal() {
            entry.ended_at = Some(now());
        } else if update.status == ExecutionStatus::Queued {
            entry.ended_at = None;
        }
        Ok(entry.clone())
    }

    async fn nodes_for_plan(&self, plan_execution_id: Uuid) -> Result<Vec<NodeExecution>, OrchestrationError> {
        Ok(self
            .nodes
            .iter()
            .filter(|e| e.plan_execution_id == plan_execution_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn nodes_with_status(
        &self,
        plan_execution_id: Uuid,
        status: ExecutionStatus,
    ) -> Result<Vec<NodeExecution>, OrchestrationError> {
        Ok(self
            .nodes
            .iter()
            .filter(|e| e.plan_execution_id == plan_execution_id && e.status == status)
            .map(|e| e.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureInfo;

    #[tokio::test]
    async fn test_plan_round_trip() {
        let store = InMemoryExecutionStore::new();
        let exec = PlanExecution::new("deploy");
        let id = exec.id;

        store.create_plan_execution(exec).await.unwrap();
        let fetched = store.get_plan_execution(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_plan_cas_conflict() {
        let store = InMemoryExecutionStore::new();
        let exec = PlanExecution::new("deploy");
        let id = exec.id;
        store.create_plan_execution(exec).await.unwrap();

        let result = store
            .update_plan_status(id, ExecutionStatus::Paused, ExecutionStatus::Running)
            .await;
        assert!(matches!(result, Err(OrchestrationError::StoreConflict { .. })));
    }

    #[tokio::test]
    async fn test_plan_terminal_sets_ended_at() {
        let store = InMemoryExecutionStore::new();
        let exec = PlanExecution::new("deploy");
        let id = exec.id;
        store.create_plan_execution(exec).await.unwrap();

        let updated = store
            .update_plan_status(id, ExecutionStatus::Running, ExecutionStatus::Succeeded)
            .await
            .unwrap();
        assert!(updated.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_node_update_applies_mutation() {
        let store = InMemoryExecutionStore::new();
        let plan = PlanExecution::new("deploy");
        let node = NodeExecution::new(plan.id, "build", "Build");
        let id = node.id;
        store.create_node_execution(node).await.unwrap();

        store
            .update_node(id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();

        let failed = store
            .update_node(
                id,
                ExecutionStatus::Running,
                NodeUpdate::status(ExecutionStatus::Failed).with_failure(FailureInfo::application("boom")),
            )
            .await
            .unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert!(failed.ended_at.is_some());
        assert_eq!(failed.failure_info.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn test_node_rearm_clears_ended_at_and_increments_retry() {
        let store = InMemoryExecutionStore::new();
        let plan = PlanExecution::new("deploy");
        let node = NodeExecution::new(plan.id, "build", "Build");
        let id = node.id;
        store.create_node_execution(node).await.unwrap();

        store
            .update_node(id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        store
            .update_node(id, ExecutionStatus::Running, NodeUpdate::status(ExecutionStatus::Failed))
            .await
            .unwrap();

        let rearmed = store
            .update_node(
                id,
                ExecutionStatus::Failed,
                NodeUpdate::status(ExecutionStatus::Queued).incrementing_retry(),
            )
            .await
            .unwrap();
        assert_eq!(rearmed.retry_count, 1);
        assert!(rearmed.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_query_by_status() {
        let store = InMemoryExecutionStore::new();
        let plan = PlanExecution::new("deploy");
        for i in 0..3 {
            let node = NodeExecution::new(plan.id, format!("n{i}"), format!("n{i}"));
            store.create_node_execution(node).await.unwrap();
        }

        let queued = store.nodes_with_status(plan.id, ExecutionStatus::Queued).await.unwrap();
        assert_eq!(queued.len(), 3);
        let running = store.nodes_with_status(plan.id, ExecutionStatus::Running).await.unwrap();
        assert!(running.is_empty());
    }
}
