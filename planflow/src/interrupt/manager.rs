//! Interrupt manager: validation, audit history, and ordered queues.

use super::{InterruptPackage, InterruptState, InterruptType};
use crate::core::ExecutionStatus;
use crate::errors::OrchestrationError;
use crate::store::ExecutionStore;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The queue an interrupt lands in: one per plan, one per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptTarget {
    /// Plan-wide interrupts.
    Plan(Uuid),
    /// Interrupts against one node execution.
    Node(Uuid),
}

impl InterruptTarget {
    /// Derives the target key from a package.
    #[must_use]
    pub fn of(package: &InterruptPackage) -> Self {
        match package.node_execution_id {
            Some(node_id) => Self::Node(node_id),
            None => Self::Plan(package.plan_execution_id),
        }
    }
}

/// Accepts interrupt packages, validates them against the target's current
/// status, and queues the corresponding state mutation for the engine.
///
/// Interrupts against the same target apply strictly in registration order;
/// interrupts against different targets are independent.
pub struct InterruptManager {
    store: Arc<dyn ExecutionStore>,
    seq: AtomicU64,
    queues: DashMap<InterruptTarget, Arc<Mutex<VecDeque<InterruptPackage>>>>,
    history: RwLock<Vec<InterruptPackage>>,
}

impl InterruptManager {
    /// Creates a manager backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            seq: AtomicU64::new(0),
            queues: DashMap::new(),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Registers an interrupt.
    ///
    /// Validation runs against the target's current status; an illegal
    /// request is returned in the `Rejected` state with a reason, recorded
    /// in history, and never queued. Acceptance is synchronous; actual
    /// application happens when the engine drains the target's queue.
    pub async fn register(&self, mut package: InterruptPackage) -> Result<InterruptPackage, OrchestrationError> {
        let status = self.target_status(&package).await?;

        if let Err(reason) = Self::check_legal(package.interrupt_type, status) {
            warn!(
                interrupt_type = %package.interrupt_type,
                status = %status,
                reason,
                "Rejecting interrupt"
            );
            package.state = InterruptState::Rejected;
            package.reason = Some(reason);
            self.history.write().push(package.clone());
            return Ok(package);
        }

        package.seq = self.seq.fetch_add(1, Ordering::SeqCst);
        package.state = InterruptState::Registered;
        self.history.write().push(package.clone());

        let target = InterruptTarget::of(&package);
        let queue = self.queues.entry(target).or_default().clone();
        queue.lock().push_back(package.clone());

        info!(
            interrupt_id = %package.id,
            interrupt_type = %package.interrupt_type,
            seq = package.seq,
            "Registered interrupt"
        );
        Ok(package)
    }

    /// Drains all pending interrupts for a target, in registration order,
    /// marking each as `Processing`.
    #[must_use]
    pub fn drain(&self, target: InterruptTarget) -> Vec<InterruptPackage> {
        let Some(queue) = self.queues.get(&target).map(|q| q.clone()) else {
            return Vec::new();
        };
        let mut drained: Vec<InterruptPackage> = queue.lock().drain(..).collect();
        for package in &mut drained {
            package.state = InterruptState::Processing;
            self.update_history(package.id, InterruptState::Processing, None);
        }
        drained
    }

    /// Records the final resolution of a drained interrupt.
    pub fn resolve(&self, interrupt_id: Uuid, state: InterruptState, reason: Option<String>) {
        self.update_history(interrupt_id, state, reason);
    }

    /// Number of pending interrupts for a target.
    #[must_use]
    pub fn pending_count(&self, target: InterruptTarget) -> usize {
        self.queues.get(&target).map_or(0, |q| q.lock().len())
    }

    /// Full audit history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<InterruptPackage> {
        self.history.read().clone()
    }

    async fn target_status(&self, package: &InterruptPackage) -> Result<ExecutionStatus, OrchestrationError> {
        match package.node_execution_id {
            Some(node_id) => {
                let node =
                    self.store
                        .get_node_execution(node_id)
                        .await?
                        .ok_or(OrchestrationError::NotFound {
                            entity: "node_execution",
                            id: node_id.to_string(),
                        })?;
                Ok(node.status)
            }
            None => {
                let plan = self
                    .store
                    .get_plan_execution(package.plan_execution_id)
                    .await?
                    .ok_or(OrchestrationError::NotFound {
                        entity: "plan_execution",
                        id: package.plan_execution_id.to_string(),
                    })?;
                Ok(plan.status)
            }
        }
    }

    fn check_legal(interrupt_type: InterruptType, status: ExecutionStatus) -> Result<(), String> {
        let legal = match interrupt_type {
            InterruptType::Abort => !status.is_terminal() && status != ExecutionStatus::Discontinuing,
            InterruptType::Pause => status == ExecutionStatus::Running,
            InterruptType::Resume => status.is_parked(),
            InterruptType::Retry => matches!(
                status,
                ExecutionStatus::Failed
                    | ExecutionStatus::Expired
                    | ExecutionStatus::Aborted
                    | ExecutionStatus::InterventionWaiting
            ),
            InterruptType::Ignore => matches!(status, ExecutionStatus::Failed | ExecutionStatus::Expired),
            InterruptType::MarkSuccess => matches!(
                status,
                ExecutionStatus::Failed | ExecutionStatus::Expired | ExecutionStatus::InterventionWaiting
            ),
            InterruptType::Expire => !status.is_terminal(),
        };
        if legal {
            Ok(())
        } else {
            Err(format!(
                "interrupt '{interrupt_type}' is not legal for target in status '{status}'"
            ))
        }
    }

    fn update_history(&self, interrupt_id: Uuid, state: InterruptState, reason: Option<String>) {
        let mut history = self.history.write();
        if let Some(entry) = history.iter_mut().find(|p| p.id == interrupt_id) {
            entry.state = state;
            if reason.is_some() {
                entry.reason = reason;
            }
        }
    }
}

impl std::fmt::Debug for InterruptManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptManager")
            .field("history_len", &self.history.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeExecution, PlanExecution};
    use crate::interrupt::InterruptIssuer;
    use crate::store::{InMemoryExecutionStore, NodeUpdate};

    async fn setup() -> (Arc<InMemoryExecutionStore>, PlanExecution, NodeExecution) {
        let store = Arc::new(InMemoryExecutionStore::new());
        let plan_exec = PlanExecution::new("deploy");
        store.create_plan_execution(plan_exec.clone()).await.unwrap();
        let node = NodeExecution::new(plan_exec.id, "build", "Build");
        store.create_node_execution(node.clone()).await.unwrap();
        (store, plan_exec, node)
    }

    #[tokio::test]
    async fn test_register_accepts_legal_interrupt() {
        let (store, plan_exec, node) = setup().await;
        store
            .update_node(node.id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        let manager = InterruptManager::new(store);

        let pkg = InterruptPackage::new(plan_exec.id, Some(node.id), InterruptType::Abort, InterruptIssuer::System);
        let registered = manager.register(pkg).await.unwrap();
        assert_eq!(registered.state, InterruptState::Registered);
        assert_eq!(manager.pending_count(InterruptTarget::Node(node.id)), 1);
    }

    #[tokio::test]
    async fn test_abort_on_terminal_node_rejected() {
        let (store, plan_exec, node) = setup().await;
        store
            .update_node(node.id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        store
            .update_node(node.id, ExecutionStatus::Running, NodeUpdate::status(ExecutionStatus::Succeeded))
            .await
            .unwrap();
        let manager = InterruptManager::new(store);

        let pkg = InterruptPackage::new(plan_exec.id, Some(node.id), InterruptType::Abort, InterruptIssuer::System);
        let rejected = manager.register(pkg).await.unwrap();
        assert_eq!(rejected.state, InterruptState::Rejected);
        assert!(rejected.reason.unwrap().contains("not legal"));
        assert_eq!(manager.pending_count(InterruptTarget::Node(node.id)), 0);
    }

    #[tokio::test]
    async fn test_retry_requires_failed_target() {
        let (store, plan_exec, node) = setup().await;
        let manager = InterruptManager::new(store);

        let pkg = InterruptPackage::new(
            plan_exec.id,
            Some(node.id),
            InterruptType::Retry,
            InterruptIssuer::User("ops".to_string()),
        );
        let rejected = manager.register(pkg).await.unwrap();
        assert_eq!(rejected.state, InterruptState::Rejected);
    }

    #[tokio::test]
    async fn test_drain_preserves_registration_order() {
        let (store, plan_exec, node) = setup().await;
        store
            .update_node(node.id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        let manager = InterruptManager::new(store);

        let first = manager
            .register(InterruptPackage::new(
                plan_exec.id,
                Some(node.id),
                InterruptType::Pause,
                InterruptIssuer::System,
            ))
            .await
            .unwrap();
        let second = manager
            .register(InterruptPackage::new(
                plan_exec.id,
                Some(node.id),
                InterruptType::Abort,
                InterruptIssuer::System,
            ))
            .await
            .unwrap();

        let drained = manager.drain(InterruptTarget::Node(node.id));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, first.id);
        assert_eq!(drained[1].id, second.id);
        assert!(drained[0].seq < drained[1].seq);
        assert!(drained.iter().all(|p| p.state == InterruptState::Processing));
    }

    #[tokio::test]
    async fn test_resolution_recorded_in_history() {
        let (store, plan_exec, node) = setup().await;
        store
            .update_node(node.id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        let manager = InterruptManager::new(store);

        let pkg = manager
            .register(InterruptPackage::new(
                plan_exec.id,
                Some(node.id),
                InterruptType::Abort,
                InterruptIssuer::System,
            ))
            .await
            .unwrap();
        let _ = manager.drain(InterruptTarget::Node(node.id));
        manager.resolve(pkg.id, InterruptState::Processed, None);

        let history = manager.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, InterruptState::Processed);
    }

    #[tokio::test]
    async fn test_unknown_target_errors() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let manager = InterruptManager::new(store);
        let pkg = InterruptPackage::new(
            crate::utils::generate_uuid(),
            None,
            InterruptType::Abort,
            InterruptIssuer::System,
        );
        assert!(manager.register(pkg).await.is_err());
    }
}
