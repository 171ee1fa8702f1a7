//! Ignore-failure adviser.
//!
//! Ignoring is modeled as an interrupt rather than a direct transition so
//! it shares the audit trail with externally triggered interrupts.

use super::{AdviseEvent, Adviser, AdviserResponse, AdviserType};
use crate::core::ExecutionStatus;
use crate::errors::OrchestrationError;
use crate::interrupt::{InterruptIssuer, InterruptManager, InterruptPackage, InterruptState, InterruptType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Adviser that converts a node failure into an IGNORE interrupt.
pub struct IgnoreFailureAdviser {
    interrupts: Arc<InterruptManager>,
}

impl IgnoreFailureAdviser {
    /// Creates an adviser registering interrupts with the given manager.
    #[must_use]
    pub fn new(interrupts: Arc<InterruptManager>) -> Self {
        Self { interrupts }
    }
}

impl std::fmt::Debug for IgnoreFailureAdviser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreFailureAdviser").finish()
    }
}

#[async_trait]
impl Adviser for IgnoreFailureAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::IgnoreFailure
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        matches!(event.status, ExecutionStatus::Failed | ExecutionStatus::Expired)
    }

    async fn on_advise_event(&self, event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        let package = InterruptPackage::new(
            event.node.plan_execution_id,
            Some(event.node.id),
            InterruptType::Ignore,
            InterruptIssuer::Adviser(AdviserType::IgnoreFailure),
        );
        let registered = self.interrupts.register(package).await?;
        if registered.state == InterruptState::Rejected {
            warn!(
                node_execution_id = %event.node.id,
                reason = ?registered.reason,
                "Ignore interrupt rejected"
            );
        }
        // Resolution happens through the interrupt queue.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FailureInfo, NodeExecution, PlanExecution};
    use crate::facilitate::FacilitatorType;
    use crate::interrupt::manager::InterruptTarget;
    use crate::plan::PlanNode;
    use crate::store::{ExecutionStore, InMemoryExecutionStore, NodeUpdate};

    #[tokio::test]
    async fn test_failure_becomes_ignore_interrupt() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let plan_exec = PlanExecution::new("deploy");
        store.create_plan_execution(plan_exec.clone()).await.unwrap();
        let node = NodeExecution::new(plan_exec.id, "build", "Build");
        store.create_node_execution(node.clone()).await.unwrap();
        store
            .update_node(node.id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();
        let failed = store
            .update_node(
                node.id,
                ExecutionStatus::Running,
                NodeUpdate::status(ExecutionStatus::Failed).with_failure(FailureInfo::application("boom")),
            )
            .await
            .unwrap();

        let manager = Arc::new(InterruptManager::new(store));
        let adviser = IgnoreFailureAdviser::new(manager.clone());

        let event = AdviseEvent::new(failed, PlanNode::new("build", "Build", FacilitatorType::Sync));
        assert!(adviser.can_advise(&event));

        let response = adviser.on_advise_event(&event).await.unwrap();
        assert!(response.is_none());
        assert_eq!(manager.pending_count(InterruptTarget::Node(node.id)), 1);

        let drained = manager.drain(InterruptTarget::Node(node.id));
        assert_eq!(drained[0].interrupt_type, InterruptType::Ignore);
        assert_eq!(
            drained[0].issuer,
            InterruptIssuer::Adviser(AdviserType::IgnoreFailure)
        );
    }

    #[tokio::test]
    async fn test_cannot_advise_success() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let manager = Arc::new(InterruptManager::new(store));
        let adviser = IgnoreFailureAdviser::new(manager);

        let mut node = NodeExecution::new(crate::utils::generate_uuid(), "build", "Build");
        node.status = ExecutionStatus::Succeeded;
        let event = AdviseEvent::new(node, PlanNode::new("build", "Build", FacilitatorType::Sync));
        assert!(!adviser.can_advise(&event));
    }
}
