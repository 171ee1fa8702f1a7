//! Pass-through advisers for plain outcome routing.

use super::{AdviseEvent, Adviser, AdviserResponse, AdviserType};
use crate::core::ExecutionStatus;
use crate::errors::OrchestrationError;
use async_trait::async_trait;

/// Proceeds to the declared next node when a node succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnSuccessAdviser;

#[async_trait]
impl Adviser for OnSuccessAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::OnSuccess
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        event.status.is_success()
    }

    async fn on_advise_event(&self, event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        Ok(Some(AdviserResponse::NextStep {
            next_node_id: event.plan_node.next.clone(),
        }))
    }
}

/// Ends the plan when a node fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnFailAdviser;

#[async_trait]
impl Adviser for OnFailAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::OnFail
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        matches!(event.status, ExecutionStatus::Failed | ExecutionStatus::Expired)
    }

    async fn on_advise_event(&self, _event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        Ok(Some(AdviserResponse::EndPlan))
    }
}

/// Ends the plan when a node is aborted.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnAbortAdviser;

#[async_trait]
impl Adviser for OnAbortAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::OnAbort
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        event.status == ExecutionStatus::Aborted
    }

    async fn on_advise_event(&self, _event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        Ok(Some(AdviserResponse::EndPlan))
    }
}

/// Marks a failed node successful and proceeds to the declared next node.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnMarkSuccessAdviser;

#[async_trait]
impl Adviser for OnMarkSuccessAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::OnMarkSuccess
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        matches!(event.status, ExecutionStatus::Failed | ExecutionStatus::Expired)
    }

    async fn on_advise_event(&self, event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        Ok(Some(AdviserResponse::MarkSuccess {
            next_node_id: event.plan_node.next.clone(),
        }))
    }
}
