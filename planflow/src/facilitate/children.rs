//! Fan-out facilitation and child outcome combination.

use super::{FacilitationResponse, Facilitator, FacilitatorType};
use crate::core::{ExecutionStatus, NodeExecution};
use crate::errors::OrchestrationError;
use crate::plan::PlanNode;
use async_trait::async_trait;
use std::sync::Arc;

/// Policy computing a parent node's outcome from child outcomes.
///
/// `combine` is consulted after every child completion with the outcomes
/// observed so far. Returning `Some(status)` decides the parent
/// immediately; `None` keeps waiting for more children.
pub trait ChildCombiner: Send + Sync {
    /// Decides the parent outcome, or `None` to keep waiting.
    fn combine(&self, completed: &[ExecutionStatus], expected: usize) -> Option<ExecutionStatus>;
}

/// Default combiner: all children must succeed; the first failure decides
/// the parent without waiting for the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSucceedCombiner;

impl ChildCombiner for AllSucceedCombiner {
    fn combine(&self, completed: &[ExecutionStatus], expected: usize) -> Option<ExecutionStatus> {
        if let Some(failed) = completed.iter().find(|s| s.is_failure()) {
            return Some(match failed {
                ExecutionStatus::Aborted => ExecutionStatus::Aborted,
                ExecutionStatus::Expired => ExecutionStatus::Expired,
                _ => ExecutionStatus::Failed,
            });
        }
        if completed.len() >= expected {
            Some(ExecutionStatus::Succeeded)
        } else {
            None
        }
    }
}

/// Combiner that succeeds as soon as any child succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySucceedCombiner;

impl ChildCombiner for AnySucceedCombiner {
    fn combine(&self, completed: &[ExecutionStatus], expected: usize) -> Option<ExecutionStatus> {
        if completed.iter().any(ExecutionStatus::is_success) {
            return Some(ExecutionStatus::Succeeded);
        }
        if completed.len() >= expected {
            Some(ExecutionStatus::Failed)
        } else {
            None
        }
    }
}

/// Facilitator that fans a node out into its declared children.
pub struct ChildrenFacilitator {
    combiner: Arc<dyn ChildCombiner>,
}

impl Default for ChildrenFacilitator {
    fn default() -> Self {
        Self {
            combiner: Arc::new(AllSucceedCombiner),
        }
    }
}

impl ChildrenFacilitator {
    /// Creates a facilitator with the default all-succeed combiner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a facilitator with a custom combiner.
    #[must_use]
    pub fn with_combiner(combiner: Arc<dyn ChildCombiner>) -> Self {
        Self { combiner }
    }
}

#[async_trait]
impl Facilitator for ChildrenFacilitator {
    fn facilitator_type(&self) -> FacilitatorType {
        FacilitatorType::Children
    }

    async fn facilitate(
        &self,
        _node: &NodeExecution,
        plan_node: &PlanNode,
    ) -> Result<FacilitationResponse, OrchestrationError> {
        if plan_node.children.is_empty() {
            // Plan validation rejects this shape; a bare node slipping
            // through is an internal inconsistency.
            return Err(OrchestrationError::Internal(format!(
                "children node '{}' declares no children",
                plan_node.id
            )));
        }
        Ok(FacilitationResponse::Children {
            child_node_ids: plan_node.children.clone(),
            combiner: Arc::clone(&self.combiner),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_succeed_waits_for_all() {
        let combiner = AllSucceedCombiner;
        assert_eq!(combiner.combine(&[ExecutionStatus::Succeeded], 3), None);
        assert_eq!(
            combiner.combine(&[ExecutionStatus::Succeeded, ExecutionStatus::Succeeded], 3),
            None
        );
        assert_eq!(
            combiner.combine(
                &[
                    ExecutionStatus::Succeeded,
                    ExecutionStatus::Succeeded,
                    ExecutionStatus::Succeeded
                ],
                3
            ),
            Some(ExecutionStatus::Succeeded)
        );
    }

    #[test]
    fn test_all_succeed_short_circuits_on_failure() {
        let combiner = AllSucceedCombiner;
        assert_eq!(
            combiner.combine(&[ExecutionStatus::Succeeded, ExecutionStatus::Failed], 3),
            Some(ExecutionStatus::Failed)
        );
        assert_eq!(
            combiner.combine(&[ExecutionStatus::Aborted], 3),
            Some(ExecutionStatus::Aborted)
        );
    }

    #[test]
    fn test_any_succeed_short_circuits_on_success() {
        let combiner = AnySucceedCombiner;
        assert_eq!(
            combiner.combine(&[ExecutionStatus::Failed, ExecutionStatus::Succeeded], 3),
            Some(ExecutionStatus::Succeeded)
        );
        assert_eq!(combiner.combine(&[ExecutionStatus::Failed], 3), None);
        assert_eq!(
            combiner.combine(
                &[
                    ExecutionStatus::Failed,
                    ExecutionStatus::Failed,
                    ExecutionStatus::Failed
                ],
                3
            ),
            Some(ExecutionStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_children_facilitator_requires_children() {
        let facilitator = ChildrenFacilitator::new();
        let node = NodeExecution::new(crate::utils::generate_uuid(), "fan", "Fan");
        let plan_node = PlanNode::new("fan", "Fan", FacilitatorType::Children);

        let result = facilitator.facilitate(&node, &plan_node).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_children_facilitator_returns_child_ids() {
        let facilitator = ChildrenFacilitator::new();
        let node = NodeExecution::new(crate::utils::generate_uuid(), "fan", "Fan");
        let plan_node = PlanNode::new("fan", "Fan", FacilitatorType::Children)
            .with_children(vec!["c1".to_string(), "c2".to_string()]);

        let response = facilitator.facilitate(&node, &plan_node).await.unwrap();
        match response {
            FacilitationResponse::Children { child_node_ids, .. } => {
                assert_eq!(child_node_ids, vec!["c1".to_string(), "c2".to_string()]);
            }
            other => panic!("expected children, got {other:?}"),
        }
    }
}
