//! Retry adviser: re-arms failed nodes until the configured bound, then
//! dispatches the repair action.

use super::{AdviseEvent, Adviser, AdviserResponse, AdviserType};
use crate::core::{ExecutionStatus, FailureType};
use crate::errors::{ConfigurationError, OrchestrationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default deadline for a manual-intervention wait.
pub const DEFAULT_INTERVENTION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// What to do once retries are exhausted.
///
/// A closed enum: every variant is matched exhaustively, so an unknown
/// repair action cannot reach the state machine. Deserializing an unknown
/// code fails at parameter-parse time instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairAction {
    /// Park the node pending human action.
    ManualIntervention,
    /// End the plan execution.
    EndExecution,
    /// Ignore the failure and proceed to the declared fallback.
    Ignore,
}

/// Per-node retry configuration, immutable once attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryAdviserParameters {
    /// Ordered wait intervals in milliseconds; the last value repeats once
    /// the list is exhausted.
    #[serde(default)]
    pub wait_intervals_ms: Vec<u64>,
    /// Maximum number of retries.
    pub retry_count: u32,
    /// Behavior after retries are exhausted.
    pub repair_action: RepairAction,
    /// Failure types this adviser applies to; empty means all.
    #[serde(default)]
    pub applicable_failure_types: Vec<FailureType>,
    /// Manual-intervention deadline override in milliseconds.
    pub intervention_timeout_ms: Option<u64>,
}

impl RetryAdviserParameters {
    /// Parses parameters from the opaque adviser blob.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigurationError> {
        serde_json::from_value(value.clone()).map_err(|e| ConfigurationError::InvalidAdviserParameters {
            adviser_type: AdviserType::Retry.to_string(),
            reason: e.to_string(),
        })
    }

    /// Selects the wait interval for a 0-indexed attempt.
    ///
    /// With intervals `[10, 30, 60]`: attempt 0 waits 10 ms, attempt 1
    /// waits 30 ms, attempt 2 and beyond wait 60 ms.
    #[must_use]
    pub fn wait_interval_for(&self, attempt: u32) -> Duration {
        if self.wait_intervals_ms.is_empty() {
            return Duration::ZERO;
        }
        let index = (attempt as usize).min(self.wait_intervals_ms.len() - 1);
        Duration::from_millis(self.wait_intervals_ms[index])
    }

    /// Returns true if the adviser applies to the given failure types.
    #[must_use]
    pub fn applies_to(&self, failure_types: &[FailureType]) -> bool {
        self.applicable_failure_types.is_empty()
            || failure_types.iter().any(|t| self.applicable_failure_types.contains(t))
    }
}

/// Adviser that retries failed nodes per [`RetryAdviserParameters`].
#[derive(Debug, Clone)]
pub struct RetryAdviser {
    default_intervention_timeout: Duration,
}

impl Default for RetryAdviser {
    fn default() -> Self {
        Self {
            default_intervention_timeout: DEFAULT_INTERVENTION_TIMEOUT,
        }
    }
}

impl RetryAdviser {
    /// Creates a retry adviser with the default intervention timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the default intervention timeout.
    #[must_use]
    pub fn with_intervention_timeout(mut self, timeout: Duration) -> Self {
        self.default_intervention_timeout = timeout;
        self
    }

    fn parameters(event: &AdviseEvent) -> Option<RetryAdviserParameters> {
        let value = event.node.adviser_params.as_ref()?;
        RetryAdviserParameters::from_value(value).ok()
    }
}

#[async_trait]
impl Adviser for RetryAdviser {
    fn adviser_type(&self) -> AdviserType {
        AdviserType::Retry
    }

    fn can_advise(&self, event: &AdviseEvent) -> bool {
        if !matches!(event.status, ExecutionStatus::Failed | ExecutionStatus::Expired) {
            return false;
        }
        Self::parameters(event).is_some_and(|params| params.applies_to(&event.failure_types))
    }

    async fn on_advise_event(&self, event: &AdviseEvent) -> Result<Option<AdviserResponse>, OrchestrationError> {
        let value = event
            .node
            .adviser_params
            .as_ref()
            .ok_or_else(|| ConfigurationError::InvalidAdviserParameters {
                adviser_type: AdviserType::Retry.to_string(),
                reason: "missing parameters".to_string(),
            })?;
        let params = RetryAdviserParameters::from_value(value)?;

        if event.node.retry_count < params.retry_count {
            let wait = params.wait_interval_for(event.node.retry_count);
            debug!(
                node_execution_id = %event.node.id,
                attempt = event.node.retry_count,
                wait_ms = wait.as_millis() as u64,
                "Advising retry"
            );
            return Ok(Some(AdviserResponse::Retry {
                node_execution_id: event.node.id,
                wait,
            }));
        }

        let response = match params.repair_action {
            RepairAction::ManualIntervention => AdviserResponse::InterventionWait {
                timeout: params
                    .intervention_timeout_ms
                    .map_or(self.default_intervention_timeout, Duration::from_millis),
            },
            RepairAction::EndExecution => AdviserResponse::EndPlan,
            RepairAction::Ignore => AdviserResponse::NextStep {
                next_node_id: event
                    .plan_node
                    .on_failure_next
                    .clone()
                    .or_else(|| event.plan_node.next.clone()),
            },
        };
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FailureInfo, NodeExecution};
    use crate::facilitate::FacilitatorType;
    use crate::plan::PlanNode;
    use crate::utils::generate_uuid;

    fn params_json(retry_count: u32, repair: &str) -> serde_json::Value {
        serde_json::json!({
            "wait_intervals_ms": [10, 30, 60],
            "retry_count": retry_count,
            "repair_action": repair,
        })
    }

    fn failed_event(retry_count: u32, params: serde_json::Value) -> AdviseEvent {
        let mut node = NodeExecution::new(generate_uuid(), "build", "Build").with_adviser_params(params);
        node.status = ExecutionStatus::Failed;
        node.retry_count = retry_count;
        node.failure_info = Some(FailureInfo::application("boom"));
        let plan_node = PlanNode::new("build", "Build", FacilitatorType::Sync)
            .with_next("test")
            .with_on_failure_next("cleanup");
        AdviseEvent::new(node, plan_node)
    }

    #[test]
    fn test_wait_interval_selection() {
        let params = RetryAdviserParameters::from_value(&params_json(5, "END_EXECUTION")).unwrap();
        assert_eq!(params.wait_interval_for(0), Duration::from_millis(10));
        assert_eq!(params.wait_interval_for(1), Duration::from_millis(30));
        assert_eq!(params.wait_interval_for(2), Duration::from_millis(60));
        assert_eq!(params.wait_interval_for(7), Duration::from_millis(60));
    }

    #[test]
    fn test_empty_interval_list_means_no_wait() {
        let params = RetryAdviserParameters::from_value(&serde_json::json!({
            "retry_count": 1,
            "repair_action": "END_EXECUTION",
        }))
        .unwrap();
        assert_eq!(params.wait_interval_for(0), Duration::ZERO);
    }

    #[test]
    fn test_unknown_repair_action_fails_parse() {
        let result = RetryAdviserParameters::from_value(&serde_json::json!({
            "retry_count": 1,
            "repair_action": "SHRUG",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_can_advise_respects_failure_types() {
        let adviser = RetryAdviser::new();
        let mut params = params_json(2, "END_EXECUTION");
        params["applicable_failure_types"] = serde_json::json!(["timeout"]);

        let event = failed_event(0, params);
        // Node failed with an application failure, adviser only covers timeouts.
        assert!(!adviser.can_advise(&event));
    }

    #[test]
    fn test_can_advise_rejects_success() {
        let adviser = RetryAdviser::new();
        let mut event = failed_event(0, params_json(2, "END_EXECUTION"));
        event.status = ExecutionStatus::Succeeded;
        assert!(!adviser.can_advise(&event));
    }

    #[tokio::test]
    async fn test_advises_retry_below_bound() {
        let adviser = RetryAdviser::new();
        let event = failed_event(1, params_json(2, "END_EXECUTION"));

        let response = adviser.on_advise_event(&event).await.unwrap().unwrap();
        match response {
            AdviserResponse::Retry { node_execution_id, wait } => {
                assert_eq!(node_execution_id, event.node.id);
                assert_eq!(wait, Duration::from_millis(30));
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_end_execution_after_exhaustion() {
        let adviser = RetryAdviser::new();
        let event = failed_event(2, params_json(2, "END_EXECUTION"));
        let response = adviser.on_advise_event(&event).await.unwrap().unwrap();
        assert_eq!(response, AdviserResponse::EndPlan);
    }

    #[tokio::test]
    async fn test_manual_intervention_after_exhaustion() {
        let adviser = RetryAdviser::new();
        let mut params = params_json(1, "MANUAL_INTERVENTION");
        params["intervention_timeout_ms"] = serde_json::json!(5000);
        let event = failed_event(1, params);

        let response = adviser.on_advise_event(&event).await.unwrap().unwrap();
        assert_eq!(
            response,
            AdviserResponse::InterventionWait {
                timeout: Duration::from_millis(5000)
            }
        );
    }

    #[tokio::test]
    async fn test_ignore_targets_failure_fallback() {
        let adviser = RetryAdviser::new();
        let event = failed_event(1, params_json(1, "IGNORE"));
        let response = adviser.on_advise_event(&event).await.unwrap().unwrap();
        assert_eq!(
            response,
            AdviserResponse::NextStep {
                next_node_id: Some("cleanup".to_string())
            }
        );
    }
}
