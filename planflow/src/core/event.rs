//! Orchestration event type emitted towards observers.

use super::execution::NodeExecution;
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Event type for node status changes.
pub const NODE_EXECUTION_STATUS_UPDATE: &str = "node_execution.status_update";
/// Event type for a node retry being scheduled.
pub const NODE_EXECUTION_RETRY_SCHEDULED: &str = "node_execution.retry_scheduled";
/// Event type for plan execution start.
pub const PLAN_EXECUTION_STARTED: &str = "plan_execution.started";
/// Event type for plan execution completion.
pub const PLAN_EXECUTION_COMPLETED: &str = "plan_execution.completed";
/// Event type for interrupt registration.
pub const INTERRUPT_REGISTERED: &str = "interrupt.registered";
/// Event type for interrupt resolution.
pub const INTERRUPT_RESOLVED: &str = "interrupt.resolved";

/// An event emitted by the engine during orchestration.
///
/// Delivery is best-effort; observers never influence the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEvent {
    /// The event type (e.g. `node_execution.status_update`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred (ISO 8601).
    pub timestamp: String,

    /// The event payload data.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl OrchestrationEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a node status update event.
    #[must_use]
    pub fn node_status_update(node: &NodeExecution) -> Self {
        Self::new(NODE_EXECUTION_STATUS_UPDATE)
            .add_data("node_execution_id", serde_json::json!(node.id))
            .add_data("plan_execution_id", serde_json::json!(node.plan_execution_id))
            .add_data("node_id", serde_json::json!(node.node_id))
            .add_data("status", serde_json::json!(node.status))
            .add_data("retry_count", serde_json::json!(node.retry_count))
    }

    /// Creates a retry-scheduled event.
    #[must_use]
    pub fn retry_scheduled(node: &NodeExecution, wait_ms: u64) -> Self {
        Self::new(NODE_EXECUTION_RETRY_SCHEDULED)
            .add_data("node_execution_id", serde_json::json!(node.id))
            .add_data("retry_count", serde_json::json!(node.retry_count))
            .add_data("wait_ms", serde_json::json!(wait_ms))
    }

    /// Creates a plan-started event.
    #[must_use]
    pub fn plan_started(plan_execution_id: uuid::Uuid, plan_id: &str) -> Self {
        Self::new(PLAN_EXECUTION_STARTED)
            .add_data("plan_execution_id", serde_json::json!(plan_execution_id))
            .add_data("plan_id", serde_json::json!(plan_id))
    }

    /// Creates a plan-completed event.
    #[must_use]
    pub fn plan_completed(plan_execution_id: uuid::Uuid, status: crate::core::ExecutionStatus) -> Self {
        Self::new(PLAN_EXECUTION_COMPLETED)
            .add_data("plan_execution_id", serde_json::json!(plan_execution_id))
            .add_data("status", serde_json::json!(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_uuid;

    #[test]
    fn test_event_creation() {
        let event = OrchestrationEvent::new("test.event");
        assert_eq!(event.event_type, "test.event");
        assert!(event.data.is_empty());
    }

    #[test]
    fn test_node_status_update_payload() {
        let node = NodeExecution::new(generate_uuid(), "build", "Build");
        let event = OrchestrationEvent::node_status_update(&node);
        assert_eq!(event.event_type, NODE_EXECUTION_STATUS_UPDATE);
        assert_eq!(event.data.get("node_id"), Some(&serde_json::json!("build")));
        assert_eq!(event.data.get("status"), Some(&serde_json::json!("queued")));
    }

    #[test]
    fn test_event_serialization() {
        let event = OrchestrationEvent::new("test").add_data("x", serde_json::json!(1));
        let json = serde_json::to_string(&event).unwrap();
        let back: OrchestrationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type, back.event_type);
    }
}
