//! Error types for the orchestration engine.
//!
//! Domain failures (a step failing) are not represented here; they are data
//! (`FailureInfo` + a `Failed` status) and travel through the adviser path.
//! This taxonomy covers configuration errors, infrastructure errors, and
//! invalid input.

use thiserror::Error;

/// The main error type for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The plan failed structural validation.
    #[error("{0}")]
    InvalidPlan(#[from] InvalidPlanError),

    /// A registry or adviser/facilitator configuration problem.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The persistence collaborator failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A conditional store update found an unexpected prior status.
    #[error("Conflict updating {entity} {id}: expected status {expected}, found {actual}")]
    StoreConflict {
        /// The record kind ("plan_execution" or "node_execution").
        entity: &'static str,
        /// The record id.
        id: String,
        /// The status the caller expected.
        expected: String,
        /// The status actually found.
        actual: String,
    },

    /// A referenced record does not exist.
    #[error("Unknown {entity}: {id}")]
    NotFound {
        /// The record kind.
        entity: &'static str,
        /// The record id.
        id: String,
    },

    /// The queue collaborator failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestrationError {
    /// Returns true if the error is a transient infrastructure failure
    /// worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Queue(_))
    }
}

/// Error raised when a plan fails structural validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct InvalidPlanError {
    /// The error message.
    pub message: String,
    /// The plan nodes involved in the error.
    pub nodes: Vec<String>,
}

impl InvalidPlanError {
    /// Creates a new invalid plan error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            nodes: Vec::new(),
        }
    }

    /// Sets the nodes involved.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }
}

/// Fatal configuration errors, detected eagerly wherever possible.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// No facilitator registered for a node's declared type.
    #[error("No facilitator registered for type '{facilitator_type}' (node '{node_id}')")]
    MissingFacilitator {
        /// The unresolvable type tag.
        facilitator_type: String,
        /// The node declaring it.
        node_id: String,
    },

    /// A facilitator type was registered twice.
    #[error("Facilitator type '{facilitator_type}' registered more than once")]
    DuplicateFacilitator {
        /// The duplicated type tag.
        facilitator_type: String,
    },

    /// No adviser registered for a node's declared type.
    #[error("No adviser registered for type '{adviser_type}' (node '{node_id}')")]
    MissingAdviser {
        /// The unresolvable type tag.
        adviser_type: String,
        /// The node declaring it.
        node_id: String,
    },

    /// An adviser type was registered twice.
    #[error("Adviser type '{adviser_type}' registered more than once")]
    DuplicateAdviser {
        /// The duplicated type tag.
        adviser_type: String,
    },

    /// Adviser parameters failed to parse.
    #[error("Invalid parameters for adviser '{adviser_type}': {reason}")]
    InvalidAdviserParameters {
        /// The adviser whose parameters failed.
        adviser_type: String,
        /// Why parsing failed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_plan_error_display() {
        let err = InvalidPlanError::new("plan has no entry node").with_nodes(vec!["a".to_string()]);
        assert_eq!(err.to_string(), "plan has no entry node");
        assert_eq!(err.nodes, vec!["a".to_string()]);
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::MissingFacilitator {
            facilitator_type: "task".to_string(),
            node_id: "deploy".to_string(),
        };
        assert!(err.to_string().contains("task"));
        assert!(err.to_string().contains("deploy"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(OrchestrationError::Persistence("write failed".to_string()).is_transient());
        assert!(!OrchestrationError::Internal("bug".to_string()).is_transient());
        let config: OrchestrationError = ConfigurationError::DuplicateAdviser {
            adviser_type: "retry".to_string(),
        }
        .into();
        assert!(!config.is_transient());
    }
}
