//! Execution status vocabulary shared by plan and node executions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a plan or node execution.
///
/// Plans and nodes share the same vocabulary; the legal edges are encoded
/// in [`ExecutionStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created and waiting to run.
    Queued,
    /// Actively executing.
    Running,
    /// Suspended by a pause interrupt; resumable.
    Paused,
    /// Winding down before an abort completes.
    Discontinuing,
    /// Parked pending a manual operator decision.
    InterventionWaiting,
    /// Completed successfully.
    Succeeded,
    /// Completed with a domain failure.
    Failed,
    /// Forcibly terminated.
    Aborted,
    /// A deadline elapsed before completion.
    Expired,
    /// Skipped without executing.
    Skipped,
    /// An unrecoverable infrastructure or configuration error occurred.
    Errored,
}

impl Default for ExecutionStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Discontinuing => write!(f, "discontinuing"),
            Self::InterventionWaiting => write!(f, "intervention_waiting"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Expired => write!(f, "expired"),
            Self::Skipped => write!(f, "skipped"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Aborted | Self::Expired | Self::Skipped | Self::Errored
        )
    }

    /// Returns true if the status counts as a successful outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Returns true if the status counts as a failed outcome.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Aborted | Self::Expired | Self::Errored)
    }

    /// Returns true if the execution is parked waiting on an external signal.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        matches!(self, Self::Paused | Self::InterventionWaiting)
    }

    /// Returns true if `to` is a legal direct transition from this status.
    ///
    /// Terminal statuses admit exactly one outgoing edge: back to `Queued`,
    /// which is how a retry re-arms the same node without changing its
    /// identity.
    #[must_use]
    pub fn can_transition(&self, to: Self) -> bool {
        match self {
            Self::Queued => matches!(
                to,
                Self::Running | Self::Skipped | Self::Aborted | Self::Discontinuing | Self::Errored
            ),
            Self::Running => matches!(
                to,
                Self::Succeeded
                    | Self::Failed
                    | Self::Aborted
                    | Self::Expired
                    | Self::Skipped
                    | Self::Paused
                    | Self::Discontinuing
                    | Self::InterventionWaiting
                    | Self::Errored
            ),
            Self::Paused => matches!(
                to,
                Self::Running
                    | Self::Succeeded
                    | Self::Failed
                    | Self::Expired
                    | Self::Skipped
                    | Self::Discontinuing
                    | Self::Aborted
                    | Self::Errored
            ),
            Self::Discontinuing => matches!(to, Self::Aborted | Self::Errored),
            Self::InterventionWaiting => matches!(
                to,
                Self::Running
                    | Self::Queued
                    | Self::Succeeded
                    | Self::Expired
                    | Self::Discontinuing
                    | Self::Aborted
                    | Self::Errored
            ),
            // Manual mark-success and retry re-arming.
            Self::Failed | Self::Expired => matches!(to, Self::Queued | Self::Succeeded | Self::InterventionWaiting),
            Self::Aborted => matches!(to, Self::Queued),
            Self::Succeeded | Self::Skipped | Self::Errored => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ExecutionStatus::Queued.to_string(), "queued");
        assert_eq!(ExecutionStatus::InterventionWaiting.to_string(), "intervention_waiting");
        assert_eq!(ExecutionStatus::Discontinuing.to_string(), "discontinuing");
    }

    #[test]
    fn test_is_terminal() {
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Aborted.is_terminal());
        assert!(ExecutionStatus::Expired.is_terminal());
        assert!(ExecutionStatus::Skipped.is_terminal());
        assert!(ExecutionStatus::Errored.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(!ExecutionStatus::InterventionWaiting.is_terminal());
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(ExecutionStatus::Queued.can_transition(ExecutionStatus::Running));
        assert!(ExecutionStatus::Running.can_transition(ExecutionStatus::Succeeded));
        assert!(ExecutionStatus::Running.can_transition(ExecutionStatus::Failed));
    }

    #[test]
    fn test_pause_resume_edges() {
        assert!(ExecutionStatus::Running.can_transition(ExecutionStatus::Paused));
        assert!(ExecutionStatus::Paused.can_transition(ExecutionStatus::Running));
    }

    #[test]
    fn test_abort_goes_through_discontinuing() {
        assert!(ExecutionStatus::Running.can_transition(ExecutionStatus::Discontinuing));
        assert!(ExecutionStatus::Discontinuing.can_transition(ExecutionStatus::Aborted));
        assert!(!ExecutionStatus::Discontinuing.can_transition(ExecutionStatus::Succeeded));
    }

    #[test]
    fn test_retry_rearms_failed_node() {
        assert!(ExecutionStatus::Failed.can_transition(ExecutionStatus::Queued));
        assert!(ExecutionStatus::Expired.can_transition(ExecutionStatus::Queued));
        assert!(!ExecutionStatus::Succeeded.can_transition(ExecutionStatus::Queued));
    }

    #[test]
    fn test_no_regression_from_success() {
        assert!(!ExecutionStatus::Succeeded.can_transition(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Errored.can_transition(ExecutionStatus::Running));
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&ExecutionStatus::InterventionWaiting).unwrap();
        assert_eq!(json, r#""intervention_waiting""#);
        let back: ExecutionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExecutionStatus::InterventionWaiting);
    }
}
