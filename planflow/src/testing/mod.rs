//! Reusable mock collaborators for tests.

use crate::core::FailureInfo;
use crate::errors::OrchestrationError;
use crate::facilitate::{StepExecutor, StepInput, StepOutcome};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use uuid::Uuid;

/// A step executor that replays scripted outcomes and records calls.
///
/// Outcomes pushed with [`ScriptedStepExecutor::push_outcome`] are consumed
/// in order; once the script is exhausted the default outcome applies.
#[derive(Debug)]
pub struct ScriptedStepExecutor {
    script: Mutex<VecDeque<StepOutcome>>,
    default_outcome: Mutex<StepOutcome>,
    inputs: Mutex<Vec<StepInput>>,
    cancelled: Mutex<Vec<Uuid>>,
}

impl Default for ScriptedStepExecutor {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(StepOutcome::succeeded(None)),
            inputs: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedStepExecutor {
    /// Creates an executor whose default outcome is success.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor that always succeeds.
    #[must_use]
    pub fn always_succeeding() -> Self {
        Self::default()
    }

    /// Creates an executor that always fails with the given failure.
    #[must_use]
    pub fn always_failing(failure: FailureInfo) -> Self {
        let executor = Self::default();
        executor.set_default(StepOutcome::failed(failure));
        executor
    }

    /// Creates an executor that fails `n` times, then succeeds.
    #[must_use]
    pub fn failing_n_times(n: usize, failure: FailureInfo) -> Self {
        let executor = Self::default();
        for _ in 0..n {
            executor.push_outcome(StepOutcome::failed(failure.clone()));
        }
        executor
    }

    /// Appends an outcome to the script.
    pub fn push_outcome(&self, outcome: StepOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Sets the outcome used once the script is exhausted.
    pub fn set_default(&self, outcome: StepOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns the recorded inputs from each call.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<StepInput> {
        self.inputs.lock().clone()
    }

    /// Returns the node execution ids that received a cancel.
    #[must_use]
    pub fn cancelled_nodes(&self) -> Vec<Uuid> {
        self.cancelled.lock().clone()
    }
}

#[async_trait]
impl StepExecutor for ScriptedStepExecutor {
    async fn execute(&self, input: StepInput) -> Result<StepOutcome, OrchestrationError> {
        self.inputs.lock().push(input);
        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| self.default_outcome.lock().clone()))
    }

    async fn cancel(&self, node_execution_id: Uuid) {
        self.cancelled.lock().push(node_execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionStatus;
    use crate::utils::generate_uuid;

    fn input() -> StepInput {
        StepInput {
            node_execution_id: generate_uuid(),
            node_id: "build".to_string(),
            name: "Build".to_string(),
            parameters: None,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_script_consumed_in_order() {
        let executor = ScriptedStepExecutor::failing_n_times(2, FailureInfo::application("boom"));

        for _ in 0..2 {
            let outcome = executor.execute(input()).await.unwrap();
            assert!(matches!(
                outcome,
                StepOutcome::Completed {
                    status: ExecutionStatus::Failed,
                    ..
                }
            ));
        }

        let outcome = executor.execute(input()).await.unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Completed {
                status: ExecutionStatus::Succeeded,
                ..
            }
        ));
        assert_eq!(executor.call_count(), 3);
    }

    #[tokio::test]
    async fn test_cancel_recorded() {
        let executor = ScriptedStepExecutor::new();
        let id = generate_uuid();
        executor.cancel(id).await;
        assert_eq!(executor.cancelled_nodes(), vec![id]);
    }
}
