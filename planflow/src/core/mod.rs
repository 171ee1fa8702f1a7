//! Core data model: statuses, failures, executions, ambiance, events.

pub mod ambiance;
pub mod event;
pub mod execution;
pub mod failure;
pub mod status;

pub use ambiance::{Ambiance, AmbianceLevel, LevelKind};
pub use event::OrchestrationEvent;
pub use execution::{NodeExecution, PlanExecution};
pub use failure::{FailureInfo, FailureType};
pub use status::ExecutionStatus;
