//! Interrupts: externally or internally requested forced state changes.

pub mod manager;

pub use manager::InterruptManager;

use crate::advise::AdviserType;
use crate::utils::{generate_uuid, now, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The requested state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptType {
    /// Force-terminate the target, cascading to children.
    Abort,
    /// Suspend the target; resumable.
    Pause,
    /// Resume a paused or intervention-waiting target.
    Resume,
    /// Re-arm a failed/expired target for a fresh attempt.
    Retry,
    /// Treat the target's failure as ignored and proceed.
    Ignore,
    /// Mark a failed target as successful and proceed.
    MarkSuccess,
    /// Expire the target (deadline elapsed).
    Expire,
}

impl fmt::Display for InterruptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Retry => write!(f, "retry"),
            Self::Ignore => write!(f, "ignore"),
            Self::MarkSuccess => write!(f, "mark_success"),
            Self::Expire => write!(f, "expire"),
        }
    }
}

/// Who or what issued an interrupt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptIssuer {
    /// A human operator, identified by name or principal.
    User(String),
    /// An adviser converted its decision into an interrupt.
    Adviser(AdviserType),
    /// A system timer or internal component.
    System,
}

/// Lifecycle of an interrupt package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptState {
    /// Accepted and queued for application.
    Registered,
    /// Picked up by the engine.
    Processing,
    /// Applied successfully.
    Processed,
    /// Refused; recorded with a reason and never retried automatically.
    Rejected,
}

/// A requested state change against a plan or node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptPackage {
    /// Unique interrupt id.
    pub id: Uuid,
    /// The plan execution targeted.
    pub plan_execution_id: Uuid,
    /// The node execution targeted; `None` means plan-wide.
    pub node_execution_id: Option<Uuid>,
    /// The requested change.
    pub interrupt_type: InterruptType,
    /// Audit record of who issued it.
    pub issuer: InterruptIssuer,
    /// Current lifecycle state.
    pub state: InterruptState,
    /// Rejection or resolution detail.
    pub reason: Option<String>,
    /// Registration-order sequence, monotonic per manager.
    pub seq: u64,
    /// When the interrupt was registered.
    pub registered_at: Timestamp,
}

impl InterruptPackage {
    /// Creates a new interrupt package in the `Registered` state.
    #[must_use]
    pub fn new(
        plan_execution_id: Uuid,
        node_execution_id: Option<Uuid>,
        interrupt_type: InterruptType,
        issuer: InterruptIssuer,
    ) -> Self {
        Self {
            id: generate_uuid(),
            plan_execution_id,
            node_execution_id,
            interrupt_type,
            issuer,
            state: InterruptState::Registered,
            reason: None,
            seq: 0,
            registered_at: now(),
        }
    }

    /// Returns true if the interrupt targets the plan as a whole.
    #[must_use]
    pub fn is_plan_wide(&self) -> bool {
        self.node_execution_id.is_none()
    }
}
