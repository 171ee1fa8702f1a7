//! # Planflow
//!
//! A pipeline orchestration execution engine.
//!
//! Planflow walks a pre-compiled execution plan (a DAG of stages and
//! steps), decides how each node is facilitated (inline, out of process,
//! as a remote task, or as a fan-out of children), advises what happens
//! after a node finishes (retry, ignore, fail, intervene, proceed), and
//! propagates externally triggered interrupts (abort, pause, retry) into
//! the state machine — while node execution may be delegated to
//! out-of-process SDK services communicating over a message queue.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use planflow::prelude::*;
//!
//! // Compile a plan
//! let plan = Plan::builder("deploy", "Deploy")
//!     .node(PlanNode::new("build", "Build", FacilitatorType::Sync).with_next("test"))
//!     .node(PlanNode::new("test", "Test", FacilitatorType::Sync))
//!     .build()?;
//!
//! // Wire an engine and run it
//! let engine = OrchestrationEngine::new(ctx);
//! let execution = engine.start_execution(plan, None).await?;
//! let finished = engine.await_completion(execution.id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod advise;
pub mod consumer;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod facilitate;
pub mod interrupt;
pub mod plan;
pub mod store;
pub mod testing;
pub mod utils;
pub mod waitnotify;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::advise::{
        AdviseEvent, Adviser, AdviserRegistry, AdviserResponse, AdviserType, IgnoreFailureAdviser,
        RepairAction, RetryAdviser, RetryAdviserParameters,
    };
    pub use crate::consumer::{
        InMemoryQueue, QueueConsumer, QueueMessage, SdkResponseEvent, SdkResponseEventConsumer,
    };
    pub use crate::core::{
        Ambiance, AmbianceLevel, ExecutionStatus, FailureInfo, FailureType, LevelKind, NodeExecution,
        OrchestrationEvent, PlanExecution,
    };
    pub use crate::engine::{EngineConfig, EngineContext, OrchestrationEngine};
    pub use crate::errors::{ConfigurationError, InvalidPlanError, OrchestrationError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::facilitate::{
        AllSucceedCombiner, AnySucceedCombiner, AsyncFacilitator, ChildCombiner, ChildrenFacilitator,
        FacilitationResponse, Facilitator, FacilitatorRegistry, FacilitatorType, StepExecutor, StepInput,
        StepOutcome, SyncFacilitator, TaskFacilitator,
    };
    pub use crate::interrupt::{
        InterruptIssuer, InterruptManager, InterruptPackage, InterruptState, InterruptType,
    };
    pub use crate::plan::{AdviserSpec, Plan, PlanBuilder, PlanNode};
    pub use crate::store::{ExecutionStore, InMemoryExecutionStore, NodeUpdate, StoreRetryPolicy};
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
    pub use crate::waitnotify::{NotifyPayload, ResumeData, WaitInstance, WaitNotifyEngine};
}
