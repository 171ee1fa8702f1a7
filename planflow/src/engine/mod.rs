//! Orchestration engine: the state machine driving plan executions.
//!
//! The engine is the sole mutator of execution status. Completion signals
//! from every source (inline returns, wait-notify resumes, queued SDK
//! events) funnel through [`OrchestrationEngine::handle_node_status_update`],
//! which is idempotent under at-least-once delivery. Per-node transitions
//! are serialized through a keyed async lock, and every store mutation is
//! conditional on the expected prior status.

pub mod context;
mod tracker;

pub use context::{EngineConfig, EngineContext, EngineContextBuilder};

use crate::advise::{AdviseEvent, Adviser, AdviserResponse, AdviserType, RetryAdviserParameters};
use crate::core::{
    Ambiance, AmbianceLevel, ExecutionStatus, FailureInfo, NodeExecution, OrchestrationEvent, PlanExecution,
};
use crate::errors::{ConfigurationError, OrchestrationError};
use crate::events::EventSink;
use crate::facilitate::{FacilitationResponse, Facilitator};
use crate::interrupt::manager::InterruptTarget;
use crate::interrupt::{InterruptIssuer, InterruptPackage, InterruptState, InterruptType};
use crate::plan::{Plan, PlanNode};
use crate::store::{with_store_retry, ExecutionStore, NodeUpdate};
use crate::waitnotify::{NotifyPayload, ResumeData, WaitInstance};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tracker::ChildTracker;

/// A boxed, `Send` engine future. Used at the async-recursion points to
/// break the opaque-`impl Future` auto-trait cycle so the recursive futures
/// remain `Send` (required by `tokio::spawn`).
type BoxedEngineFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), OrchestrationError>> + Send + 'a>>;

fn intervention_token(node_execution_id: Uuid) -> String {
    format!("intervention-{node_execution_id}")
}

fn retry_token(node_execution_id: Uuid, attempt: u32) -> String {
    format!("retry-{node_execution_id}-{attempt}")
}

/// The orchestration engine.
///
/// Constructed from an explicit [`EngineContext`]; multiple isolated
/// engines can coexist in one process.
pub struct OrchestrationEngine {
    ctx: EngineContext,
    plans: DashMap<Uuid, Arc<Plan>>,
    node_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    interrupt_locks: DashMap<InterruptTarget, Arc<Mutex<()>>>,
    children: ChildTracker,
    completion: DashMap<Uuid, Arc<Notify>>,
}

impl OrchestrationEngine {
    /// Creates an engine from a context.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            plans: DashMap::new(),
            node_locks: DashMap::new(),
            interrupt_locks: DashMap::new(),
            children: ChildTracker::new(),
            completion: DashMap::new(),
        })
    }

    /// The context the engine was built from.
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Starts executing a plan.
    ///
    /// Validates plan structure and that every declared facilitator and
    /// adviser type resolves against the registries, creates the RUNNING
    /// plan execution, and schedules the entry node.
    pub async fn start_execution(
        self: &Arc<Self>,
        plan: Plan,
        inputs: Option<serde_json::Value>,
    ) -> Result<PlanExecution, OrchestrationError> {
        plan.validate()?;
        self.validate_configuration(&plan)?;

        let plan = Arc::new(plan);
        let plan_exec = PlanExecution::new(plan.id.clone());
        {
            let store = &self.ctx.store;
            let exec = plan_exec.clone();
            with_store_retry(&self.ctx.config.store_retry, "create_plan_execution", || {
                store.create_plan_execution(exec.clone())
            })
            .await?;
        }
        self.plans.insert(plan_exec.id, Arc::clone(&plan));
        self.emit(OrchestrationEvent::plan_started(plan_exec.id, &plan.id));
        info!(plan_execution_id = %plan_exec.id, plan_id = %plan.id, "Started plan execution");

        let entry = plan
            .node(&plan.entry_node_id)
            .ok_or_else(|| OrchestrationError::Internal("validated entry node missing".to_string()))?;
        let ambiance = Ambiance::new().descend(AmbianceLevel::new(&plan.id, &plan.name, crate::core::LevelKind::Pipeline));
        let node = self.create_node(plan_exec.id, entry, ambiance, inputs).await?;
        self.spawn_node(node.id);
        Ok(plan_exec)
    }

    /// Reports a node's outcome.
    ///
    /// The single entry point for every completion source. Idempotent: an
    /// update against an already-terminal node, or one that would regress
    /// the state machine, is a logged no-op.
    pub async fn handle_node_status_update(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        new_status: ExecutionStatus,
        response_data: Option<serde_json::Value>,
        failure_info: Option<FailureInfo>,
    ) -> Result<(), OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;

        let node = self.get_node(node_execution_id).await?;
        if node.status.is_terminal() {
            debug!(
                node_execution_id = %node_execution_id,
                current = %node.status,
                incoming = %new_status,
                "Status update for terminal node ignored"
            );
            return Ok(());
        }
        if !node.status.can_transition(new_status) {
            debug!(
                node_execution_id = %node_execution_id,
                current = %node.status,
                incoming = %new_status,
                "Out-of-order status update ignored"
            );
            return Ok(());
        }

        let mut update = NodeUpdate::status(new_status);
        if let Some(data) = response_data {
            update = update.with_output(data);
        }
        if let Some(failure) = failure_info {
            update = update.with_failure(failure);
        }
        let updated = self.update_node(node_execution_id, node.status, update).await?;
        self.emit(OrchestrationEvent::node_status_update(&updated));
        drop(guard);

        if new_status.is_terminal() {
            self.advise_node(node_execution_id).await?;
        }
        Ok(())
    }

    /// Resumes a node suspended on a correlation token.
    ///
    /// Consumes the token exactly once; a resume for an unknown or
    /// already-consumed token is a logged no-op.
    pub async fn resume_node(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        correlation_token: &str,
        data: ResumeData,
    ) -> Result<(), OrchestrationError> {
        let fired = self.ctx.wait_notify.notify(correlation_token, NotifyPayload::Signal(data));
        if !fired {
            debug!(
                node_execution_id = %node_execution_id,
                token = correlation_token,
                "Resume for unknown or consumed token ignored"
            );
        }
        Ok(())
    }

    /// Registers an interrupt; acceptance is synchronous, application is
    /// asynchronous.
    pub async fn register_interrupt(
        self: &Arc<Self>,
        package: InterruptPackage,
    ) -> Result<InterruptPackage, OrchestrationError> {
        let registered = self.ctx.interrupts.register(package).await?;
        self.emit(
            OrchestrationEvent::new(crate::core::event::INTERRUPT_REGISTERED)
                .add_data("interrupt_id", serde_json::json!(registered.id))
                .add_data("interrupt_type", serde_json::json!(registered.interrupt_type))
                .add_data("state", serde_json::json!(registered.state)),
        );
        if registered.state == InterruptState::Registered {
            let engine = Arc::clone(self);
            let target = InterruptTarget::of(&registered);
            tokio::spawn(async move {
                if let Err(e) = engine.apply_pending_interrupts(target).await {
                    error!(error = %e, "Interrupt application failed");
                }
            });
        }
        Ok(registered)
    }

    /// Registers a plan-wide abort.
    pub async fn abort_plan(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        issuer: InterruptIssuer,
    ) -> Result<InterruptPackage, OrchestrationError> {
        self.register_interrupt(InterruptPackage::new(plan_execution_id, None, InterruptType::Abort, issuer))
            .await
    }

    /// Registers a plan-wide pause.
    pub async fn pause_plan(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        issuer: InterruptIssuer,
    ) -> Result<InterruptPackage, OrchestrationError> {
        self.register_interrupt(InterruptPackage::new(plan_execution_id, None, InterruptType::Pause, issuer))
            .await
    }

    /// Registers a plan-wide resume.
    pub async fn resume_plan(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        issuer: InterruptIssuer,
    ) -> Result<InterruptPackage, OrchestrationError> {
        self.register_interrupt(InterruptPackage::new(plan_execution_id, None, InterruptType::Resume, issuer))
            .await
    }

    /// Waits until the plan execution reaches a terminal status.
    pub async fn await_completion(&self, plan_execution_id: Uuid) -> Result<PlanExecution, OrchestrationError> {
        let notify = self.completion.entry(plan_execution_id).or_default().clone();
        loop {
            let notified = notify.notified();
            let exec = self
                .ctx
                .store
                .get_plan_execution(plan_execution_id)
                .await?
                .ok_or(OrchestrationError::NotFound {
                    entity: "plan_execution",
                    id: plan_execution_id.to_string(),
                })?;
            if exec.status.is_terminal() {
                return Ok(exec);
            }
            notified.await;
        }
    }

    // ------------------------------------------------------------------
    // Node execution
    // ------------------------------------------------------------------

    fn node_lock(&self, node_execution_id: Uuid) -> Arc<Mutex<()>> {
        self.node_locks.entry(node_execution_id).or_default().clone()
    }

    fn emit(&self, event: OrchestrationEvent) {
        self.ctx.event_sink.try_emit(event);
    }

    fn plan_for(&self, plan_execution_id: Uuid) -> Result<Arc<Plan>, OrchestrationError> {
        self.plans
            .get(&plan_execution_id)
            .map(|p| Arc::clone(&p))
            .ok_or(OrchestrationError::NotFound {
                entity: "plan",
                id: plan_execution_id.to_string(),
            })
    }

    async fn get_node(&self, node_execution_id: Uuid) -> Result<NodeExecution, OrchestrationError> {
        self.ctx
            .store
            .get_node_execution(node_execution_id)
            .await?
            .ok_or(OrchestrationError::NotFound {
                entity: "node_execution",
                id: node_execution_id.to_string(),
            })
    }

    async fn update_node(
        &self,
        node_execution_id: Uuid,
        expected: ExecutionStatus,
        update: NodeUpdate,
    ) -> Result<NodeExecution, OrchestrationError> {
        let store = &self.ctx.store;
        with_store_retry(&self.ctx.config.store_retry, "update_node", || {
            store.update_node(node_execution_id, expected, update.clone())
        })
        .await
    }

    fn validate_configuration(&self, plan: &Plan) -> Result<(), OrchestrationError> {
        for node in plan.nodes() {
            if self.ctx.facilitators.resolve(node.facilitator_type).is_none() {
                return Err(ConfigurationError::MissingFacilitator {
                    facilitator_type: node.facilitator_type.to_string(),
                    node_id: node.id.clone(),
                }
                .into());
            }
            if let Some(spec) = &node.adviser {
                if self.ctx.advisers.resolve(spec.adviser_type).is_none() {
                    return Err(ConfigurationError::MissingAdviser {
                        adviser_type: spec.adviser_type.to_string(),
                        node_id: node.id.clone(),
                    }
                    .into());
                }
                if spec.adviser_type == AdviserType::Retry {
                    RetryAdviserParameters::from_value(&spec.parameters)?;
                }
            }
        }
        Ok(())
    }

    async fn create_node(
        &self,
        plan_execution_id: Uuid,
        plan_node: &PlanNode,
        ambiance: Ambiance,
        input: Option<serde_json::Value>,
    ) -> Result<NodeExecution, OrchestrationError> {
        let mut node =
            NodeExecution::new(plan_execution_id, &plan_node.id, &plan_node.name).with_ambiance(ambiance);
        if let Some(spec) = &plan_node.adviser {
            node.adviser_params = Some(spec.parameters.clone());
        }
        node.input = input.or_else(|| plan_node.step_parameters.clone());

        let store = &self.ctx.store;
        let record = node.clone();
        with_store_retry(&self.ctx.config.store_retry, "create_node_execution", || {
            store.create_node_execution(record.clone())
        })
        .await?;
        self.emit(OrchestrationEvent::node_status_update(&node));
        Ok(node)
    }

    fn spawn_node(self: &Arc<Self>, node_execution_id: Uuid) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.run_node(node_execution_id).await {
                error!(node_execution_id = %node_execution_id, error = %e, "Node execution failed");
                engine.mark_errored(node_execution_id).await;
            }
        });
    }

    async fn run_node(self: &Arc<Self>, node_execution_id: Uuid) -> Result<(), OrchestrationError> {
        // Interrupts queued while the node sat in the run queue apply first.
        self.apply_pending_interrupts(InterruptTarget::Node(node_execution_id)).await?;

        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;

        let node = self.get_node(node_execution_id).await?;
        if node.status != ExecutionStatus::Queued {
            debug!(node_execution_id = %node_execution_id, status = %node.status, "Node not queued; skipping run");
            return Ok(());
        }

        let plan_exec = self
            .ctx
            .store
            .get_plan_execution(node.plan_execution_id)
            .await?
            .ok_or(OrchestrationError::NotFound {
                entity: "plan_execution",
                id: node.plan_execution_id.to_string(),
            })?;
        if plan_exec.status == ExecutionStatus::Paused {
            debug!(node_execution_id = %node_execution_id, "Plan paused; node stays queued");
            return Ok(());
        }
        if plan_exec.status.is_terminal() {
            debug!(node_execution_id = %node_execution_id, "Plan already terminal; node not run");
            return Ok(());
        }

        let plan = self.plan_for(node.plan_execution_id)?;
        let plan_node = plan
            .node(&node.node_id)
            .ok_or_else(|| OrchestrationError::Internal(format!("plan node '{}' missing", node.node_id)))?;
        let facilitator = self.ctx.facilitators.resolve(plan_node.facilitator_type).ok_or(
            ConfigurationError::MissingFacilitator {
                facilitator_type: plan_node.facilitator_type.to_string(),
                node_id: plan_node.id.clone(),
            },
        )?;

        let running = self
            .update_node(node_execution_id, ExecutionStatus::Queued, NodeUpdate::status(ExecutionStatus::Running))
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&running));
        drop(guard);

        let response = facilitator.facilitate(&running, plan_node).await?;
        match response {
            FacilitationResponse::Sync {
                status,
                output,
                failure_info,
            } => {
                self.handle_node_status_update(node_execution_id, status, output, failure_info).await?;
            }
            FacilitationResponse::Async => {
                debug!(node_execution_id = %node_execution_id, "Node dispatched out of process");
            }
            FacilitationResponse::Task { correlation_token } => {
                self.register_task_wait(&running, correlation_token);
            }
            FacilitationResponse::Children {
                child_node_ids,
                combiner,
            } => {
                self.schedule_children(&running, plan_node, &plan, child_node_ids, combiner).await?;
            }
        }
        Ok(())
    }

    fn register_task_wait(self: &Arc<Self>, node: &NodeExecution, correlation_token: String) {
        let engine = Arc::clone(self);
        let node_execution_id = node.id;
        let instance = WaitInstance::new(correlation_token, node.plan_execution_id, node_execution_id);
        debug!(node_execution_id = %node_execution_id, token = %instance.token, "Registered task wait");
        self.ctx.wait_notify.wait_for_event(
            instance,
            self.ctx.config.task_timeout,
            Box::new(move |payload| {
                tokio::spawn(async move {
                    let result = match payload {
                        NotifyPayload::Signal(data) => {
                            engine
                                .handle_node_status_update(node_execution_id, data.status, data.output, data.failure_info)
                                .await
                        }
                        NotifyPayload::Timeout => {
                            engine
                                .handle_node_status_update(
                                    node_execution_id,
                                    ExecutionStatus::Expired,
                                    None,
                                    Some(FailureInfo::timeout("task completion deadline elapsed")),
                                )
                                .await
                        }
                    };
                    if let Err(e) = result {
                        error!(node_execution_id = %node_execution_id, error = %e, "Task resume failed");
                        engine.mark_errored(node_execution_id).await;
                    }
                });
            }),
        );
    }

    async fn schedule_children(
        self: &Arc<Self>,
        parent: &NodeExecution,
        parent_plan_node: &PlanNode,
        plan: &Arc<Plan>,
        child_node_ids: Vec<String>,
        combiner: Arc<dyn crate::facilitate::ChildCombiner>,
    ) -> Result<(), OrchestrationError> {
        let ambiance = parent.ambiance.descend(AmbianceLevel::new(
            &parent_plan_node.id,
            &parent_plan_node.name,
            parent_plan_node.kind,
        ));

        let mut child_exec_ids = Vec::with_capacity(child_node_ids.len());
        for child_node_id in &child_node_ids {
            let child_plan_node = plan
                .node(child_node_id)
                .ok_or_else(|| OrchestrationError::Internal(format!("child plan node '{child_node_id}' missing")))?;
            let child = self
                .create_node(parent.plan_execution_id, child_plan_node, ambiance.clone(), None)
                .await?;
            child_exec_ids.push(child.id);
        }

        self.children.register_group(parent.id, child_exec_ids.clone(), combiner);
        for child_id in child_exec_ids {
            self.spawn_node(child_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Advising
    // ------------------------------------------------------------------

    async fn advise_node(self: &Arc<Self>, node_execution_id: Uuid) -> Result<(), OrchestrationError> {
        // Interrupts registered while the node was running apply before advice.
        self.apply_pending_interrupts(InterruptTarget::Node(node_execution_id)).await?;
        self.advise_node_inner(node_execution_id, false).await
    }

    /// Advising without the leading interrupt pass.
    ///
    /// `from_interrupt` marks invocations made while the caller holds the
    /// node's interrupt-application lock; any interrupts the advisers
    /// register are then applied by a deferred task instead of inline.
    fn advise_node_inner(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        from_interrupt: bool,
    ) -> BoxedEngineFuture<'_> {
        Box::pin(async move {
        let node = self.get_node(node_execution_id).await?;
        if !node.status.is_terminal() {
            // An interrupt re-armed or parked the node; nothing to advise.
            return Ok(());
        }

        let plan = self.plan_for(node.plan_execution_id)?;
        let plan_node = plan
            .node(&node.node_id)
            .ok_or_else(|| OrchestrationError::Internal(format!("plan node '{}' missing", node.node_id)))?;
        let event = AdviseEvent::new(node, plan_node.clone());

        let advice = match &plan_node.adviser {
            Some(spec) => {
                let adviser =
                    self.ctx
                        .advisers
                        .resolve(spec.adviser_type)
                        .ok_or(ConfigurationError::MissingAdviser {
                            adviser_type: spec.adviser_type.to_string(),
                            node_id: plan_node.id.clone(),
                        })?;
                if adviser.can_advise(&event) {
                    match adviser.on_advise_event(&event).await? {
                        Some(response) => Some(response),
                        None => {
                            // The adviser resolved the event through an interrupt.
                            if from_interrupt {
                                let engine = Arc::clone(self);
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        engine.apply_pending_interrupts(InterruptTarget::Node(node_execution_id)).await
                                    {
                                        error!(error = %e, "Deferred interrupt application failed");
                                    }
                                });
                            } else {
                                self.apply_pending_interrupts(InterruptTarget::Node(node_execution_id)).await?;
                            }
                            None
                        }
                    }
                } else {
                    Some(self.default_advice(&event))
                }
            }
            None => Some(self.default_advice(&event)),
        };

        if let Some(advice) = advice {
            if self.children.parent_of(node_execution_id).is_some() {
                self.apply_child_advice(&event, advice).await?;
            } else {
                self.apply_advice(&event, advice).await?;
            }
        }
        Ok(())
        })
    }

    fn default_advice(&self, event: &AdviseEvent) -> AdviserResponse {
        if event.status.is_success() {
            AdviserResponse::NextStep {
                next_node_id: event.plan_node.next.clone(),
            }
        } else {
            AdviserResponse::EndPlan
        }
    }

    async fn apply_advice(
        self: &Arc<Self>,
        event: &AdviseEvent,
        advice: AdviserResponse,
    ) -> Result<(), OrchestrationError> {
        let node_execution_id = event.node.id;
        let plan_execution_id = event.node.plan_execution_id;

        match advice {
            AdviserResponse::NextStep { next_node_id } => {
                self.proceed_to(plan_execution_id, &event.node, next_node_id, event.status).await
            }
            AdviserResponse::Ignore { next_node_id } => {
                // The failure stays recorded; the plan proceeds regardless.
                self.proceed_to(plan_execution_id, &event.node, next_node_id, ExecutionStatus::Succeeded)
                    .await
            }
            AdviserResponse::EndPlan => {
                self.complete_plan(plan_execution_id, Self::plan_status_for(event.status)).await
            }
            AdviserResponse::Retry {
                node_execution_id: target,
                wait,
            } => self.apply_retry(target, wait).await,
            AdviserResponse::InterventionWait { timeout } => {
                self.park_for_intervention(node_execution_id, timeout).await
            }
            AdviserResponse::MarkSuccess { next_node_id } => {
                let marked = self.mark_success(node_execution_id).await?;
                self.proceed_to(plan_execution_id, &marked, next_node_id, ExecutionStatus::Succeeded).await
            }
        }
    }

    /// Advice application for nodes that report to a fan-out parent.
    ///
    /// Re-arming advices (retry, intervention) apply as usual; every other
    /// advice resolves by reporting the child outcome to its group.
    async fn apply_child_advice(
        self: &Arc<Self>,
        event: &AdviseEvent,
        advice: AdviserResponse,
    ) -> Result<(), OrchestrationError> {
        let node_execution_id = event.node.id;
        match advice {
            AdviserResponse::Retry {
                node_execution_id: target,
                wait,
            } => self.apply_retry(target, wait).await,
            AdviserResponse::InterventionWait { timeout } => {
                self.park_for_intervention(node_execution_id, timeout).await
            }
            AdviserResponse::MarkSuccess { .. } => {
                self.mark_success(node_execution_id).await?;
                self.report_child(node_execution_id, ExecutionStatus::Succeeded).await
            }
            AdviserResponse::Ignore { .. } => {
                self.report_child(node_execution_id, ExecutionStatus::Succeeded).await
            }
            AdviserResponse::NextStep { .. } | AdviserResponse::EndPlan => {
                self.report_child(node_execution_id, event.status).await
            }
        }
    }

    async fn report_child(
        self: &Arc<Self>,
        child_execution_id: Uuid,
        status: ExecutionStatus,
    ) -> Result<(), OrchestrationError> {
        if let Some((parent, combined)) = self.children.record(child_execution_id, status) {
            debug!(parent_execution_id = %parent, combined = %combined, "Fan-out group decided");
            let failure = combined
                .is_failure()
                .then(|| FailureInfo::application("one or more child executions did not succeed"));
            self.handle_node_status_update(parent, combined, None, failure).await?;
        }
        Ok(())
    }

    async fn proceed_to(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        current: &NodeExecution,
        next_node_id: Option<String>,
        completion_status: ExecutionStatus,
    ) -> Result<(), OrchestrationError> {
        match next_node_id {
            Some(next_id) => {
                let plan = self.plan_for(plan_execution_id)?;
                let next_plan_node = plan
                    .node(&next_id)
                    .ok_or_else(|| OrchestrationError::Internal(format!("next plan node '{next_id}' missing")))?;
                let next = self
                    .create_node(plan_execution_id, next_plan_node, current.ambiance.clone(), None)
                    .await?;
                self.spawn_node(next.id);
                Ok(())
            }
            None => {
                let status = if completion_status.is_success() {
                    ExecutionStatus::Succeeded
                } else {
                    Self::plan_status_for(completion_status)
                };
                self.complete_plan(plan_execution_id, status).await
            }
        }
    }

    async fn apply_retry(self: &Arc<Self>, node_execution_id: Uuid, wait: Duration) -> Result<(), OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if !node.status.can_transition(ExecutionStatus::Queued) {
            debug!(node_execution_id = %node_execution_id, status = %node.status, "Retry target not re-armable");
            return Ok(());
        }
        let rearmed = self
            .update_node(
                node_execution_id,
                node.status,
                NodeUpdate::status(ExecutionStatus::Queued).incrementing_retry(),
            )
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&rearmed));
        drop(guard);

        if wait.is_zero() {
            self.spawn_node(node_execution_id);
        } else {
            self.emit(OrchestrationEvent::retry_scheduled(&rearmed, wait.as_millis() as u64));
            let token = retry_token(node_execution_id, rearmed.retry_count);
            let engine = Arc::clone(self);
            let instance = WaitInstance::new(token.clone(), rearmed.plan_execution_id, node_execution_id);
            self.ctx.wait_notify.wait_for_event(
                instance,
                None,
                Box::new(move |_payload| {
                    engine.spawn_node(node_execution_id);
                }),
            );
            self.ctx.wait_notify.notify_after(token, wait, NotifyPayload::Timeout);
        }
        Ok(())
    }

    async fn park_for_intervention(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        timeout: Duration,
    ) -> Result<(), OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if !node.status.can_transition(ExecutionStatus::InterventionWaiting) {
            debug!(node_execution_id = %node_execution_id, status = %node.status, "Cannot park for intervention");
            return Ok(());
        }
        let parked = self
            .update_node(node_execution_id, node.status, NodeUpdate::status(ExecutionStatus::InterventionWaiting))
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&parked));
        drop(guard);
        info!(node_execution_id = %node_execution_id, timeout_ms = timeout.as_millis() as u64, "Parked for manual intervention");

        let engine = Arc::clone(self);
        let plan_execution_id = parked.plan_execution_id;
        let instance = WaitInstance::new(intervention_token(node_execution_id), plan_execution_id, node_execution_id);
        self.ctx.wait_notify.wait_for_event(
            instance,
            Some(timeout),
            Box::new(move |payload| {
                if let NotifyPayload::Timeout = payload {
                    tokio::spawn(async move {
                        if let Err(e) = engine.expire_intervention(node_execution_id, plan_execution_id).await {
                            error!(node_execution_id = %node_execution_id, error = %e, "Intervention expiry failed");
                        }
                    });
                }
                // A manual interrupt consumed the token; it drives the node.
            }),
        );
        Ok(())
    }

    async fn expire_intervention(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        plan_execution_id: Uuid,
    ) -> Result<(), OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if node.status != ExecutionStatus::InterventionWaiting {
            return Ok(());
        }
        let expired = self
            .update_node(
                node_execution_id,
                ExecutionStatus::InterventionWaiting,
                NodeUpdate::status(ExecutionStatus::Expired)
                    .with_failure(FailureInfo::timeout("manual intervention window elapsed")),
            )
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&expired));
        drop(guard);
        self.complete_plan(plan_execution_id, ExecutionStatus::Expired).await
    }

    async fn mark_success(self: &Arc<Self>, node_execution_id: Uuid) -> Result<NodeExecution, OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let _guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if node.status == ExecutionStatus::Succeeded {
            return Ok(node);
        }
        let marked = self
            .update_node(node_execution_id, node.status, NodeUpdate::status(ExecutionStatus::Succeeded))
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&marked));
        Ok(marked)
    }

    fn plan_status_for(node_status: ExecutionStatus) -> ExecutionStatus {
        match node_status {
            ExecutionStatus::Succeeded | ExecutionStatus::Skipped => ExecutionStatus::Succeeded,
            ExecutionStatus::Aborted => ExecutionStatus::Aborted,
            ExecutionStatus::Expired => ExecutionStatus::Expired,
            ExecutionStatus::Errored => ExecutionStatus::Errored,
            _ => ExecutionStatus::Failed,
        }
    }

    async fn complete_plan(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        status: ExecutionStatus,
    ) -> Result<(), OrchestrationError> {
        let exec = self
            .ctx
            .store
            .get_plan_execution(plan_execution_id)
            .await?
            .ok_or(OrchestrationError::NotFound {
                entity: "plan_execution",
                id: plan_execution_id.to_string(),
            })?;
        if exec.status.is_terminal() {
            return Ok(());
        }
        let store = &self.ctx.store;
        let result = with_store_retry(&self.ctx.config.store_retry, "update_plan_status", || {
            store.update_plan_status(plan_execution_id, exec.status, status)
        })
        .await;
        match result {
            Ok(updated) => {
                info!(plan_execution_id = %plan_execution_id, status = %updated.status, "Plan execution completed");
                self.emit(OrchestrationEvent::plan_completed(plan_execution_id, updated.status));
            }
            Err(OrchestrationError::StoreConflict { .. }) => {
                // Another path completed the plan concurrently.
                debug!(plan_execution_id = %plan_execution_id, "Plan completion raced; keeping first result");
            }
            Err(e) => return Err(e),
        }
        if let Some(notify) = self.completion.get(&plan_execution_id) {
            notify.notify_waiters();
        }
        Ok(())
    }

    /// Marks a node and its plan as errored after an unrecoverable
    /// configuration or infrastructure failure. Best effort; progress is
    /// never silently lost.
    async fn mark_errored(self: &Arc<Self>, node_execution_id: Uuid) {
        let Ok(node) = self.get_node(node_execution_id).await else {
            return;
        };
        if !node.status.is_terminal() {
            let _ = self
                .update_node(node_execution_id, node.status, NodeUpdate::status(ExecutionStatus::Errored))
                .await;
        }
        let _ = self.complete_plan(node.plan_execution_id, ExecutionStatus::Errored).await;
    }

    // ------------------------------------------------------------------
    // Interrupt application
    // ------------------------------------------------------------------

    /// Applies all pending interrupts for a target in registration order.
    ///
    /// A per-target lock keeps concurrent registrations from interleaving
    /// their application.
    pub async fn apply_pending_interrupts(self: &Arc<Self>, target: InterruptTarget) -> Result<(), OrchestrationError> {
        let lock = self.interrupt_locks.entry(target).or_default().clone();
        let _guard = lock.lock().await;
        for package in self.ctx.interrupts.drain(target) {
            match self.apply_interrupt(&package).await {
                Ok(()) => {
                    self.ctx.interrupts.resolve(package.id, InterruptState::Processed, None);
                }
                Err(e) => {
                    warn!(interrupt_id = %package.id, error = %e, "Interrupt not applicable");
                    self.ctx
                        .interrupts
                        .resolve(package.id, InterruptState::Rejected, Some(e.to_string()));
                }
            }
            self.emit(
                OrchestrationEvent::new(crate::core::event::INTERRUPT_RESOLVED)
                    .add_data("interrupt_id", serde_json::json!(package.id))
                    .add_data("interrupt_type", serde_json::json!(package.interrupt_type)),
            );
        }
        Ok(())
    }

    async fn apply_interrupt(self: &Arc<Self>, package: &InterruptPackage) -> Result<(), OrchestrationError> {
        match package.node_execution_id {
            Some(node_execution_id) => self.apply_node_interrupt(package, node_execution_id).await,
            None => self.apply_plan_interrupt(package).await,
        }
    }

    async fn apply_node_interrupt(
        self: &Arc<Self>,
        package: &InterruptPackage,
        node_execution_id: Uuid,
    ) -> Result<(), OrchestrationError> {
        match package.interrupt_type {
            InterruptType::Abort => {
                self.abort_node(node_execution_id, true).await?;
                Ok(())
            }
            InterruptType::Pause => {
                let lock = self.node_lock(node_execution_id);
                let _guard = lock.lock().await;
                let node = self.get_node(node_execution_id).await?;
                if node.status == ExecutionStatus::Running {
                    let paused = self
                        .update_node(node_execution_id, ExecutionStatus::Running, NodeUpdate::status(ExecutionStatus::Paused))
                        .await?;
                    self.emit(OrchestrationEvent::node_status_update(&paused));
                }
                Ok(())
            }
            InterruptType::Resume => {
                let lock = self.node_lock(node_execution_id);
                let guard = lock.lock().await;
                let node = self.get_node(node_execution_id).await?;
                match node.status {
                    ExecutionStatus::Paused => {
                        let resumed = self
                            .update_node(node_execution_id, ExecutionStatus::Paused, NodeUpdate::status(ExecutionStatus::Running))
                            .await?;
                        self.emit(OrchestrationEvent::node_status_update(&resumed));
                        Ok(())
                    }
                    ExecutionStatus::InterventionWaiting => {
                        drop(guard);
                        self.rearm_from_intervention(node_execution_id, false).await
                    }
                    _ => Err(OrchestrationError::Internal(format!(
                        "resume not applicable in status '{}'",
                        node.status
                    ))),
                }
            }
            InterruptType::Retry => {
                // Consume a pending intervention wait, if any.
                self.ctx.wait_notify.notify(
                    &intervention_token(node_execution_id),
                    NotifyPayload::Signal(ResumeData::new(ExecutionStatus::Queued)),
                );
                self.rearm_from_intervention(node_execution_id, false).await
            }
            InterruptType::Ignore => {
                let node = self.get_node(node_execution_id).await?;
                if !matches!(node.status, ExecutionStatus::Failed | ExecutionStatus::Expired) {
                    return Err(OrchestrationError::Internal(format!(
                        "ignore not applicable in status '{}'",
                        node.status
                    )));
                }
                if self.children.parent_of(node_execution_id).is_some() {
                    return self.report_child(node_execution_id, ExecutionStatus::Succeeded).await;
                }
                let plan = self.plan_for(node.plan_execution_id)?;
                let plan_node = plan
                    .node(&node.node_id)
                    .ok_or_else(|| OrchestrationError::Internal(format!("plan node '{}' missing", node.node_id)))?;
                let next = plan_node.on_failure_next.clone().or_else(|| plan_node.next.clone());
                self.proceed_to(node.plan_execution_id, &node, next, ExecutionStatus::Succeeded).await
            }
            InterruptType::MarkSuccess => {
                self.ctx.wait_notify.notify(
                    &intervention_token(node_execution_id),
                    NotifyPayload::Signal(ResumeData::new(ExecutionStatus::Succeeded)),
                );
                let marked = self.mark_success(node_execution_id).await?;
                if self.children.parent_of(node_execution_id).is_some() {
                    return self.report_child(node_execution_id, ExecutionStatus::Succeeded).await;
                }
                let plan = self.plan_for(marked.plan_execution_id)?;
                let plan_node = plan
                    .node(&marked.node_id)
                    .ok_or_else(|| OrchestrationError::Internal(format!("plan node '{}' missing", marked.node_id)))?;
                self.proceed_to(marked.plan_execution_id, &marked, plan_node.next.clone(), ExecutionStatus::Succeeded)
                    .await
            }
            InterruptType::Expire => {
                let lock = self.node_lock(node_execution_id);
                let guard = lock.lock().await;
                let node = self.get_node(node_execution_id).await?;
                if node.status.is_terminal() {
                    return Ok(());
                }
                if !node.status.can_transition(ExecutionStatus::Expired) {
                    return Err(OrchestrationError::Internal(format!(
                        "expire not applicable in status '{}'",
                        node.status
                    )));
                }
                let expired = self
                    .update_node(
                        node_execution_id,
                        node.status,
                        NodeUpdate::status(ExecutionStatus::Expired)
                            .with_failure(FailureInfo::timeout("expired by interrupt")),
                    )
                    .await?;
                self.emit(OrchestrationEvent::node_status_update(&expired));
                drop(guard);
                self.advise_node_inner(node_execution_id, true).await
            }
        }
    }

    async fn rearm_from_intervention(
        self: &Arc<Self>,
        node_execution_id: Uuid,
        increment_retry: bool,
    ) -> Result<(), OrchestrationError> {
        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if !node.status.can_transition(ExecutionStatus::Queued) {
            return Err(OrchestrationError::Internal(format!(
                "retry not applicable in status '{}'",
                node.status
            )));
        }
        let mut update = NodeUpdate::status(ExecutionStatus::Queued);
        if increment_retry {
            update = update.incrementing_retry();
        }
        let rearmed = self.update_node(node_execution_id, node.status, update).await?;
        self.emit(OrchestrationEvent::node_status_update(&rearmed));
        drop(guard);
        self.spawn_node(node_execution_id);
        Ok(())
    }

    async fn apply_plan_interrupt(self: &Arc<Self>, package: &InterruptPackage) -> Result<(), OrchestrationError> {
        let plan_execution_id = package.plan_execution_id;
        match package.interrupt_type {
            InterruptType::Abort => self.discontinue_plan(plan_execution_id, ExecutionStatus::Aborted).await,
            InterruptType::Expire => self.discontinue_plan(plan_execution_id, ExecutionStatus::Expired).await,
            InterruptType::Pause => {
                let store = &self.ctx.store;
                with_store_retry(&self.ctx.config.store_retry, "update_plan_status", || {
                    store.update_plan_status(plan_execution_id, ExecutionStatus::Running, ExecutionStatus::Paused)
                })
                .await?;
                info!(plan_execution_id = %plan_execution_id, "Plan paused");
                Ok(())
            }
            InterruptType::Resume => {
                let store = &self.ctx.store;
                with_store_retry(&self.ctx.config.store_retry, "update_plan_status", || {
                    store.update_plan_status(plan_execution_id, ExecutionStatus::Paused, ExecutionStatus::Running)
                })
                .await?;
                info!(plan_execution_id = %plan_execution_id, "Plan resumed");
                let queued = self
                    .ctx
                    .store
                    .nodes_with_status(plan_execution_id, ExecutionStatus::Queued)
                    .await?;
                for node in queued {
                    self.spawn_node(node.id);
                }
                Ok(())
            }
            InterruptType::Retry | InterruptType::Ignore | InterruptType::MarkSuccess => {
                Err(OrchestrationError::Internal(format!(
                    "interrupt '{}' requires a target node",
                    package.interrupt_type
                )))
            }
        }
    }

    /// Winds a plan down: every not-yet-terminal node is aborted, children
    /// before parents, then the plan itself reaches `final_status`.
    async fn discontinue_plan(
        self: &Arc<Self>,
        plan_execution_id: Uuid,
        final_status: ExecutionStatus,
    ) -> Result<(), OrchestrationError> {
        let exec = self
            .ctx
            .store
            .get_plan_execution(plan_execution_id)
            .await?
            .ok_or(OrchestrationError::NotFound {
                entity: "plan_execution",
                id: plan_execution_id.to_string(),
            })?;
        if exec.status.is_terminal() {
            return Ok(());
        }
        let store = &self.ctx.store;
        with_store_retry(&self.ctx.config.store_retry, "update_plan_status", || {
            store.update_plan_status(plan_execution_id, exec.status, ExecutionStatus::Discontinuing)
        })
        .await?;

        let nodes = self.ctx.store.nodes_for_plan(plan_execution_id).await?;
        for node in nodes {
            if node.status.is_terminal() {
                continue;
            }
            // Fan-out parents cascade to their own children first.
            if self.children.parent_of(node.id).is_some() {
                continue;
            }
            self.abort_node(node.id, false).await?;
        }

        let store = &self.ctx.store;
        let result = with_store_retry(&self.ctx.config.store_retry, "update_plan_status", || {
            store.update_plan_status(plan_execution_id, ExecutionStatus::Discontinuing, final_status)
        })
        .await;
        if let Err(OrchestrationError::StoreConflict { .. }) = result {
            debug!(plan_execution_id = %plan_execution_id, "Plan discontinuation raced");
        } else {
            result?;
            self.emit(OrchestrationEvent::plan_completed(plan_execution_id, final_status));
        }
        if let Some(notify) = self.completion.get(&plan_execution_id) {
            notify.notify_waiters();
        }
        Ok(())
    }

    /// Aborts a node: children first, then Discontinuing, a best-effort
    /// facilitator cancel, and finally Aborted. Late completion signals for
    /// the aborted node are no-ops.
    async fn abort_node(self: &Arc<Self>, node_execution_id: Uuid, advise: bool) -> Result<(), OrchestrationError> {
        let pending_children = self.children.remove_group(node_execution_id);
        for child in pending_children {
            self.abort_node(child, false).await?;
        }

        let lock = self.node_lock(node_execution_id);
        let guard = lock.lock().await;
        let node = self.get_node(node_execution_id).await?;
        if node.status.is_terminal() {
            return Ok(());
        }

        let discontinuing = self
            .update_node(node_execution_id, node.status, NodeUpdate::status(ExecutionStatus::Discontinuing))
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&discontinuing));

        if let Ok(plan) = self.plan_for(node.plan_execution_id) {
            if let Some(plan_node) = plan.node(&node.node_id) {
                if let Some(facilitator) = self.ctx.facilitators.resolve(plan_node.facilitator_type) {
                    facilitator.cancel(&discontinuing).await;
                }
            }
        }

        let aborted = self
            .update_node(node_execution_id, ExecutionStatus::Discontinuing, NodeUpdate::status(ExecutionStatus::Aborted))
            .await?;
        self.emit(OrchestrationEvent::node_status_update(&aborted));
        drop(guard);

        if self.children.parent_of(node_execution_id).is_some() {
            return self.report_child(node_execution_id, ExecutionStatus::Aborted).await;
        }
        if advise {
            self.advise_node_inner(node_execution_id, true).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("active_plans", &self.plans.len())
            .finish()
    }
}
