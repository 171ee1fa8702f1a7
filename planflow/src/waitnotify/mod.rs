//! Wait-notify: correlation-token based suspension and resume.
//!
//! Any component may park a node execution pending an external signal
//! without holding a thread. A registered continuation fires exactly once,
//! on the first `notify` for its token; later notifies for the same token
//! are logged no-ops because delivery is at-least-once.

use crate::core::{ExecutionStatus, FailureInfo};
use crate::utils::{now, Timestamp};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Data carried by a resume signal.
#[derive(Debug, Clone)]
pub struct ResumeData {
    /// The status reported for the suspended node.
    pub status: ExecutionStatus,
    /// Response payload from the external work.
    pub output: Option<serde_json::Value>,
    /// Failure details when the external work failed.
    pub failure_info: Option<FailureInfo>,
}

impl ResumeData {
    /// Creates resume data with the given status.
    #[must_use]
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            output: None,
            failure_info: None,
        }
    }

    /// Sets the output payload.
    #[must_use]
    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Sets the failure info.
    #[must_use]
    pub fn with_failure(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }
}

/// What woke a suspended wait.
#[derive(Debug, Clone)]
pub enum NotifyPayload {
    /// A real external signal arrived.
    Signal(ResumeData),
    /// The configured deadline elapsed before any signal.
    Timeout,
}

/// Identity of a registered wait.
#[derive(Debug, Clone)]
pub struct WaitInstance {
    /// Opaque correlation token.
    pub token: String,
    /// The plan execution the wait belongs to.
    pub plan_execution_id: Uuid,
    /// The suspended node execution.
    pub node_execution_id: Uuid,
    /// When the wait was registered.
    pub registered_at: Timestamp,
}

impl WaitInstance {
    /// Creates a wait instance.
    #[must_use]
    pub fn new(token: impl Into<String>, plan_execution_id: Uuid, node_execution_id: Uuid) -> Self {
        Self {
            token: token.into(),
            plan_execution_id,
            node_execution_id,
            registered_at: now(),
        }
    }
}

/// Continuation invoked when a wait is notified.
pub type WaitContinuation = Box<dyn FnOnce(NotifyPayload) + Send + Sync>;

struct Waiter {
    instance: WaitInstance,
    continuation: WaitContinuation,
}

/// Correlation-token registry for suspend/resume.
#[derive(Default)]
pub struct WaitNotifyEngine {
    waiters: DashMap<String, Waiter>,
}

impl WaitNotifyEngine {
    /// Creates an empty wait-notify engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wait for the given token.
    ///
    /// When `timeout` is set, a synthetic [`NotifyPayload::Timeout`] is
    /// raised after the deadline so the engine is never left permanently
    /// stalled. A real signal arriving first wins; the late timer fire is
    /// then a no-op.
    pub fn wait_for_event(
        self: &Arc<Self>,
        instance: WaitInstance,
        timeout: Option<Duration>,
        continuation: WaitContinuation,
    ) {
        let token = instance.token.clone();
        self.waiters.insert(
            token.clone(),
            Waiter {
                instance,
                continuation,
            },
        );
        if let Some(deadline) = timeout {
            self.notify_after(token, deadline, NotifyPayload::Timeout);
        }
    }

    /// Notifies the wait registered for `token`.
    ///
    /// Returns true if a continuation was fired. A token with no
    /// registered wait (already consumed, or never registered) is a
    /// logged no-op.
    pub fn notify(&self, token: &str, payload: NotifyPayload) -> bool {
        match self.waiters.remove(token) {
            Some((_, waiter)) => {
                debug!(
                    token,
                    node_execution_id = %waiter.instance.node_execution_id,
                    "Resuming suspended execution"
                );
                (waiter.continuation)(payload);
                true
            }
            None => {
                debug!(token, "Notify for unknown or already-consumed token; ignoring");
                false
            }
        }
    }

    /// Arms a timer that notifies `token` with `payload` after `delay`.
    pub fn notify_after(self: &Arc<Self>, token: String, delay: Duration, payload: NotifyPayload) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.notify(&token, payload);
        });
    }

    /// Returns true if a wait is registered for the token.
    #[must_use]
    pub fn is_waiting(&self, token: &str) -> bool {
        self.waiters.contains_key(token)
    }

    /// Returns the number of pending waits.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }
}

impl std::fmt::Debug for WaitNotifyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitNotifyEngine")
            .field("pending", &self.pending_count())
            .finish()
    }
}
