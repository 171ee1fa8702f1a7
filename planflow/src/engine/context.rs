//! Engine wiring: explicit, process-scoped context instead of singletons.

use crate::advise::AdviserRegistry;
use crate::events::{EventSink, NoOpEventSink};
use crate::facilitate::FacilitatorRegistry;
use crate::interrupt::InterruptManager;
use crate::store::{ExecutionStore, StoreRetryPolicy};
use crate::waitnotify::WaitNotifyEngine;
use std::sync::Arc;
use std::time::Duration;

/// Engine tuning knobs.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Retry policy for transient persistence failures.
    pub store_retry: StoreRetryPolicy,
    /// Deadline for remote task completions; `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the persistence retry policy.
    #[must_use]
    pub fn with_store_retry(mut self, policy: StoreRetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Sets the remote task deadline.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }
}

/// Everything the engine needs, wired explicitly.
///
/// Passing the context into the engine constructor keeps registries
/// process-scoped and lets tests run multiple isolated instances.
pub struct EngineContext {
    /// The execution store, single source of truth.
    pub store: Arc<dyn ExecutionStore>,
    /// Facilitator registry.
    pub facilitators: FacilitatorRegistry,
    /// Adviser registry.
    pub advisers: AdviserRegistry,
    /// Wait-notify engine for suspensions.
    pub wait_notify: Arc<WaitNotifyEngine>,
    /// Interrupt manager.
    pub interrupts: Arc<InterruptManager>,
    /// Observer sink, fire-and-forget.
    pub event_sink: Arc<dyn EventSink>,
    /// Tuning knobs.
    pub config: EngineConfig,
}

impl EngineContext {
    /// Starts building a context around a store.
    #[must_use]
    pub fn builder(store: Arc<dyn ExecutionStore>) -> EngineContextBuilder {
        let interrupts = Arc::new(InterruptManager::new(Arc::clone(&store)));
        EngineContextBuilder {
            store,
            interrupts,
            facilitators: FacilitatorRegistry::new(),
            advisers: None,
            wait_notify: Arc::new(WaitNotifyEngine::new()),
            event_sink: Arc::new(NoOpEventSink),
            config: EngineConfig::default(),
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("facilitators", &self.facilitators)
            .field("advisers", &self.advisers)
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`EngineContext`].
pub struct EngineContextBuilder {
    store: Arc<dyn ExecutionStore>,
    interrupts: Arc<InterruptManager>,
    facilitators: FacilitatorRegistry,
    advisers: Option<AdviserRegistry>,
    wait_notify: Arc<WaitNotifyEngine>,
    event_sink: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl EngineContextBuilder {
    /// The interrupt manager the context will use; handy for building
    /// adviser registries that register interrupts.
    #[must_use]
    pub fn interrupts(&self) -> Arc<InterruptManager> {
        Arc::clone(&self.interrupts)
    }

    /// Sets the facilitator registry.
    #[must_use]
    pub fn with_facilitators(mut self, facilitators: FacilitatorRegistry) -> Self {
        self.facilitators = facilitators;
        self
    }

    /// Sets the adviser registry. When omitted, the built-in advisers are
    /// registered.
    #[must_use]
    pub fn with_advisers(mut self, advisers: AdviserRegistry) -> Self {
        self.advisers = Some(advisers);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Sets the engine config.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> EngineContext {
        let advisers = self
            .advisers
            .unwrap_or_else(|| AdviserRegistry::with_defaults(Arc::clone(&self.interrupts)));
        EngineContext {
            store: self.store,
            facilitators: self.facilitators,
            advisers,
            wait_notify: self.wait_notify,
            interrupts: self.interrupts,
            event_sink: self.event_sink,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advise::AdviserType;
    use crate::store::InMemoryExecutionStore;

    #[test]
    fn test_builder_defaults() {
        let ctx = EngineContext::builder(Arc::new(InMemoryExecutionStore::new())).build();
        assert!(ctx.facilitators.is_empty());
        assert!(ctx.advisers.resolve(AdviserType::Retry).is_some());
    }

    #[test]
    fn test_isolated_contexts() {
        let a = EngineContext::builder(Arc::new(InMemoryExecutionStore::new())).build();
        let b = EngineContext::builder(Arc::new(InMemoryExecutionStore::new())).build();
        assert!(!Arc::ptr_eq(&a.wait_notify, &b.wait_notify));
    }
}
