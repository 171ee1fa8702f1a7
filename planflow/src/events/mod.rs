//! Event sink trait and implementations.
//!
//! Sinks receive orchestration events fire-and-forget: a failing or slow
//! observer must never block the state machine.

use crate::core::OrchestrationEvent;
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Trait for event sinks that receive orchestration events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: OrchestrationEvent);

    /// Emits an event without blocking.
    ///
    /// This method never fails; errors are logged and suppressed.
    fn try_emit(&self, event: OrchestrationEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: OrchestrationEvent) {}

    fn try_emit(&self, _event: OrchestrationEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log_event(&self, event: &OrchestrationEvent) {
        match self.level {
            Level::DEBUG => {
                debug!(event_type = %event.event_type, event_data = ?event.data, "Event: {}", event.event_type);
            }
            _ => {
                info!(event_type = %event.event_type, event_data = ?event.data, "Event: {}", event.event_type);
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: OrchestrationEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: OrchestrationEvent) {
        self.log_event(&event);
    }
}

/// A collecting event sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<OrchestrationEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events with the given type.
    #[must_use]
    pub fn events_of_type(&self, event_type: &str) -> Vec<OrchestrationEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: OrchestrationEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: OrchestrationEvent) {
        self.events.write().push(event);
    }
}
