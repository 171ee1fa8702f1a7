//! SDK response event consumer.
//!
//! A polling worker reads opaque messages from an external queue,
//! deserializes them into typed events, and feeds them into the engine.
//! Messages are acknowledged only after successful handling; a failed
//! handler leaves the message unacknowledged for redelivery. Delivery is
//! therefore at-least-once, which the engine's idempotent status handling
//! makes safe.

use crate::core::{ExecutionStatus, FailureInfo};
use crate::engine::OrchestrationEngine;
use crate::errors::OrchestrationError;
use crate::waitnotify::ResumeData;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// An opaque message read from the queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Message id used for acknowledge/unacknowledge.
    pub id: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

/// Queue/event bus consumer contract.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Reads a batch of messages, waiting at most `max_wait`.
    async fn read(&self, max_wait: Duration) -> Result<Vec<QueueMessage>, OrchestrationError>;

    /// Acknowledges a message; it will not be redelivered.
    async fn acknowledge(&self, id: &str) -> Result<(), OrchestrationError>;

    /// Returns a message to the queue for redelivery.
    async fn unacknowledge(&self, id: &str) -> Result<(), OrchestrationError>;
}

/// A status update published by an out-of-process step handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkResponseEvent {
    /// The node execution the event concerns.
    pub node_execution_id: Uuid,
    /// Correlation token for suspended task waits, if any.
    pub correlation_token: Option<String>,
    /// Reported status.
    pub status: ExecutionStatus,
    /// Response payload.
    pub response_data: Option<serde_json::Value>,
    /// Failure details when the work failed.
    pub failure_info: Option<FailureInfo>,
}

/// Polling worker feeding SDK response events into the engine.
pub struct SdkResponseEventConsumer {
    queue: Arc<dyn QueueConsumer>,
    engine: Arc<OrchestrationEngine>,
    shutdown: Arc<AtomicBool>,
    poll_wait: Duration,
}

impl SdkResponseEventConsumer {
    /// Creates a consumer with a 1 second poll wait.
    #[must_use]
    pub fn new(queue: Arc<dyn QueueConsumer>, engine: Arc<OrchestrationEngine>) -> Self {
        Self {
            queue,
            engine,
            shutdown: Arc::new(AtomicBool::new(false)),
            poll_wait: Duration::from_secs(1),
        }
    }

    /// Sets the poll wait.
    #[must_use]
    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    /// Handle used to request a graceful stop.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Requests a graceful stop; the loop exits after the current batch.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Runs the polling loop until stopped.
    pub async fn run(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            let batch = match self.queue.read(self.poll_wait).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Queue read failed; backing off");
                    tokio::time::sleep(self.poll_wait).await;
                    continue;
                }
            };
            for message in batch {
                self.handle_message(message).await;
            }
        }
        debug!("SDK response consumer stopped");
    }

    /// Processes one batch immediately; useful for tests and embedding.
    pub async fn poll_once(&self) -> Result<usize, OrchestrationError> {
        let batch = self.queue.read(self.poll_wait).await?;
        let count = batch.len();
        for message in batch {
            self.handle_message(message).await;
        }
        Ok(count)
    }

    async fn handle_message(&self, message: QueueMessage) {
        let event: SdkResponseEvent = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                // Redelivery cannot repair a malformed payload.
                error!(message_id = %message.id, error = %e, "Dropping undeserializable message");
                if let Err(ack_err) = self.queue.acknowledge(&message.id).await {
                    warn!(message_id = %message.id, error = %ack_err, "Poison message acknowledge failed");
                }
                return;
            }
        };

        match self.dispatch(event).await {
            Ok(()) => {
                if let Err(e) = self.queue.acknowledge(&message.id).await {
                    warn!(message_id = %message.id, error = %e, "Acknowledge failed");
                }
            }
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Event handling failed; leaving unacknowledged");
                if let Err(unack_err) = self.queue.unacknowledge(&message.id).await {
                    warn!(message_id = %message.id, error = %unack_err, "Unacknowledge failed");
                }
            }
        }
    }

    async fn dispatch(&self, event: SdkResponseEvent) -> Result<(), OrchestrationError> {
        match event.correlation_token {
            Some(token) => {
                let mut data = ResumeData::new(event.status);
                data.output = event.response_data;
                data.failure_info = event.failure_info;
                self.engine.resume_node(event.node_execution_id, &token, data).await
            }
            None => {
                self.engine
                    .handle_node_status_update(
                        event.node_execution_id,
                        event.status,
                        event.response_data,
                        event.failure_info,
                    )
                    .await
            }
        }
    }
}

/// In-memory queue with redelivery semantics, for tests and embedding.
///
/// `read` moves messages in flight; `acknowledge` discards them and
/// `unacknowledge` returns them to the front of the queue.
#[derive(Debug)]
pub struct InMemoryQueue {
    ready: Mutex<VecDeque<QueueMessage>>,
    in_flight: Mutex<HashMap<String, QueueMessage>>,
    batch_size: usize,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    /// Creates a queue with a batch size of 10.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            batch_size: 10,
        }
    }

    /// Publishes a raw payload.
    pub fn publish(&self, payload: Vec<u8>) -> String {
        let id = crate::utils::generate_uuid().to_string();
        self.ready.lock().push_back(QueueMessage {
            id: id.clone(),
            payload,
        });
        id
    }

    /// Publishes an SDK response event.
    pub fn publish_event(&self, event: &SdkResponseEvent) -> Result<String, OrchestrationError> {
        let payload = serde_json::to_vec(event)?;
        Ok(self.publish(payload))
    }

    /// Number of messages waiting for delivery.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready.lock().len()
    }

    /// Number of messages delivered but not yet acknowledged.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[async_trait]
impl QueueConsumer for InMemoryQueue {
    async fn read(&self, _max_wait: Duration) -> Result<Vec<QueueMessage>, OrchestrationError> {
        let mut ready = self.ready.lock();
        let mut in_flight = self.in_flight.lock();
        let mut batch = Vec::new();
        while batch.len() < self.batch_size {
            let Some(message) = ready.pop_front() else { break };
            in_flight.insert(message.id.clone(), message.clone());
            batch.push(message);
        }
        Ok(batch)
    }

    async fn acknowledge(&self, id: &str) -> Result<(), OrchestrationError> {
        self.in_flight.lock().remove(id);
        Ok(())
    }

    async fn unacknowledge(&self, id: &str) -> Result<(), OrchestrationError> {
        let message = self.in_flight.lock().remove(id);
        if let Some(message) = message {
            self.ready.lock().push_front(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_moves_in_flight() {
        let queue = InMemoryQueue::new();
        queue.publish(b"one".to_vec());
        queue.publish(b"two".to_vec());

        let batch = queue.read(Duration::from_millis(1)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(queue.ready_len(), 0);
        assert_eq!(queue.in_flight_len(), 2);
    }

    #[tokio::test]
    async fn test_acknowledge_discards() {
        let queue = InMemoryQueue::new();
        let id = queue.publish(b"one".to_vec());
        let _ = queue.read(Duration::from_millis(1)).await.unwrap();

        queue.acknowledge(&id).await.unwrap();
        assert_eq!(queue.in_flight_len(), 0);
        assert_eq!(queue.ready_len(), 0);
    }

    #[tokio::test]
    async fn test_unacknowledge_redelivers() {
        let queue = InMemoryQueue::new();
        let id = queue.publish(b"one".to_vec());
        let _ = queue.read(Duration::from_millis(1)).await.unwrap();

        queue.unacknowledge(&id).await.unwrap();
        assert_eq!(queue.ready_len(), 1);

        let batch = queue.read(Duration::from_millis(1)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, id);
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = SdkResponseEvent {
            node_execution_id: crate::utils::generate_uuid(),
            correlation_token: Some("token-1".to_string()),
            status: ExecutionStatus::Succeeded,
            response_data: Some(serde_json::json!({"artifact": "a.tgz"})),
            failure_info: None,
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let back: SdkResponseEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.node_execution_id, event.node_execution_id);
        assert_eq!(back.correlation_token, event.correlation_token);
    }
}
