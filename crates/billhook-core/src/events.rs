//! Dispatch lifecycle notifications for downstream observers.
//!
//! The delivery workers emit an event whenever a task reaches a milestone
//! (delivered, retry scheduled, abandoned). Observers subscribe through the
//! [`DispatchObserver`] trait without the workers knowing who is listening,
//! which keeps operator-visibility concerns out of the delivery path and
//! makes outcome assertions trivial in tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::TaskId;

/// Milestones emitted by the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// A notification was acknowledged by the endpoint.
    Delivered(TaskDeliveredEvent),

    /// A failed attempt was rescheduled for a later retry.
    RetryScheduled(TaskRetryScheduledEvent),

    /// A task was given up on (terminal).
    Abandoned(TaskAbandonedEvent),
}

/// Emitted when a delivery attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDeliveredEvent {
    /// Task that was delivered.
    pub task_id: TaskId,

    /// HTTP status returned by the endpoint.
    pub http_status: u16,

    /// Attempt that succeeded (1-based).
    pub attempt_number: u32,

    /// When the delivery completed.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when a failed attempt is scheduled for retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRetryScheduledEvent {
    /// Task being retried.
    pub task_id: TaskId,

    /// Attempt that failed (1-based).
    pub attempt_number: u32,

    /// Earliest time of the next attempt.
    pub next_eligible_at: DateTime<Utc>,

    /// Error that caused the failure.
    pub error_message: String,
}

/// Emitted when a task reaches the abandoned state.
///
/// Carries the full diagnostic context required for operator follow-up:
/// payload hash, attempt count, and the last error observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAbandonedEvent {
    /// Task that was abandoned.
    pub task_id: TaskId,

    /// Total attempts made before giving up.
    pub attempt_number: u32,

    /// Why the dispatcher gave up (budget exhausted or permanent error).
    pub reason: String,

    /// Last delivery error observed.
    pub last_error: String,

    /// SHA-256 of the undelivered payload.
    pub payload_hash: [u8; 32],

    /// When the task was abandoned.
    pub abandoned_at: DateTime<Utc>,
}

/// Subscriber side of the dispatch lifecycle.
///
/// Implementations must not block the delivery path; failures inside an
/// observer are the observer's problem and must not propagate back.
#[async_trait::async_trait]
pub trait DispatchObserver: Send + Sync + std::fmt::Debug {
    /// Handles one lifecycle event.
    async fn on_event(&self, event: DispatchEvent);
}

/// Observer that discards all events.
#[derive(Debug, Default)]
pub struct NoOpObserver;

impl NoOpObserver {
    /// Creates a new no-op observer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DispatchObserver for NoOpObserver {
    async fn on_event(&self, _event: DispatchEvent) {}
}

/// Forwards each event to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastObserver {
    observers: Vec<Arc<dyn DispatchObserver>>,
}

impl MulticastObserver {
    /// Creates a multicast observer with no subscribers.
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    /// Adds a subscriber.
    pub fn add_subscriber(&mut self, observer: Arc<dyn DispatchObserver>) {
        self.observers.push(observer);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

#[async_trait::async_trait]
impl DispatchObserver for MulticastObserver {
    async fn on_event(&self, event: DispatchEvent) {
        let futures = self.observers.iter().map(|observer| {
            let event = event.clone();
            async move {
                observer.on_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
