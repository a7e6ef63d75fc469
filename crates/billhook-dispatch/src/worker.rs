//! Delivery worker claiming tasks and driving the per-task state machine.
//!
//! Each worker loops: claim the earliest due task, run one HTTP attempt,
//! then apply the retry decision - delivered, rescheduled, or abandoned.
//! A claimed task is owned by exactly one worker, so a task can never have
//! two attempts in flight.

use std::sync::Arc;

use billhook_core::{
    Clock, DispatchEvent, DispatchObserver, NotificationTask, TaskAbandonedEvent,
    TaskDeliveredEvent, TaskRetryScheduledEvent,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    client::{AttemptRequest, NotificationClient},
    dispatcher::{DispatchStats, DispatcherConfig},
    error::{DispatchError, ErrorCategory, Result},
    queue::{Claim, TaskQueue},
    retry::{RetryContext, RetryDecision},
};

/// Individual worker processing notification deliveries.
pub(crate) struct DispatchWorker {
    id: usize,
    queue: Arc<TaskQueue>,
    config: DispatcherConfig,
    client: Arc<NotificationClient>,
    stats: Arc<RwLock<DispatchStats>>,
    cancellation_token: CancellationToken,
    observer: Arc<dyn DispatchObserver>,
    clock: Arc<dyn Clock>,
}

impl DispatchWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        queue: Arc<TaskQueue>,
        config: DispatcherConfig,
        client: Arc<NotificationClient>,
        stats: Arc<RwLock<DispatchStats>>,
        cancellation_token: CancellationToken,
        observer: Arc<dyn DispatchObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { id, queue, config, client, stats, cancellation_token, observer, clock }
    }

    /// Main worker loop - claims and processes tasks until cancelled.
    pub(crate) async fn run(&self) -> Result<()> {
        info!(worker_id = self.id, "dispatch worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                info!(worker_id = self.id, "dispatch worker received shutdown signal");
                break;
            }

            match self.queue.claim_due(self.clock.now()).await {
                Claim::Task(task) => self.process_task(task).await,
                Claim::Idle { until_next } => {
                    // Sleep until the head becomes due, capped by the poll
                    // interval; a queue change wakes us early.
                    let wait = until_next
                        .map_or(self.config.poll_interval, |d| d.min(self.config.poll_interval));

                    tokio::select! {
                        () = self.clock.sleep(wait) => {}
                        () = self.queue.changed() => {}
                        () = self.cancellation_token.cancelled() => break,
                    }
                },
            }
        }

        info!(worker_id = self.id, "dispatch worker stopped");
        Ok(())
    }

    /// Runs one delivery attempt for a claimed task and applies the outcome.
    async fn process_task(&self, mut task: NotificationTask) {
        task.begin_attempt();

        {
            let mut stats = self.stats.write().await;
            stats.in_flight_attempts += 1;
        }

        let request = AttemptRequest {
            task_id: task.id,
            payload: task.payload.clone(),
            attempt_number: task.attempt_count,
        };
        let outcome = self.client.attempt(&request).await;

        {
            let mut stats = self.stats.write().await;
            stats.in_flight_attempts -= 1;
            stats.attempts_made += 1;
        }

        if outcome.success {
            let status = outcome.http_status.unwrap_or(0);
            self.complete_delivered(task, status, outcome.duration).await;
        } else {
            let error = outcome.error.unwrap_or_else(|| {
                DispatchError::internal("attempt failed without a classified error")
            });
            self.handle_failed_attempt(task, error).await;
        }
    }

    async fn complete_delivered(
        &self,
        mut task: NotificationTask,
        http_status: u16,
        duration: std::time::Duration,
    ) {
        task.mark_delivered();

        {
            let mut stats = self.stats.write().await;
            stats.delivered += 1;
        }

        info!(
            worker_id = self.id,
            task_id = %task.id,
            status = http_status,
            attempt = task.attempt_count,
            duration_ms = duration.as_millis(),
            "notification delivered"
        );

        self.observer
            .on_event(DispatchEvent::Delivered(TaskDeliveredEvent {
                task_id: task.id,
                http_status,
                attempt_number: task.attempt_count,
                delivered_at: self.clock.now(),
            }))
            .await;
    }

    /// Applies the retry decision for a failed attempt.
    async fn handle_failed_attempt(&self, task: NotificationTask, error: DispatchError) {
        if !error.is_retryable() {
            let reason = format!("non-retryable error: {error}");
            self.abandon(task, reason, &error).await;
            return;
        }

        let context = RetryContext::new(
            task.attempt_count,
            error.clone(),
            self.clock.now(),
            self.config.retry_policy.clone(),
        );

        match context.decide() {
            RetryDecision::Retry { next_eligible_at } => {
                self.schedule_retry(task, next_eligible_at, &error).await;
            },
            RetryDecision::GiveUp { reason } => {
                self.abandon(task, reason, &error).await;
            },
        }
    }

    async fn schedule_retry(
        &self,
        mut task: NotificationTask,
        next_eligible_at: chrono::DateTime<chrono::Utc>,
        error: &DispatchError,
    ) {
        task.reschedule(next_eligible_at);

        {
            let mut stats = self.stats.write().await;
            stats.retries_scheduled += 1;
        }

        warn!(
            worker_id = self.id,
            task_id = %task.id,
            attempt = task.attempt_count,
            next_eligible_at = %next_eligible_at,
            error = %error,
            category = %ErrorCategory::from(error),
            "delivery failed, retry scheduled"
        );

        self.observer
            .on_event(DispatchEvent::RetryScheduled(TaskRetryScheduledEvent {
                task_id: task.id,
                attempt_number: task.attempt_count,
                next_eligible_at,
                error_message: error.to_string(),
            }))
            .await;

        self.queue.reschedule(task).await;
    }

    /// Terminal failure path: full diagnostic context for the operator.
    async fn abandon(&self, mut task: NotificationTask, reason: String, last_error: &DispatchError) {
        task.mark_abandoned();

        {
            let mut stats = self.stats.write().await;
            stats.abandoned += 1;
        }

        warn!(
            worker_id = self.id,
            task_id = %task.id,
            attempts = task.attempt_count,
            payload_hash = %hex_digest(&task.payload_hash),
            reason = %reason,
            last_error = %last_error,
            category = %ErrorCategory::from(last_error),
            "notification abandoned"
        );

        self.observer
            .on_event(DispatchEvent::Abandoned(TaskAbandonedEvent {
                task_id: task.id,
                attempt_number: task.attempt_count,
                reason,
                last_error: last_error.to_string(),
                payload_hash: task.payload_hash,
                abandoned_at: self.clock.now(),
            }))
            .await;
    }
}

/// Lowercase hex rendering of a payload hash for log output.
fn hex_digest(hash: &[u8; 32]) -> String {
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}
