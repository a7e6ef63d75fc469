//! Dispatcher orchestration: intake, worker lifecycle, and statistics.
//!
//! `Dispatcher` is the single entry point for the host's event callback. The
//! intake path filters, serializes, and enqueues without ever blocking on
//! network I/O; delivery runs on the worker pool. Every failure is caught,
//! classified, and logged at this boundary so nothing can crash the caller.

use std::{sync::Arc, time::Duration};

use billhook_core::{BillingEvent, Clock, DispatchObserver, NoOpObserver, NotificationTask, RealClock, TaskId};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{ClientConfig, NotificationClient},
    error::{ErrorCategory, Result},
    filter,
    queue::TaskQueue,
    retry::RetryPolicy,
    serializer,
    worker_pool::WorkerPool,
};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Destination webhook URL (required).
    pub endpoint_url: String,

    /// Number of concurrent delivery workers.
    pub concurrency_limit: usize,

    /// Bound on queued tasks before submissions are rejected.
    pub queue_capacity: usize,

    /// Upper bound on how long an idle worker sleeps between queue polls.
    pub poll_interval: Duration,

    /// HTTP client configuration.
    pub client_config: ClientConfig,

    /// Retry policy applied to failed deliveries.
    pub retry_policy: RetryPolicy,

    /// Grace period for in-flight deliveries on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            concurrency_limit: crate::DEFAULT_CONCURRENCY_LIMIT,
            queue_capacity: crate::DEFAULT_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(500),
            client_config: ClientConfig::default(),
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(20),
        }
    }
}

/// Counters for dispatcher monitoring.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    /// Number of running delivery workers.
    pub active_workers: usize,
    /// Bus events seen by the intake path.
    pub events_received: u64,
    /// Events dropped by the filter.
    pub events_ignored: u64,
    /// Tasks admitted to the queue.
    pub tasks_enqueued: u64,
    /// Delivery attempts started.
    pub attempts_made: u64,
    /// Tasks acknowledged by the endpoint.
    pub delivered: u64,
    /// Failed attempts that were rescheduled.
    pub retries_scheduled: u64,
    /// Tasks given up on.
    pub abandoned: u64,
    /// Attempts currently running.
    pub in_flight_attempts: u64,
}

/// What the intake path did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    /// The event was filtered out; no task exists.
    Ignored,
    /// Exactly one notification task was enqueued.
    Enqueued(TaskId),
}

/// Event-triggered outbound notification dispatcher.
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Arc<TaskQueue>,
    client: Arc<NotificationClient>,
    stats: Arc<RwLock<DispatchStats>>,
    cancellation_token: CancellationToken,
    observer: Arc<dyn DispatchObserver>,
    clock: Arc<dyn Clock>,
    worker_pool: Option<WorkerPool>,
}

impl Dispatcher {
    /// Creates a dispatcher with the system clock and no observer.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ConfigurationError` if the endpoint URL is
    /// invalid or the HTTP client cannot be built.
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(RealClock::new()), Arc::new(NoOpObserver::new()))
    }

    /// Creates a dispatcher with an injected clock and lifecycle observer.
    ///
    /// Used by tests to control time and to assert on delivery outcomes
    /// without scraping logs.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ConfigurationError` if the endpoint URL is
    /// invalid or the HTTP client cannot be built.
    pub fn with_observer(
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn DispatchObserver>,
    ) -> Result<Self> {
        let client =
            Arc::new(NotificationClient::new(config.client_config.clone(), &config.endpoint_url)?);
        let queue = Arc::new(TaskQueue::new(config.queue_capacity));

        Ok(Self {
            config,
            queue,
            client,
            stats: Arc::new(RwLock::new(DispatchStats::default())),
            cancellation_token: CancellationToken::new(),
            observer,
            clock,
            worker_pool: None,
        })
    }

    /// Handles one event from the bus.
    ///
    /// Logs the event, filters it, serializes accepted events, and enqueues
    /// exactly one task per accepted event. Returns immediately - the only
    /// suspension point is the queue lock, never network I/O.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed events (dropped, never retried)
    /// and `Backpressure` when the queue is full. Both are already logged
    /// here; callers on the intake path may simply discard the error.
    pub async fn handle_event(&self, event: &BillingEvent) -> Result<Intake> {
        info!(
            event_type = %event.event_type,
            object_id = %event.object_id,
            object_type = %event.object_type,
            "received billing event"
        );

        {
            let mut stats = self.stats.write().await;
            stats.events_received += 1;
        }

        if !filter::accepts(event) {
            let mut stats = self.stats.write().await;
            stats.events_ignored += 1;
            return Ok(Intake::Ignored);
        }

        let payload = serializer::serialize(event).map_err(|e| {
            error!(
                object_id = %event.object_id,
                error = %e,
                "failed to serialize event payload, dropping event"
            );
            e
        })?;

        let task = NotificationTask::new(payload, self.clock.now());
        let task_id = task.id;

        self.queue.submit(task).await.map_err(|e| {
            warn!(
                task_id = %task_id,
                error = %e,
                category = %ErrorCategory::from(&e),
                "task queue rejected submission"
            );
            e
        })?;

        {
            let mut stats = self.stats.write().await;
            stats.tasks_enqueued += 1;
        }

        debug!(task_id = %task_id, "notification task enqueued");
        Ok(Intake::Enqueued(task_id))
    }

    /// Starts the delivery worker pool.
    ///
    /// Returns after spawning; use `shutdown` to stop gracefully.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            worker_count = self.config.concurrency_limit,
            queue_capacity = self.config.queue_capacity,
            endpoint = %self.config.endpoint_url,
            "starting notification dispatcher"
        );

        let mut worker_pool = WorkerPool::new(
            self.queue.clone(),
            self.config.clone(),
            self.client.clone(),
            self.stats.clone(),
            self.cancellation_token.clone(),
            self.observer.clone(),
            self.clock.clone(),
        );

        worker_pool.spawn_workers().await;
        self.worker_pool = Some(worker_pool);

        info!("dispatcher started");
        Ok(())
    }

    /// Gracefully shuts down the dispatcher.
    ///
    /// In-flight attempts may finish within the configured grace period;
    /// pending tasks are dropped - the channel is best-effort and nothing
    /// survives a restart.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if workers exceed the grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down dispatcher");

        let pending = self.queue.len().await;
        if pending > 0 {
            warn!(pending_tasks = pending, "dropping pending tasks on shutdown");
        }

        if let Some(worker_pool) = self.worker_pool.take() {
            worker_pool.shutdown_graceful(self.config.shutdown_timeout).await?;
        } else {
            info!("dispatcher was not started, shutdown completed immediately");
        }
        Ok(())
    }

    /// Returns a snapshot of the dispatcher counters.
    pub async fn stats(&self) -> DispatchStats {
        self.stats.read().await.clone()
    }

    /// Number of tasks currently queued.
    pub async fn queue_depth(&self) -> usize {
        self.queue.len().await
    }
}
