//! Worker pool supervision with graceful shutdown.
//!
//! Spawns the configured number of delivery workers, tracks their join
//! handles, and shuts them down cooperatively: cancellation is signalled,
//! in-flight attempts run to completion, and the whole pool is bounded by a
//! grace period.

use std::{sync::Arc, time::Duration};

use billhook_core::{Clock, DispatchObserver};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::NotificationClient,
    dispatcher::{DispatchStats, DispatcherConfig},
    error::{DispatchError, Result},
    queue::TaskQueue,
    worker::DispatchWorker,
};

/// Supervised pool of delivery worker tasks.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    config: DispatcherConfig,
    client: Arc<NotificationClient>,
    stats: Arc<RwLock<DispatchStats>>,
    cancellation_token: CancellationToken,
    observer: Arc<dyn DispatchObserver>,
    clock: Arc<dyn Clock>,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    /// Creates a worker pool; no workers run until `spawn_workers`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queue: Arc<TaskQueue>,
        config: DispatcherConfig,
        client: Arc<NotificationClient>,
        stats: Arc<RwLock<DispatchStats>>,
        cancellation_token: CancellationToken,
        observer: Arc<dyn DispatchObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            config,
            client,
            stats,
            cancellation_token,
            observer,
            clock,
            worker_handles: Vec::new(),
        }
    }

    /// Spawns all configured workers and returns immediately.
    ///
    /// Workers run until cancellation is requested through the pool's token.
    pub async fn spawn_workers(&mut self) {
        info!(worker_count = self.config.concurrency_limit, "spawning dispatch workers");

        {
            let mut stats = self.stats.write().await;
            stats.active_workers = self.config.concurrency_limit;
        }

        for worker_id in 0..self.config.concurrency_limit {
            let worker = DispatchWorker::new(
                worker_id,
                self.queue.clone(),
                self.config.clone(),
                self.client.clone(),
                self.stats.clone(),
                self.cancellation_token.clone(),
                self.observer.clone(),
                self.clock.clone(),
            );

            let handle = tokio::spawn(async move {
                let result = worker.run().await;

                if let Err(ref error) = result {
                    error!(worker_id, error = %error, "dispatch worker terminated with error");
                }

                result
            });

            self.worker_handles.push(handle);
        }

        info!(spawned_workers = self.worker_handles.len(), "all dispatch workers spawned");
    }

    /// Gracefully shuts down all workers within the given timeout.
    ///
    /// Signals cancellation, then waits for each worker to finish its
    /// current attempt and exit.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::ShutdownTimeout` if workers do not finish in
    /// time, or the first `WorkerPanic` observed while joining.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let shutdown_future = async {
            let mut first_panic = None;

            for (worker_id, handle) in
                std::mem::take(&mut self.worker_handles).into_iter().enumerate()
            {
                match handle.await {
                    Ok(worker_result) => {
                        if let Err(error) = worker_result {
                            warn!(
                                worker_id,
                                error = %error,
                                "worker completed with error during shutdown"
                            );
                        }
                    },
                    Err(join_error) => {
                        error!(worker_id, error = %join_error, "worker task panicked");
                        first_panic.get_or_insert(DispatchError::WorkerPanic {
                            worker_id,
                            error: join_error.to_string(),
                        });
                    },
                }
            }

            {
                let mut stats = self.stats.write().await;
                stats.active_workers = 0;
            }

            first_panic
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(None) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic_error)) => Err(panic_error),
            Err(_elapsed) => {
                error!(
                    timeout_seconds = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(DispatchError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Returns true while any worker task is still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|handle| !handle.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_workers = active,
                "WorkerPool dropped without shutdown_graceful; cancelling workers"
            );
            self.cancellation_token.cancel();
        }
    }
}
