//! Billhook invoice notification service.
//!
//! Wires the dispatcher to its collaborators: configuration, structured
//! logging, an event source, and OS signals for graceful shutdown. The host
//! platform's event bus is an external system; this binary reads one JSON
//! event per line on stdin as the bus callback.

use anyhow::{Context, Result};
use billhook_core::BillingEvent;
use billhook_dispatch::Dispatcher;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting billhook notification service");

    let config = Config::load()?;
    info!(
        endpoint = %config.endpoint_url,
        workers = config.concurrency_limit,
        max_attempts = config.max_attempts,
        queue_capacity = config.queue_capacity,
        "configuration loaded"
    );

    let mut dispatcher = Dispatcher::new(config.to_dispatcher_config())
        .context("failed to initialize dispatcher")?;
    dispatcher.start().await.context("failed to start dispatcher")?;

    info!("billhook is ready to receive billing events");

    run_event_intake(&dispatcher).await;

    info!("starting graceful shutdown");
    dispatcher.shutdown().await.context("dispatcher shutdown failed")?;

    info!("billhook shutdown complete");
    Ok(())
}

/// Feeds bus events from stdin into the dispatcher until EOF or a signal.
async fn run_event_intake(dispatcher: &Dispatcher) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<BillingEvent>(&line) {
                        // Intake failures are classified and logged inside
                        // the dispatcher; nothing here may crash the loop.
                        Ok(event) => {
                            let _ = dispatcher.handle_event(&event).await;
                        },
                        Err(e) => {
                            warn!(error = %e, "discarding malformed event line");
                        },
                    }
                },
                Ok(None) => {
                    info!("event stream closed");
                    break;
                },
                Err(e) => {
                    error!(error = %e, "failed to read event stream");
                    break;
                },
            },
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            },
        }
    }
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,billhook=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for CTRL-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received CTRL-C signal");
        },
        () = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
