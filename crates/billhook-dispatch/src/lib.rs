//! Event-triggered outbound notification dispatcher.
//!
//! Receives billing events, keeps only invoice-creation, serializes each
//! accepted event to a JSON payload, and delivers it asynchronously to the
//! configured webhook endpoint with exponential backoff and a bounded retry
//! budget. Delivery is best-effort: nothing is persisted, and tasks that
//! exhaust their budget are abandoned with full diagnostic context.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │ Bus event │──▶│ Filter │──▶│ Serializer │──▶│ TaskQueue │──▶│ Workers  │
//! └───────────┘   └────────┘   └────────────┘   └───────────┘   └──────────┘
//!                                                     ▲               │
//!                                                     │   reschedule  ▼
//!                                                ┌─────────┐   ┌──────────────┐
//!                                                │ Retry   │◀──│ Notification │
//!                                                │ policy  │   │ client       │
//!                                                └─────────┘   └──────────────┘
//! ```
//!
//! The intake path (`Dispatcher::handle_event`) never blocks on network I/O:
//! it filters, serializes, and enqueues. Workers own the HTTP attempts and
//! the per-task state machine `Pending → InFlight → {Delivered, Pending,
//! Abandoned}`.
//!
//! # Example
//!
//! ```no_run
//! use billhook_dispatch::{Dispatcher, DispatcherConfig};
//!
//! # async fn example(event: billhook_core::BillingEvent) -> billhook_dispatch::Result<()> {
//! let config = DispatcherConfig {
//!     endpoint_url: "https://example.com/webhook".to_string(),
//!     ..Default::default()
//! };
//! let mut dispatcher = Dispatcher::new(config)?;
//! dispatcher.start().await?;
//!
//! dispatcher.handle_event(&event).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod queue;
pub mod retry;
pub mod serializer;
mod worker;
pub mod worker_pool;

pub use client::{AttemptRequest, ClientConfig, DeliveryOutcome, NotificationClient};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatchStats, Intake};
pub use error::{DispatchError, Result};
pub use retry::{RetryDecision, RetryPolicy};

/// Default number of concurrent delivery workers.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

/// Default bound on queued notification tasks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
