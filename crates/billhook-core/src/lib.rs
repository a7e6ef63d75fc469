//! Core domain models for the billhook notification dispatcher.
//!
//! Provides strongly-typed billing event records, notification task state,
//! the dispatch lifecycle observer types, and the clock abstraction used for
//! deterministic testing. The dispatch crate depends on these foundational
//! types for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod models;
pub mod time;

pub use events::{
    DispatchEvent, DispatchObserver, MulticastObserver, NoOpObserver, TaskAbandonedEvent,
    TaskDeliveredEvent, TaskRetryScheduledEvent,
};
pub use models::{
    AccountId, BillingEvent, EventType, NotificationTask, ObjectId, ObjectType, TaskId, TaskStatus,
    TenantId,
};
pub use time::{Clock, RealClock, TestClock};
