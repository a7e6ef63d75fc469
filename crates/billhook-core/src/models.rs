//! Billing event records and notification task state.
//!
//! Defines the immutable event record consumed from the billing bus, newtype
//! ID wrappers for compile-time type safety, and the mutable notification
//! task with its delivery state machine.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Type of state change announced by the billing bus.
///
/// Mirrors the bus wire format (`SCREAMING_SNAKE_CASE` on the wire). Only
/// `InvoiceCreation` is dispatched; every other variant is observed and
/// dropped by the event filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A new account was provisioned.
    AccountCreation,
    /// An existing account was modified.
    AccountChange,
    /// A subscription was created.
    SubscriptionCreation,
    /// A subscription was cancelled.
    SubscriptionCancel,
    /// An invoice was generated.
    InvoiceCreation,
    /// An existing invoice was adjusted.
    InvoiceAdjustment,
    /// A payment completed successfully.
    PaymentSuccess,
    /// A payment attempt failed.
    PaymentFailed,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AccountCreation => "ACCOUNT_CREATION",
            Self::AccountChange => "ACCOUNT_CHANGE",
            Self::SubscriptionCreation => "SUBSCRIPTION_CREATION",
            Self::SubscriptionCancel => "SUBSCRIPTION_CANCEL",
            Self::InvoiceCreation => "INVOICE_CREATION",
            Self::InvoiceAdjustment => "INVOICE_ADJUSTMENT",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::PaymentFailed => "PAYMENT_FAILED",
        };
        write!(f, "{name}")
    }
}

/// Kind of domain object an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    /// Customer account.
    Account,
    /// Generated invoice.
    Invoice,
    /// Line item on an invoice.
    InvoiceItem,
    /// Payment against an invoice.
    Payment,
    /// Subscription to a plan.
    Subscription,
    /// Tenant owning the account.
    Tenant,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "ACCOUNT",
            Self::Invoice => "INVOICE",
            Self::InvoiceItem => "INVOICE_ITEM",
            Self::Payment => "PAYMENT",
            Self::Subscription => "SUBSCRIPTION",
            Self::Tenant => "TENANT",
        };
        write!(f, "{name}")
    }
}

/// Opaque identifier of the object an event refers to.
///
/// The bus does not guarantee a format, so this stays an opaque string and
/// is only validated when a payload is built from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps a raw identifier from the bus.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ObjectId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

/// Strongly-typed account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Creates a new random account ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AccountId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed tenant identifier.
///
/// All billing objects are scoped to a tenant; the dispatcher carries the ID
/// through into the payload but attaches no semantics to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// Creates a new random tenant ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed notification task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Immutable billing event as received from the external bus.
///
/// The bus guarantees at-least-once delivery, so the same event may be seen
/// more than once; the dispatcher treats duplicates as independent events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingEvent {
    /// Kind of state change.
    pub event_type: EventType,

    /// Identifier of the object the event refers to.
    pub object_id: ObjectId,

    /// Kind of object the event refers to.
    pub object_type: ObjectType,

    /// Account the object belongs to.
    pub account_id: AccountId,

    /// Tenant the account belongs to.
    pub tenant_id: TenantId,
}

/// Delivery state of a notification task.
///
/// Legal transitions: `Pending → InFlight → {Delivered, Pending, Abandoned}`.
/// `Delivered` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue for its eligibility time.
    Pending,
    /// A delivery attempt is currently running.
    InFlight,
    /// The endpoint acknowledged the notification (terminal).
    Delivered,
    /// The retry budget was exhausted or the failure was permanent (terminal).
    Abandoned,
}

impl TaskStatus {
    /// Returns true if no further transitions are allowed from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Abandoned)
    }

    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Delivered)
                | (Self::InFlight, Self::Pending)
                | (Self::InFlight, Self::Abandoned)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Delivered => write!(f, "delivered"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A single outbound notification owed to the configured endpoint.
///
/// Created when an accepted event is serialized and destroyed on reaching a
/// terminal state. Owned by exactly one queue slot or worker at a time, which
/// is what rules out duplicate concurrent attempts for the same task.
#[derive(Debug, Clone)]
pub struct NotificationTask {
    /// Unique task identifier, used for log correlation.
    pub id: TaskId,

    /// Serialized event payload to POST.
    pub payload: Bytes,

    /// SHA-256 of the payload, reported on abandonment.
    pub payload_hash: [u8; 32],

    /// Number of delivery attempts started so far.
    pub attempt_count: u32,

    /// Earliest time the next attempt may run.
    pub next_eligible_at: DateTime<Utc>,

    /// Current delivery state.
    pub status: TaskStatus,
}

impl NotificationTask {
    /// Creates a pending task eligible immediately.
    pub fn new(payload: Bytes, now: DateTime<Utc>) -> Self {
        let payload_hash = Sha256::digest(&payload).into();
        Self {
            id: TaskId::new(),
            payload,
            payload_hash,
            attempt_count: 0,
            next_eligible_at: now,
            status: TaskStatus::Pending,
        }
    }

    /// Moves the task to `InFlight` and counts the attempt.
    ///
    /// The attempt counter increases by exactly one per call and never
    /// decreases.
    pub fn begin_attempt(&mut self) {
        debug_assert!(self.status.can_transition_to(TaskStatus::InFlight));
        self.status = TaskStatus::InFlight;
        self.attempt_count += 1;
    }

    /// Marks the task delivered (terminal).
    pub fn mark_delivered(&mut self) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Delivered));
        self.status = TaskStatus::Delivered;
    }

    /// Marks the task abandoned (terminal).
    pub fn mark_abandoned(&mut self) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Abandoned));
        self.status = TaskStatus::Abandoned;
    }

    /// Returns the task to `Pending` with a new eligibility time.
    pub fn reschedule(&mut self, next_eligible_at: DateTime<Utc>) {
        debug_assert!(self.status.can_transition_to(TaskStatus::Pending));
        self.status = TaskStatus::Pending;
        self.next_eligible_at = next_eligible_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_task() -> NotificationTask {
        NotificationTask::new(Bytes::from_static(b"{\"test\":true}"), Utc::now())
    }

    #[test]
    fn new_task_starts_pending_with_zero_attempts() {
        let task = test_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 0);
        assert!(!task.status.is_terminal());
    }

    #[test]
    fn attempt_counter_increases_by_one_per_attempt() {
        let mut task = test_task();

        task.begin_attempt();
        assert_eq!(task.attempt_count, 1);

        task.reschedule(task.next_eligible_at + chrono::Duration::seconds(1));
        task.begin_attempt();
        assert_eq!(task.attempt_count, 2);
    }

    #[test]
    fn terminal_states_allow_no_transitions() {
        for terminal in [TaskStatus::Delivered, TaskStatus::Abandoned] {
            assert!(terminal.is_terminal());
            for next in
                [TaskStatus::Pending, TaskStatus::InFlight, TaskStatus::Delivered, TaskStatus::Abandoned]
            {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next} must be illegal");
            }
        }
    }

    #[test]
    fn pending_only_transitions_to_in_flight() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InFlight));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Delivered));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Abandoned));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn payload_hash_is_stable_for_equal_payloads() {
        let now = Utc::now();
        let a = NotificationTask::new(Bytes::from_static(b"payload"), now);
        let b = NotificationTask::new(Bytes::from_static(b"payload"), now);
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn reschedule_updates_eligibility() {
        let mut task = test_task();
        task.begin_attempt();

        let later = task.next_eligible_at + chrono::Duration::seconds(30);
        task.reschedule(later);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.next_eligible_at, later);
    }

    #[test]
    fn billing_event_round_trips_bus_wire_format() {
        let json = r#"{
            "eventType": "INVOICE_CREATION",
            "objectId": "inv-2041",
            "objectType": "INVOICE",
            "accountId": "7f5c8e9e-1d4b-4a6e-9a55-0a7c1f2d3e4b",
            "tenantId": "d2b1a0c9-8e7f-4d6c-b5a4-3f2e1d0c9b8a"
        }"#;

        let event: BillingEvent = serde_json::from_str(json).expect("valid bus event");
        assert_eq!(event.event_type, EventType::InvoiceCreation);
        assert_eq!(event.object_type, ObjectType::Invoice);
        assert_eq!(event.object_id.as_str(), "inv-2041");
    }

    #[test]
    fn event_type_display_matches_wire_names() {
        assert_eq!(EventType::InvoiceCreation.to_string(), "INVOICE_CREATION");
        assert_eq!(EventType::PaymentFailed.to_string(), "PAYMENT_FAILED");
        assert_eq!(ObjectType::Invoice.to_string(), "INVOICE");
    }
}
