//! Event filter deciding which bus events produce notifications.

use billhook_core::{BillingEvent, EventType};

/// Returns true iff the event should be dispatched.
///
/// Only invoice-creation events are forwarded; everything else on the bus is
/// dropped. Pure predicate: no I/O, no logging - the caller records the drop.
pub fn accepts(event: &BillingEvent) -> bool {
    event.event_type == EventType::InvoiceCreation
}

#[cfg(test)]
mod tests {
    use billhook_core::{AccountId, ObjectId, ObjectType, TenantId};

    use super::*;

    fn event_of_type(event_type: EventType) -> BillingEvent {
        BillingEvent {
            event_type,
            object_id: ObjectId::new("inv-1"),
            object_type: ObjectType::Invoice,
            account_id: AccountId::new(),
            tenant_id: TenantId::new(),
        }
    }

    #[test]
    fn accepts_invoice_creation_only() {
        assert!(accepts(&event_of_type(EventType::InvoiceCreation)));
    }

    #[test]
    fn rejects_every_other_event_type() {
        let others = [
            EventType::AccountCreation,
            EventType::AccountChange,
            EventType::SubscriptionCreation,
            EventType::SubscriptionCancel,
            EventType::InvoiceAdjustment,
            EventType::PaymentSuccess,
            EventType::PaymentFailed,
        ];

        for event_type in others {
            assert!(!accepts(&event_of_type(event_type)), "{event_type} must be filtered out");
        }
    }

    #[test]
    fn filtering_is_idempotent_for_duplicate_events() {
        // The bus is at-least-once; a duplicate must get the same answer.
        let event = event_of_type(EventType::InvoiceCreation);
        assert_eq!(accepts(&event), accepts(&event.clone()));
    }
}
