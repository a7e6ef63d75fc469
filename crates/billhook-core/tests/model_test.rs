//! Integration tests for the notification task lifecycle.

use billhook_core::{NotificationTask, TaskStatus};
use bytes::Bytes;
use chrono::{Duration, Utc};

fn new_task() -> NotificationTask {
    NotificationTask::new(Bytes::from_static(b"{\"eventType\":\"INVOICE_CREATION\"}"), Utc::now())
}

#[test]
fn full_retry_lifecycle_reaches_delivered() {
    let mut task = new_task();

    // First attempt fails and is rescheduled.
    task.begin_attempt();
    assert_eq!(task.status, TaskStatus::InFlight);
    task.reschedule(task.next_eligible_at + Duration::seconds(2));
    assert_eq!(task.status, TaskStatus::Pending);

    // Second attempt succeeds.
    task.begin_attempt();
    task.mark_delivered();

    assert_eq!(task.status, TaskStatus::Delivered);
    assert_eq!(task.attempt_count, 2);
    assert!(task.status.is_terminal());
}

#[test]
fn exhausted_task_reaches_abandoned() {
    let mut task = new_task();

    for _ in 0..2 {
        task.begin_attempt();
        task.reschedule(task.next_eligible_at + Duration::seconds(1));
    }
    task.begin_attempt();
    task.mark_abandoned();

    assert_eq!(task.status, TaskStatus::Abandoned);
    assert_eq!(task.attempt_count, 3);
    assert!(task.status.is_terminal());
}

#[test]
fn attempt_count_is_monotonic_across_lifecycle() {
    let mut task = new_task();
    let mut previous = task.attempt_count;

    for _ in 0..5 {
        task.begin_attempt();
        assert_eq!(task.attempt_count, previous + 1, "attempts increase by exactly one");
        previous = task.attempt_count;
        task.reschedule(task.next_eligible_at + Duration::seconds(1));
    }
}

#[test]
fn no_backward_transitions_exist_from_terminal_states() {
    let statuses =
        [TaskStatus::Pending, TaskStatus::InFlight, TaskStatus::Delivered, TaskStatus::Abandoned];

    for terminal in [TaskStatus::Delivered, TaskStatus::Abandoned] {
        for next in statuses {
            assert!(!terminal.can_transition_to(next));
        }
    }
}
