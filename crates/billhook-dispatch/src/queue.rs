//! Bounded in-memory delay queue for notification tasks.
//!
//! Tasks are ordered by eligibility time, ties broken by admission order, so
//! workers always claim the earliest-eligible task first. Claiming removes
//! the task from the queue, which gives each task a single owner and rules
//! out duplicate concurrent attempts.
//!
//! The queue is the one piece of shared mutable state in the dispatcher; all
//! enqueue/claim/reschedule operations are atomic relative to each other
//! behind an async mutex. New submissions are bounded (backpressure), while
//! retry re-admissions always succeed so a scheduled retry is never lost.

use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

use billhook_core::NotificationTask;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::error::{DispatchError, Result};

/// Outcome of a claim poll.
#[derive(Debug)]
pub enum Claim {
    /// A task whose eligibility time has passed; the caller now owns it.
    Task(NotificationTask),

    /// Nothing is due.
    Idle {
        /// Time until the head of the queue becomes eligible, if any task
        /// is queued at all.
        until_next: Option<Duration>,
    },
}

/// Heap entry; ordering is inverted so `BinaryHeap` pops the earliest
/// eligible task, FIFO within the same eligibility instant.
struct Entry {
    eligible_at: DateTime<Utc>,
    seq: u64,
    task: NotificationTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.eligible_at == other.eligible_at && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.eligible_at, other.seq).cmp(&(self.eligible_at, self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

/// Eligibility-ordered task queue shared by intake and workers.
pub struct TaskQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl TaskQueue {
    /// Creates a queue bounded at `capacity` new admissions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner { heap: BinaryHeap::new(), next_seq: 0 }),
            notify: Notify::new(),
        }
    }

    /// Admits a new task.
    ///
    /// Non-blocking apart from the queue lock; returns immediately so the
    /// event-intake path never waits on delivery.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Backpressure` when the queue already holds
    /// `capacity` tasks.
    pub async fn submit(&self, task: NotificationTask) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.heap.len() >= self.capacity {
            return Err(DispatchError::backpressure(self.capacity));
        }
        Self::push(&mut inner, task);
        drop(inner);

        self.notify.notify_one();
        Ok(())
    }

    /// Re-admits a task whose retry has been scheduled.
    ///
    /// Exempt from the capacity bound: the retry budget, not backpressure,
    /// decides when a task dies.
    pub async fn reschedule(&self, task: NotificationTask) {
        let mut inner = self.inner.lock().await;
        Self::push(&mut inner, task);
        drop(inner);

        self.notify.notify_one();
    }

    /// Claims the earliest task whose eligibility time has passed.
    ///
    /// When the head of the queue is still in the future the queue reports
    /// how long until it becomes due, so callers can sleep instead of
    /// busy-waiting.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Claim {
        let mut inner = self.inner.lock().await;

        let head_eligible_at = match inner.heap.peek() {
            None => return Claim::Idle { until_next: None },
            Some(head) => head.eligible_at,
        };

        if head_eligible_at <= now {
            match inner.heap.pop() {
                Some(entry) => Claim::Task(entry.task),
                None => Claim::Idle { until_next: None },
            }
        } else {
            let until_next =
                (head_eligible_at - now).to_std().unwrap_or(Duration::from_millis(1));
            Claim::Idle { until_next: Some(until_next) }
        }
    }

    /// Waits until the queue contents change.
    ///
    /// A permit is stored if a submission races this call, so wake-ups are
    /// never lost; workers still cap the wait with their poll interval.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    /// Number of queued tasks.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    /// Returns true when no tasks are queued.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn push(inner: &mut Inner, task: NotificationTask) {
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry { eligible_at: task.next_eligible_at, seq, task });
    }
}
