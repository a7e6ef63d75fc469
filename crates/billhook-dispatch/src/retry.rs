//! Exponential backoff retry scheduling with jitter.
//!
//! Decides whether a failed delivery attempt is retried and when the next
//! attempt becomes eligible. The budget (`max_attempts`) and the error's own
//! retryability are the only inputs; workers apply the decision to the task
//! state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Retry policy for failed notification deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Base delay for the exponential backoff calculation.
    pub base_delay: Duration,

    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,

    /// Jitter fraction (0.0 to 1.0) applied to each delay.
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.25,
        }
    }
}

/// Context for deciding the fate of a failed attempt.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt that just failed (1-based).
    pub attempt_number: u32,
    /// Error that caused the failure.
    pub error: DispatchError,
    /// When the attempt failed.
    pub failed_at: DateTime<Utc>,
    /// Policy to apply.
    pub policy: RetryPolicy,
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry no earlier than the given time.
    Retry {
        /// Eligibility time of the next attempt
        next_eligible_at: DateTime<Utc>,
    },
    /// Stop trying; the task is abandoned.
    GiveUp {
        /// Why no further attempts will be made
        reason: String,
    },
}

impl RetryContext {
    /// Creates a retry context for a failed attempt.
    pub fn new(
        attempt_number: u32,
        error: DispatchError,
        failed_at: DateTime<Utc>,
        policy: RetryPolicy,
    ) -> Self {
        Self { attempt_number, error, failed_at, policy }
    }

    /// Decides whether and when to retry.
    ///
    /// Gives up once the attempt budget is exhausted or the error is not
    /// retryable. Rate-limit errors override the backoff schedule with the
    /// endpoint's requested delay, capped at `max_delay`.
    pub fn decide(&self) -> RetryDecision {
        if self.attempt_number >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exhausted", self.policy.max_attempts),
            };
        }

        if !self.error.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("non-retryable error: {}", self.error),
            };
        }

        let delay = self.delay();
        let Ok(chrono_delay) = chrono::Duration::from_std(delay) else {
            return RetryDecision::GiveUp { reason: "retry delay out of range".to_string() };
        };

        RetryDecision::Retry { next_eligible_at: self.failed_at + chrono_delay }
    }

    /// Computes the delay before the next attempt.
    ///
    /// `min(max_delay, base * 2^n) * (1 ± jitter)` where `n` counts prior
    /// attempts, clamped so jitter can never push past `max_delay`.
    fn delay(&self) -> Duration {
        if let Some(retry_after) = self.error.retry_after_seconds() {
            return Duration::from_secs(retry_after).min(self.policy.max_delay);
        }

        let exponent = self.attempt_number.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let exponential = self.policy.base_delay.saturating_mul(multiplier);

        let capped = exponential.min(self.policy.max_delay);
        let jittered = apply_jitter(capped, self.policy.jitter_fraction);

        jittered.min(self.policy.max_delay)
    }
}

/// Randomizes a delay by ±`jitter_fraction` to spread retry bursts.
fn apply_jitter(duration: Duration, jitter_fraction: f64) -> Duration {
    if jitter_fraction <= 0.0 {
        return duration;
    }

    let clamped = jitter_fraction.clamp(0.0, 1.0);
    let range = duration.as_secs_f64() * clamped;

    let mut rng = rand::rng();
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
