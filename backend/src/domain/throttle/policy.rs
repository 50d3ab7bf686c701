//! Pure per-account rate limit and failure backoff bookkeeping.
//!
//! Every method takes `now` explicitly so the state machine can be driven by a
//! simulated clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SubmissionConfig;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Throttle limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Admitted attempts per one-minute window.
    pub rate_limit_per_minute: u32,
    /// Upper bound for the failure backoff.
    pub backoff_cap: Duration,
    /// Quiet period after which a failure streak resets.
    pub streak_reset_after: Duration,
}

impl ThrottlePolicy {
    /// Policy from pipeline configuration.
    pub fn from_config(config: &SubmissionConfig) -> Self {
        Self {
            rate_limit_per_minute: config.rate_limit_per_minute.max(1),
            backoff_cap: config.backoff_cap,
            streak_reset_after: config.streak_reset_after,
        }
    }

    /// Backoff after `streak` consecutive failures: 2s, 4s, 8s, 16s, … capped.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use pantry_backend::domain::{SubmissionConfig, ThrottlePolicy};
    ///
    /// let policy = ThrottlePolicy::from_config(&SubmissionConfig::default());
    /// assert_eq!(policy.backoff_for(0), Duration::ZERO);
    /// assert_eq!(policy.backoff_for(3), Duration::from_secs(8));
    /// assert_eq!(policy.backoff_for(9), Duration::from_secs(60));
    /// ```
    pub fn backoff_for(&self, streak: u32) -> Duration {
        if streak == 0 {
            return Duration::ZERO;
        }
        let secs = 1_u64.checked_shl(streak).unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.backoff_cap)
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self::from_config(&SubmissionConfig::default())
    }
}

/// Why an attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    /// Too many attempts in the current window.
    RateLimit,
    /// Attempted before the failure backoff elapsed.
    Backoff,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Admitted,
    Rejected {
        reason: ThrottleReason,
        retry_after: Duration,
    },
}

/// Throttle bookkeeping for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleState {
    window_started_at: Option<DateTime<Utc>>,
    admitted_in_window: u32,
    failure_streak: u32,
    last_failure_at: Option<DateTime<Utc>>,
}

impl ThrottleState {
    /// Current failure streak.
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Decide whether an attempt at `now` may proceed.
    ///
    /// The backoff check runs first so a participant who keeps failing is
    /// told how long the backoff lasts rather than when the window resets.
    /// Admitted attempts count towards the rate window whatever their outcome.
    pub fn admit(&mut self, policy: &ThrottlePolicy, now: DateTime<Utc>) -> ThrottleDecision {
        self.expire_streak(policy, now);

        if let Some(last_failure) = self.last_failure_at {
            let backoff = policy.backoff_for(self.failure_streak);
            let elapsed = elapsed_between(last_failure, now);
            if elapsed < backoff {
                return ThrottleDecision::Rejected {
                    reason: ThrottleReason::Backoff,
                    retry_after: backoff.saturating_sub(elapsed),
                };
            }
        }

        let window_start = match self.window_started_at {
            Some(start) if elapsed_between(start, now) < RATE_WINDOW => start,
            _ => {
                self.window_started_at = Some(now);
                self.admitted_in_window = 0;
                now
            }
        };
        if self.admitted_in_window >= policy.rate_limit_per_minute {
            return ThrottleDecision::Rejected {
                reason: ThrottleReason::RateLimit,
                retry_after: RATE_WINDOW.saturating_sub(elapsed_between(window_start, now)),
            };
        }
        self.admitted_in_window = self.admitted_in_window.saturating_add(1);
        ThrottleDecision::Admitted
    }

    /// Add a strike for a failed submission.
    pub fn record_failure(&mut self, policy: &ThrottlePolicy, now: DateTime<Utc>) {
        self.expire_streak(policy, now);
        self.failure_streak = self.failure_streak.saturating_add(1);
        self.last_failure_at = Some(now);
    }

    /// Clear the failure streak after a committed order.
    pub fn record_success(&mut self) {
        self.failure_streak = 0;
        self.last_failure_at = None;
    }

    /// Whether the state carries nothing worth keeping.
    pub fn is_idle(&self, policy: &ThrottlePolicy, now: DateTime<Utc>) -> bool {
        let window_idle = self
            .window_started_at
            .is_none_or(|start| elapsed_between(start, now) >= RATE_WINDOW);
        let streak_idle = self
            .last_failure_at
            .is_none_or(|last| elapsed_between(last, now) >= policy.streak_reset_after);
        window_idle && streak_idle
    }

    fn expire_streak(&mut self, policy: &ThrottlePolicy, now: DateTime<Utc>) {
        if let Some(last_failure) = self.last_failure_at
            && elapsed_between(last_failure, now) >= policy.streak_reset_after
        {
            self.record_success();
        }
    }
}

fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}
