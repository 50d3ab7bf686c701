//! Per-account throttle controller.
//!
//! Wraps the pure [`ThrottleState`] machine in a mutex-guarded map keyed by
//! account and reads time from an injected [`Clock`], so tests can drive it
//! with a simulated clock. State is process-local.

mod policy;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mockable::Clock;
use tracing::debug;

use super::AccountId;

pub use self::policy::{ThrottleDecision, ThrottlePolicy, ThrottleReason, ThrottleState};

const EVICTION_THRESHOLD: usize = 10_000;

/// Rate limit and failure backoff bookkeeping for all accounts.
pub struct ThrottleController {
    policy: ThrottlePolicy,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<AccountId, ThrottleState>>,
}

impl ThrottleController {
    /// Build a controller.
    pub fn new(policy: ThrottlePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    /// Admit or reject an attempt for `account_id` now.
    pub fn check(&self, account_id: &AccountId) -> ThrottleDecision {
        let now = self.clock.utc();
        let mut states = self.lock_states();
        if states.len() > EVICTION_THRESHOLD {
            states.retain(|_, state| !state.is_idle(&self.policy, now));
        }
        let decision = states
            .entry(account_id.clone())
            .or_default()
            .admit(&self.policy, now);
        if let ThrottleDecision::Rejected {
            reason,
            retry_after,
        } = decision
        {
            debug!(%account_id, ?reason, retry_after_ms = retry_after.as_millis(), "attempt throttled");
        }
        decision
    }

    /// Add a failure strike for `account_id`.
    pub fn record_failure(&self, account_id: &AccountId) {
        let now = self.clock.utc();
        let mut states = self.lock_states();
        let state = states.entry(account_id.clone()).or_default();
        state.record_failure(&self.policy, now);
        debug!(%account_id, streak = state.failure_streak(), "failure strike recorded");
    }

    /// Reset the failure streak for `account_id`.
    pub fn record_success(&self, account_id: &AccountId) {
        if let Some(state) = self.lock_states().get_mut(account_id) {
            state.record_success();
        }
    }

    /// Current failure streak for `account_id`.
    pub fn failure_streak(&self, account_id: &AccountId) -> u32 {
        self.lock_states()
            .get(account_id)
            .map_or(0, ThrottleState::failure_streak)
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<AccountId, ThrottleState>> {
        // Throttle state stays usable after a panic elsewhere; the worst case
        // is one stale counter.
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
