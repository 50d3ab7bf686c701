//! Fully wired submission pipeline over in-memory adapters.

use std::sync::Arc;

use mockable::Clock;

use super::MutableClock;
use super::fixtures::epoch;
use crate::domain::ports::LedgerRepository;
use crate::domain::{
    FailureAnalyticsService, FailureRecorder, RuleSnapshot, SubmissionConfig,
    SubmissionCoordinator, SubmissionDependencies, SubmissionGuard, ThrottleController,
    ThrottlePolicy,
};
use crate::inbound::http::state::HttpState;
use crate::outbound::memory::{
    InMemoryAccountLockService, InMemoryFailedAttemptRepository, InMemoryLedgerRepository,
    InMemoryRuleConfigRepository, InMemorySubmissionClaimStore,
};

/// Adapters and clock shared by one coordinator, exposed for inspection.
pub struct InMemoryPipeline {
    pub config: SubmissionConfig,
    pub clock: Arc<MutableClock>,
    pub ledger: Arc<InMemoryLedgerRepository>,
    pub rules: Arc<InMemoryRuleConfigRepository>,
    pub failed_attempts: Arc<InMemoryFailedAttemptRepository>,
    pub locks: Arc<InMemoryAccountLockService>,
    pub claims: Arc<InMemorySubmissionClaimStore>,
    pub throttle: Arc<ThrottleController>,
}

impl InMemoryPipeline {
    /// Pipeline with default configuration, `rules`, and a clock at the epoch.
    pub fn new(rules: RuleSnapshot) -> Self {
        Self::with_config(rules, SubmissionConfig::default())
    }

    /// Pipeline with explicit tuning.
    pub fn with_config(rules: RuleSnapshot, config: SubmissionConfig) -> Self {
        let clock = Arc::new(MutableClock::new(epoch()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let throttle = Arc::new(ThrottleController::new(
            ThrottlePolicy::from_config(&config),
            dyn_clock.clone(),
        ));
        Self {
            config,
            clock,
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            rules: Arc::new(InMemoryRuleConfigRepository::new(rules)),
            failed_attempts: Arc::new(InMemoryFailedAttemptRepository::new()),
            locks: Arc::new(InMemoryAccountLockService::new()),
            claims: Arc::new(InMemorySubmissionClaimStore::new(dyn_clock)),
            throttle,
        }
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Coordinator over this pipeline's adapters.
    pub fn coordinator(&self) -> SubmissionCoordinator {
        self.coordinator_over(self.ledger.clone())
    }

    /// Coordinator reading and committing through `ledger` instead of the
    /// pipeline's own store.
    pub fn coordinator_over(&self, ledger: Arc<dyn LedgerRepository>) -> SubmissionCoordinator {
        let guard = SubmissionGuard::new(self.locks.clone(), self.claims.clone(), &self.config);
        SubmissionCoordinator::new(SubmissionDependencies {
            ledger,
            rules: self.rules.clone(),
            guard,
            throttle: self.throttle.clone(),
            recorder: FailureRecorder::new(self.failed_attempts.clone(), self.clock()),
            clock: self.clock(),
        })
    }

    /// Analytics over this pipeline's failure records.
    pub fn analytics(&self) -> FailureAnalyticsService {
        FailureAnalyticsService::new(self.failed_attempts.clone(), self.clock())
    }

    /// HTTP state backed by this pipeline.
    pub fn http_state(&self) -> HttpState {
        HttpState::new(Arc::new(self.coordinator()), Arc::new(self.analytics()))
    }
}
