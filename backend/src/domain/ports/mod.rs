//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports (`LedgerRepository`, `RuleConfigRepository`,
//! `AccountLockService`, `SubmissionClaimStore`, `FailedAttemptRepository`)
//! describe what the domain needs from storage and shared infrastructure.
//! Driving ports (`SubmissionService`, `FailureAnalyticsQuery`) are what the
//! inbound HTTP adapters call.

mod macros;
pub(crate) use macros::define_port_error;

mod account_lock_service;
mod failed_attempt_repository;
mod failure_analytics_query;
mod ledger_repository;
mod rule_config_repository;
mod submission_claim_store;
mod submission_service;

#[cfg(test)]
pub use account_lock_service::MockAccountLockService;
pub use account_lock_service::{AccountLockError, AccountLockService, LockAcquisition};
#[cfg(test)]
pub use failed_attempt_repository::MockFailedAttemptRepository;
pub use failed_attempt_repository::{FailedAttemptRepository, FailedAttemptRepositoryError};
#[cfg(test)]
pub use failure_analytics_query::MockFailureAnalyticsQuery;
pub use failure_analytics_query::{
    FailedAttemptListing, FailedAttemptQuery, FailureAnalyticsQuery, SummaryRequest,
};
#[cfg(test)]
pub use ledger_repository::MockLedgerRepository;
pub use ledger_repository::{CommitRequest, LedgerRepository, LedgerRepositoryError};
#[cfg(test)]
pub use rule_config_repository::MockRuleConfigRepository;
pub use rule_config_repository::{
    FixtureRuleConfigRepository, RuleConfigRepository, RuleConfigRepositoryError,
};
#[cfg(test)]
pub use submission_claim_store::MockSubmissionClaimStore;
pub use submission_claim_store::{SubmissionClaimError, SubmissionClaimStore};
#[cfg(test)]
pub use submission_service::MockSubmissionService;
pub use submission_service::SubmissionService;
