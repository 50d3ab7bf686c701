//! Order submission coordinator.
//!
//! A submission walks `Received → Admitted → LockAcquired → Validated →
//! Reserved → Committed`. Each step can end the walk at a rejection terminal:
//!
//! - the throttle rejects with [`SubmissionError::RateLimited`];
//! - the guard times out with [`SubmissionError::LockTimeout`] or spots a
//!   replay with [`SubmissionError::DuplicateSubmission`];
//! - availability, limit, and budget checks run together and reject with the
//!   complete issue list;
//! - a failed commit rolls the reservation back and reports
//!   [`SubmissionError::PersistenceFailure`].
//!
//! Rules and balances are read once the account lock is held, so validation
//! never mixes stale reads with fresh writes.

mod config;
mod coordinator;
mod outcome;

pub use self::config::{
    BACKOFF_CAP_SECS_ENV, DEDUP_WINDOW_SECS_ENV, DefaultSubmissionEnv, LOCK_LEASE_SECS_ENV,
    LOCK_WAIT_MS_ENV, RATE_LIMIT_PER_MINUTE_ENV, STREAK_RESET_SECS_ENV, SubmissionConfig,
    SubmissionEnv,
};
pub use self::coordinator::{SubmissionCoordinator, SubmissionDependencies};
pub use self::outcome::{
    CartValidationReport, IssueKind, OrderReceipt, OrderTotals, SubmissionError, SubmissionStage,
    SubmitOrderRequest, ValidateCartRequest, ValidationIssue, retry_after_secs,
};

#[cfg(test)]
mod tests;
