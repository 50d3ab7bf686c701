//! Order validation and submission domain.
//!
//! Purpose: hold the transport-agnostic rules of the benefits program: how
//! carts are checked against purchase limits and balances, how concurrent
//! retries are fenced off, and how failures are audited. Nothing here knows
//! about HTTP, SQL, or Redis; adapters reach the domain through
//! [`ports`].
//!
//! Public surface:
//! - Cart, Order, LedgerSnapshot: in-memory aggregates validated before
//!   anything is persisted.
//! - evaluate_limits: category and subcategory quantity rules.
//! - BalanceLedger: budget, sub-ledger, and voucher reservation.
//! - SubmissionGuard / ThrottleController: concurrency and pacing.
//! - SubmissionCoordinator: the submission pipeline tying them together.
//! - FailureRecorder and friends: the failure audit trail.
//! - Error / ErrorCode: transport-agnostic error payload.

pub mod account;
pub mod audit;
pub mod cart;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod limits;
pub mod money;
pub mod order;
pub mod ports;
pub mod rules;
pub mod submission;
pub mod throttle;
pub mod trace_id;

pub use self::account::{AccountId, AccountIdValidationError, Household};
pub use self::audit::{
    BalanceSnapshot, ClientMeta, ComputedTotals, CountedValue, DEFAULT_RETENTION_DAYS,
    FailedAttemptFilter, FailedAttemptId, FailedAttemptKey, FailedOrderAttempt,
    FailureAnalyticsService, FailureContext, FailureKind, FailureRecorder, FailureSummary,
    RetentionReport, RetentionSample, RetentionSweepService, TimeRange, UnknownFailureKind,
    VoucherSummary, rank_counts,
};
pub use self::cart::{Cart, CartLine, CategoryRef, LedgerBucket, ProductRef};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::guard::{
    AccountLockLease, ClaimOutcome, FingerprintError, GuardError, GuardMode, GuardSession,
    SubmissionFingerprint, SubmissionGuard, cart_hash, submission_fingerprint,
};
pub use self::ledger::{
    Balance, BalanceLedger, BudgetViolation, LedgerApplyError, LedgerSnapshot, ReservationToken,
    SubLedger, Voucher, VoucherId, VoucherKind, VoucherState, VoucherTransitionError,
};
pub use self::limits::{
    LimitScope, LimitTarget, LimitTargetKind, LimitViolation, ProductLimit,
    evaluate as evaluate_limits,
};
pub use self::money::{BasisPoints, Money};
pub use self::order::{Order, OrderId, OrderLine};
pub use self::rules::{ProgramPause, RuleSnapshot, RuleVersion};
pub use self::submission::{
    CartValidationReport, DefaultSubmissionEnv, IssueKind, OrderReceipt, OrderTotals,
    SubmissionConfig, SubmissionCoordinator, SubmissionDependencies, SubmissionEnv,
    SubmissionError, SubmissionStage, SubmitOrderRequest, ValidateCartRequest, ValidationIssue,
    retry_after_secs,
};
pub use self::throttle::{
    ThrottleController, ThrottleDecision, ThrottlePolicy, ThrottleReason, ThrottleState,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use pantry_backend::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("staff only"))
/// }
/// assert!(handler().is_err());
/// ```
pub type ApiResult<T> = Result<T, Error>;
