//! Failure audit trail: record types, the best-effort recorder, staff
//! analytics, and the age-based retention sweep.

mod analytics;
mod record;
mod recorder;

pub use self::analytics::{DEFAULT_RETENTION_DAYS, FailureAnalyticsService, RetentionSweepService};
pub use self::record::{
    BalanceSnapshot, ClientMeta, ComputedTotals, CountedValue, FailedAttemptFilter,
    FailedAttemptId, FailedAttemptKey, FailedOrderAttempt, FailureKind, FailureSummary,
    RetentionReport, RetentionSample, TimeRange, UnknownFailureKind, VoucherSummary, rank_counts,
};
pub use self::recorder::{FailureContext, FailureRecorder};
