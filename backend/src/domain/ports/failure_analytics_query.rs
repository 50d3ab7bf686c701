//! Driving port for staff-only failure analytics.
//!
//! Inbound adapters use this port to aggregate and page through the failure
//! audit trail without touching the repository directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagination::PageParams;

use crate::domain::{AccountId, Error, FailedOrderAttempt, FailureSummary};

/// Summary request; missing bounds default to the last thirty days.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryRequest {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub top_n: Option<usize>,
}

/// Raw listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttemptQuery {
    pub account_id: Option<AccountId>,
    pub page: PageParams,
}

/// Over-fetched listing rows and the parameters that produced them.
///
/// `rows` may hold one more record than `page.limit()`; the extra row only
/// signals that a next page exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttemptListing {
    pub rows: Vec<FailedOrderAttempt>,
    pub page: PageParams,
}

/// Domain use-case port for failure analytics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FailureAnalyticsQuery: Send + Sync {
    /// Aggregate counts, top messages, and top accounts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `from` is not earlier than `to`.
    async fn summary(&self, request: SummaryRequest) -> Result<FailureSummary, Error>;

    /// Newest-first listing, optionally filtered by account.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a malformed cursor.
    async fn list_attempts(&self, query: FailedAttemptQuery) -> Result<FailedAttemptListing, Error>;
}
