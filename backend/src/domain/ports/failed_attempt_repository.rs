//! Port for the failed-attempt audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    FailedAttemptFilter, FailedOrderAttempt, FailureSummary, RetentionSample, TimeRange,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by failed-attempt repositories.
    pub enum FailedAttemptRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "failed-attempt repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "failed-attempt repository query failed: {message}",
        /// Stored JSON could not be (de)serialised.
        Serialization { message: String } => "failed-attempt serialization failed: {message}",
    }
}

/// Port for append-only audit records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FailedAttemptRepository: Send + Sync {
    /// Append one record.
    async fn insert(&self, attempt: &FailedOrderAttempt) -> Result<(), FailedAttemptRepositoryError>;

    /// Newest-first listing honouring `filter`.
    async fn list(
        &self,
        filter: &FailedAttemptFilter,
    ) -> Result<Vec<FailedOrderAttempt>, FailedAttemptRepositoryError>;

    /// Aggregate statistics for records created inside `range`.
    async fn summarize(
        &self,
        range: TimeRange,
        top_n: usize,
    ) -> Result<FailureSummary, FailedAttemptRepositoryError>;

    /// Number of records created before `cutoff`.
    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError>;

    /// Up to `limit` of the oldest records created before `cutoff`.
    async fn sample_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RetentionSample>, FailedAttemptRepositoryError>;

    /// Delete records created before `cutoff`, returning how many went.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError>;
}
