//! Staff-facing failure analytics and the retention sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use pagination::Cursor;
use tracing::info;

use super::{FailedAttemptFilter, FailedAttemptKey, FailureSummary, RetentionReport, TimeRange};
use crate::domain::Error;
use crate::domain::ports::{
    FailedAttemptListing, FailedAttemptQuery, FailedAttemptRepository,
    FailedAttemptRepositoryError, FailureAnalyticsQuery, SummaryRequest,
};

const DEFAULT_SUMMARY_DAYS: i64 = 30;
const DEFAULT_TOP_N: usize = 10;
const MAX_TOP_N: usize = 50;
const RETENTION_SAMPLE_SIZE: usize = 5;

fn map_repository_error(err: FailedAttemptRepositoryError) -> Error {
    match &err {
        FailedAttemptRepositoryError::Connection { .. } => {
            Error::service_unavailable("failure audit store is unavailable")
        }
        FailedAttemptRepositoryError::Query { .. }
        | FailedAttemptRepositoryError::Serialization { .. } => {
            Error::internal(format!("failure audit store error: {err}"))
        }
    }
}

/// Read-only analytics over the failure audit trail.
#[derive(Clone)]
pub struct FailureAnalyticsService {
    repository: Arc<dyn FailedAttemptRepository>,
    clock: Arc<dyn Clock>,
}

impl FailureAnalyticsService {
    /// Build the service.
    pub fn new(repository: Arc<dyn FailedAttemptRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    fn resolve_range(&self, request: &SummaryRequest) -> Result<TimeRange, Error> {
        let to = request.to.unwrap_or_else(|| self.clock.utc());
        let from = request
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_SUMMARY_DAYS));
        if from >= to {
            return Err(Error::invalid_request("`from` must be earlier than `to`"));
        }
        Ok(TimeRange { from, to })
    }
}

#[async_trait]
impl FailureAnalyticsQuery for FailureAnalyticsService {
    async fn summary(&self, request: SummaryRequest) -> Result<FailureSummary, Error> {
        let range = self.resolve_range(&request)?;
        let top_n = request.top_n.unwrap_or(DEFAULT_TOP_N).clamp(1, MAX_TOP_N);
        self.repository
            .summarize(range, top_n)
            .await
            .map_err(map_repository_error)
    }

    async fn list_attempts(&self, query: FailedAttemptQuery) -> Result<FailedAttemptListing, Error> {
        let before = query
            .page
            .cursor()
            .map(Cursor::<FailedAttemptKey>::decode)
            .transpose()
            .map_err(|err| {
                Error::invalid_request("invalid cursor")
                    .with_details(serde_json::json!({ "field": "cursor", "reason": err.to_string() }))
            })?
            .map(Cursor::into_key);
        let filter = FailedAttemptFilter {
            account_id: query.account_id,
            before,
            limit: query.page.fetch_limit(),
        };
        let rows = self
            .repository
            .list(&filter)
            .await
            .map_err(map_repository_error)?;
        Ok(FailedAttemptListing {
            rows,
            page: query.page,
        })
    }
}

/// Age-based deletion of failure records.
#[derive(Clone)]
pub struct RetentionSweepService {
    repository: Arc<dyn FailedAttemptRepository>,
    clock: Arc<dyn Clock>,
}

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

impl RetentionSweepService {
    /// Build the service.
    pub fn new(repository: Arc<dyn FailedAttemptRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Cut-off for records older than `older_than_days`.
    pub fn cutoff(&self, older_than_days: u32) -> DateTime<Utc> {
        self.clock.utc() - Duration::days(i64::from(older_than_days))
    }

    /// Delete, or with `dry_run` only count and sample, records older than
    /// `older_than_days`.
    pub async fn sweep(
        &self,
        older_than_days: u32,
        dry_run: bool,
    ) -> Result<RetentionReport, FailedAttemptRepositoryError> {
        let cutoff = self.cutoff(older_than_days);
        if dry_run {
            let would_delete = self.repository.count_older_than(cutoff).await?;
            let samples = self
                .repository
                .sample_older_than(cutoff, RETENTION_SAMPLE_SIZE)
                .await?;
            info!(%cutoff, would_delete, "retention dry run");
            return Ok(RetentionReport::DryRun {
                cutoff,
                would_delete,
                samples,
            });
        }
        let deleted = self.repository.delete_older_than(cutoff).await?;
        info!(%cutoff, deleted, "retention sweep deleted failed order attempts");
        Ok(RetentionReport::Deleted { cutoff, deleted })
    }
}
