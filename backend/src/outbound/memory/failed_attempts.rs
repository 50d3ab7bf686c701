//! Append-only failure audit trail kept in memory.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{FailedAttemptRepository, FailedAttemptRepositoryError};
use crate::domain::{
    FailedAttemptFilter, FailedAttemptKey, FailedOrderAttempt, FailureSummary, RetentionSample,
    TimeRange, rank_counts,
};

/// Failed-attempt repository backed by a vector.
#[derive(Default)]
pub struct InMemoryFailedAttemptRepository {
    attempts: Mutex<Vec<FailedOrderAttempt>>,
}

impl InMemoryFailedAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored record, in insertion order.
    pub fn all(&self) -> Vec<FailedOrderAttempt> {
        self.lock_attempts().clone()
    }

    fn lock_attempts(&self) -> MutexGuard<'_, Vec<FailedOrderAttempt>> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn newest_first(a: &FailedOrderAttempt, b: &FailedOrderAttempt) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

fn is_before(attempt: &FailedOrderAttempt, key: &FailedAttemptKey) -> bool {
    (attempt.created_at, *attempt.id.as_uuid()) < (key.created_at, key.id)
}

#[async_trait]
impl FailedAttemptRepository for InMemoryFailedAttemptRepository {
    async fn insert(&self, attempt: &FailedOrderAttempt) -> Result<(), FailedAttemptRepositoryError> {
        self.lock_attempts().push(attempt.clone());
        Ok(())
    }

    async fn list(
        &self,
        filter: &FailedAttemptFilter,
    ) -> Result<Vec<FailedOrderAttempt>, FailedAttemptRepositoryError> {
        let mut rows: Vec<FailedOrderAttempt> = self
            .lock_attempts()
            .iter()
            .filter(|attempt| {
                filter
                    .account_id
                    .as_ref()
                    .is_none_or(|account_id| &attempt.account_id == account_id)
            })
            .filter(|attempt| filter.before.is_none_or(|key| is_before(attempt, &key)))
            .cloned()
            .collect();
        rows.sort_by(newest_first);
        rows.truncate(filter.limit);
        Ok(rows)
    }

    async fn summarize(
        &self,
        range: TimeRange,
        top_n: usize,
    ) -> Result<FailureSummary, FailedAttemptRepositoryError> {
        let attempts = self.lock_attempts();
        let mut total = 0_u64;
        let mut by_kind = BTreeMap::new();
        let mut messages: HashMap<String, u64> = HashMap::new();
        let mut accounts: HashMap<String, u64> = HashMap::new();
        for attempt in attempts.iter().filter(|attempt| range.contains(attempt.created_at)) {
            total += 1;
            *by_kind.entry(attempt.kind).or_insert(0) += 1;
            for message in &attempt.messages {
                *messages.entry(message.clone()).or_insert(0) += 1;
            }
            *accounts.entry(attempt.account_id.to_string()).or_insert(0) += 1;
        }
        Ok(FailureSummary {
            range,
            total,
            by_kind,
            top_messages: rank_counts(messages, top_n),
            top_accounts: rank_counts(accounts, top_n),
        })
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError> {
        let count = self
            .lock_attempts()
            .iter()
            .filter(|attempt| attempt.created_at < cutoff)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn sample_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RetentionSample>, FailedAttemptRepositoryError> {
        let mut old: Vec<RetentionSample> = self
            .lock_attempts()
            .iter()
            .filter(|attempt| attempt.created_at < cutoff)
            .map(|attempt| RetentionSample {
                id: attempt.id,
                created_at: attempt.created_at,
            })
            .collect();
        old.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        old.truncate(limit);
        Ok(old)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError> {
        let mut attempts = self.lock_attempts();
        let before = attempts.len();
        attempts.retain(|attempt| attempt.created_at >= cutoff);
        Ok(u64::try_from(before - attempts.len()).unwrap_or(u64::MAX))
    }
}
