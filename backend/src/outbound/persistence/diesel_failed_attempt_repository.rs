//! PostgreSQL-backed failed-attempt audit trail.
//!
//! Records are append-only. Listing pages newest first with a keyset on
//! `(created_at, id)`; the summary aggregates in SQL so large ranges never
//! load full rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text, Timestamptz};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{FailedAttemptRepository, FailedAttemptRepositoryError};
use crate::domain::{
    AccountId, FailedAttemptFilter, FailedAttemptId, FailedOrderAttempt, FailureKind,
    FailureSummary, RetentionSample, TimeRange, rank_counts,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error, row_count};
use super::models::FailedAttemptRow;
use super::pool::{DbPool, PoolError};
use super::schema::failed_order_attempts;

const TOP_MESSAGES_SQL: &str = "\
SELECT message, COUNT(*) AS occurrences \
FROM failed_order_attempts, jsonb_array_elements_text(messages) AS message \
WHERE created_at >= $1 AND created_at < $2 \
GROUP BY message \
ORDER BY occurrences DESC, message ASC \
LIMIT $3";

/// Diesel-backed implementation of the `FailedAttemptRepository` port.
#[derive(Clone)]
pub struct DieselFailedAttemptRepository {
    pool: DbPool,
}

impl DieselFailedAttemptRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(QueryableByName)]
struct MessageCountRow {
    #[diesel(sql_type = Text)]
    message: String,
    #[diesel(sql_type = BigInt)]
    occurrences: i64,
}

fn map_pool_error(error: PoolError) -> FailedAttemptRepositoryError {
    map_basic_pool_error(error, FailedAttemptRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> FailedAttemptRepositoryError {
    map_basic_diesel_error(
        error,
        FailedAttemptRepositoryError::query,
        FailedAttemptRepositoryError::connection,
    )
}

fn serialization(error: impl std::fmt::Display) -> FailedAttemptRepositoryError {
    FailedAttemptRepositoryError::serialization(error.to_string())
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn to_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl TryFrom<&FailedOrderAttempt> for FailedAttemptRow {
    type Error = FailedAttemptRepositoryError;

    fn try_from(attempt: &FailedOrderAttempt) -> Result<Self, Self::Error> {
        Ok(Self {
            id: *attempt.id.as_uuid(),
            account_id: *attempt.account_id.as_uuid(),
            trace_id: attempt.trace_id.clone(),
            kind: attempt.kind.as_str().to_owned(),
            messages: serde_json::to_value(&attempt.messages).map_err(serialization)?,
            cart: attempt.cart.clone(),
            totals: serde_json::to_value(&attempt.totals).map_err(serialization)?,
            balance: attempt
                .balance
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(serialization)?,
            fingerprint: attempt.fingerprint.clone(),
            cart_hash: attempt.cart_hash.clone(),
            client: serde_json::to_value(&attempt.client).map_err(serialization)?,
            created_at: attempt.created_at,
        })
    }
}

impl TryFrom<FailedAttemptRow> for FailedOrderAttempt {
    type Error = FailedAttemptRepositoryError;

    fn try_from(row: FailedAttemptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: FailedAttemptId::from_uuid(row.id),
            account_id: AccountId::from_uuid(row.account_id),
            trace_id: row.trace_id,
            kind: row.kind.parse::<FailureKind>().map_err(serialization)?,
            messages: serde_json::from_value(row.messages).map_err(serialization)?,
            cart: row.cart,
            totals: serde_json::from_value(row.totals).map_err(serialization)?,
            balance: row
                .balance
                .map(serde_json::from_value)
                .transpose()
                .map_err(serialization)?,
            fingerprint: row.fingerprint,
            cart_hash: row.cart_hash,
            client: serde_json::from_value(row.client).map_err(serialization)?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl FailedAttemptRepository for DieselFailedAttemptRepository {
    async fn insert(&self, attempt: &FailedOrderAttempt) -> Result<(), FailedAttemptRepositoryError> {
        let row = FailedAttemptRow::try_from(attempt)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(failed_order_attempts::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn list(
        &self,
        filter: &FailedAttemptFilter,
    ) -> Result<Vec<FailedOrderAttempt>, FailedAttemptRepositoryError> {
        use failed_order_attempts::dsl as fa;

        let mut query = fa::failed_order_attempts
            .select(FailedAttemptRow::as_select())
            .into_boxed();
        if let Some(account_id) = &filter.account_id {
            query = query.filter(fa::account_id.eq(*account_id.as_uuid()));
        }
        if let Some(key) = filter.before {
            query = query.filter(
                fa::created_at
                    .lt(key.created_at)
                    .or(fa::created_at.eq(key.created_at).and(fa::id.lt(key.id))),
            );
        }

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<FailedAttemptRow> = query
            .order((fa::created_at.desc(), fa::id.desc()))
            .limit(to_limit(filter.limit))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(FailedOrderAttempt::try_from).collect()
    }

    async fn summarize(
        &self,
        range: TimeRange,
        top_n: usize,
    ) -> Result<FailureSummary, FailedAttemptRepositoryError> {
        use failed_order_attempts::dsl as fa;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let kind_counts: Vec<(String, i64)> = fa::failed_order_attempts
            .filter(fa::created_at.ge(range.from))
            .filter(fa::created_at.lt(range.to))
            .group_by(fa::kind)
            .select((fa::kind, count_star()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let mut total = 0_u64;
        let mut by_kind = std::collections::BTreeMap::new();
        for (kind, count) in kind_counts {
            let count = to_count(count);
            total += count;
            by_kind.insert(kind.parse::<FailureKind>().map_err(serialization)?, count);
        }

        let account_counts: Vec<(Uuid, i64)> = fa::failed_order_attempts
            .filter(fa::created_at.ge(range.from))
            .filter(fa::created_at.lt(range.to))
            .group_by(fa::account_id)
            .select((fa::account_id, count_star()))
            .order((count_star().desc(), fa::account_id.asc()))
            .limit(to_limit(top_n))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let message_counts: Vec<MessageCountRow> = sql_query(TOP_MESSAGES_SQL)
            .bind::<Timestamptz, _>(range.from)
            .bind::<Timestamptz, _>(range.to)
            .bind::<BigInt, _>(to_limit(top_n))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(FailureSummary {
            range,
            total,
            by_kind,
            top_messages: rank_counts(
                message_counts
                    .into_iter()
                    .map(|row| (row.message, to_count(row.occurrences))),
                top_n,
            ),
            top_accounts: rank_counts(
                account_counts
                    .into_iter()
                    .map(|(account, count)| (account.to_string(), to_count(count))),
                top_n,
            ),
        })
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let count: i64 = failed_order_attempts::table
            .filter(failed_order_attempts::created_at.lt(cutoff))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(to_count(count))
    }

    async fn sample_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RetentionSample>, FailedAttemptRepositoryError> {
        use failed_order_attempts::dsl as fa;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(Uuid, DateTime<Utc>)> = fa::failed_order_attempts
            .filter(fa::created_at.lt(cutoff))
            .order((fa::created_at.asc(), fa::id.asc()))
            .select((fa::id, fa::created_at))
            .limit(to_limit(limit))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, created_at)| RetentionSample {
                id: FailedAttemptId::from_uuid(id),
                created_at,
            })
            .collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, FailedAttemptRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            failed_order_attempts::table.filter(failed_order_attempts::created_at.lt(cutoff)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(row_count(deleted))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::domain::{ClientMeta, ComputedTotals, Money, RuleVersion};

    fn attempt() -> FailedOrderAttempt {
        FailedOrderAttempt {
            id: FailedAttemptId::from_uuid(Uuid::from_u128(11)),
            account_id: AccountId::from_uuid(Uuid::from_u128(1)),
            trace_id: Some("00000000-0000-0000-0000-00000000000a".to_owned()),
            kind: FailureKind::LimitViolation,
            messages: vec!["Rice limited to 2 per household".to_owned()],
            cart: json!({ "lines": [] }),
            totals: ComputedTotals {
                cart_total: Money::from_cents(900),
                ..ComputedTotals::default()
            },
            balance: None,
            fingerprint: Some("ff".to_owned()),
            cart_hash: "aa".to_owned(),
            client: ClientMeta {
                user_agent: Some("pantry-web".to_owned()),
                ip_address: None,
                rule_version: Some(RuleVersion::new(7)),
            },
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().expect("timestamp"),
        }
    }

    #[rstest]
    fn attempt_survives_row_conversion() {
        let original = attempt();

        let row = FailedAttemptRow::try_from(&original).expect("row");
        assert_eq!(row.kind, "limit_violation");
        assert_eq!(row.client["ruleVersion"], 7);

        let restored = FailedOrderAttempt::try_from(row).expect("attempt");
        assert_eq!(restored, original);
    }

    #[rstest]
    fn unknown_kind_is_a_serialization_error() {
        let mut row = FailedAttemptRow::try_from(&attempt()).expect("row");
        row.kind = "exploded".to_owned();

        let err = FailedOrderAttempt::try_from(row).expect_err("unknown kind");

        assert!(matches!(err, FailedAttemptRepositoryError::Serialization { .. }));
    }

    #[rstest]
    #[case(usize::MAX, i64::MAX)]
    #[case(25, 25)]
    fn limits_saturate(#[case] input: usize, #[case] expected: i64) {
        assert_eq!(to_limit(input), expected);
    }
}
