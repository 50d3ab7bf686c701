//! PostgreSQL-backed `RuleConfigRepository`.
//!
//! Rule configurations are append-only rows keyed by version; the highest
//! version is the live configuration.

use async_trait::async_trait;
use diesel::OptionalExtension;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{RuleConfigRepository, RuleConfigRepositoryError};
use crate::domain::{ProductLimit, ProgramPause, RuleSnapshot, RuleVersion};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::RuleConfigRow;
use super::pool::{DbPool, PoolError};
use super::schema::rule_config_versions;

/// Diesel-backed implementation of the `RuleConfigRepository` port.
#[derive(Clone)]
pub struct DieselRuleConfigRepository {
    pool: DbPool,
}

impl DieselRuleConfigRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> RuleConfigRepositoryError {
    map_basic_pool_error(error, RuleConfigRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> RuleConfigRepositoryError {
    map_basic_diesel_error(
        error,
        RuleConfigRepositoryError::query,
        RuleConfigRepositoryError::connection,
    )
}

impl TryFrom<RuleConfigRow> for RuleSnapshot {
    type Error = RuleConfigRepositoryError;

    fn try_from(row: RuleConfigRow) -> Result<Self, Self::Error> {
        let limits: Vec<ProductLimit> = serde_json::from_value(row.limits).map_err(|err| {
            RuleConfigRepositoryError::query(format!(
                "rule version {} has malformed limits: {err}",
                row.version
            ))
        })?;
        let program_pause: Option<ProgramPause> = row
            .program_pause
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| {
                RuleConfigRepositoryError::query(format!(
                    "rule version {} has a malformed program pause: {err}",
                    row.version
                ))
            })?;
        Ok(Self {
            version: RuleVersion::new(row.version),
            limits,
            program_pause,
        })
    }
}

#[async_trait]
impl RuleConfigRepository for DieselRuleConfigRepository {
    async fn load_rules(&self) -> Result<RuleSnapshot, RuleConfigRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<RuleConfigRow> = rule_config_versions::table
            .order(rule_config_versions::version.desc())
            .select(RuleConfigRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        // An unconfigured program enforces no limits.
        row.map_or_else(|| Ok(RuleSnapshot::default()), RuleSnapshot::try_from)
    }

    async fn current_version(&self) -> Result<RuleVersion, RuleConfigRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let version: Option<i64> = rule_config_versions::table
            .select(max(rule_config_versions::version))
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(version.map(RuleVersion::new).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::domain::BasisPoints;

    #[rstest]
    fn empty_row_converts_to_unrestricted_snapshot() {
        let row = RuleConfigRow {
            version: 3,
            limits: json!([]),
            program_pause: None,
        };

        let snapshot = RuleSnapshot::try_from(row).expect("snapshot");

        assert_eq!(snapshot.version, RuleVersion::new(3));
        assert!(snapshot.limits.is_empty());
        assert!(snapshot.voucher_multiplier_override().is_none());
    }

    #[rstest]
    fn program_pause_row_sets_multiplier_override() {
        let row = RuleConfigRow {
            version: 4,
            limits: json!([]),
            program_pause: Some(json!({ "voucherMultiplier": 5000 })),
        };

        let snapshot = RuleSnapshot::try_from(row).expect("snapshot");

        assert_eq!(
            snapshot.voucher_multiplier_override(),
            Some(BasisPoints::new(5_000))
        );
    }

    #[rstest]
    fn malformed_limits_are_query_errors() {
        let row = RuleConfigRow {
            version: 5,
            limits: json!({ "not": "a list" }),
            program_pause: None,
        };

        let err = RuleSnapshot::try_from(row).expect_err("malformed");

        assert!(matches!(err, RuleConfigRepositoryError::Query { .. }));
    }
}
