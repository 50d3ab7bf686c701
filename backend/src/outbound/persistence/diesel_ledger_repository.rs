//! PostgreSQL-backed `LedgerRepository` implementation using Diesel ORM.
//!
//! Snapshots are read inside one transaction so the balance, sub-ledgers and
//! vouchers agree with the returned `balance_version`. Commits lock the
//! ledger row with `SELECT ... FOR UPDATE`, re-check the version, consume
//! the reserved vouchers, charge the budgets and insert the order before the
//! transaction closes. Any rejection rolls the whole unit back.

use async_trait::async_trait;
use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{CommitRequest, LedgerRepository, LedgerRepositoryError};
use crate::domain::{
    AccountId, Balance, BasisPoints, Household, LedgerBucket, LedgerSnapshot, Money, Order,
    SubLedger, Voucher, VoucherId, VoucherKind, VoucherState,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{LedgerRow, NewOrderRow, SubLedgerRow, VoucherRow};
use super::pool::{DbPool, PoolError};
use super::schema::{ledgers, orders, sub_ledgers, vouchers};

const GENERAL_KIND: &str = "general";
const RESTRICTED_KIND: &str = "restricted";

/// Diesel-backed implementation of the `LedgerRepository` port.
#[derive(Clone)]
pub struct DieselLedgerRepository {
    pool: DbPool,
}

impl DieselLedgerRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> LedgerRepositoryError {
    map_basic_pool_error(error, LedgerRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> LedgerRepositoryError {
    map_basic_diesel_error(
        error,
        LedgerRepositoryError::query,
        LedgerRepositoryError::connection,
    )
}

/// Failure inside the commit transaction: either a database error or a
/// business rejection discovered under the row lock.
#[derive(Debug)]
enum CommitFailure {
    Database(diesel::result::Error),
    Rejected(LedgerRepositoryError),
}

impl From<diesel::result::Error> for CommitFailure {
    fn from(value: diesel::result::Error) -> Self {
        Self::Database(value)
    }
}

impl From<CommitFailure> for LedgerRepositoryError {
    fn from(value: CommitFailure) -> Self {
        match value {
            CommitFailure::Database(error) => map_diesel_error(error),
            CommitFailure::Rejected(error) => error,
        }
    }
}

fn household_from_row(row: &LedgerRow) -> Result<Household, LedgerRepositoryError> {
    let count = |value: i32, column: &str| {
        u32::try_from(value).map_err(|_| {
            LedgerRepositoryError::query(format!("{column} is negative in ledgers row"))
        })
    };
    Ok(Household::new(
        count(row.adults, "adults")?,
        count(row.children, "children")?,
        count(row.infants, "infants")?,
    ))
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = LedgerRepositoryError;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        let kind = match (row.kind.as_str(), row.bucket) {
            (GENERAL_KIND, _) => VoucherKind::General,
            (RESTRICTED_KIND, Some(bucket)) => VoucherKind::Restricted {
                bucket: LedgerBucket::new(bucket),
            },
            (RESTRICTED_KIND, None) => {
                return Err(LedgerRepositoryError::query(format!(
                    "restricted voucher {} has no bucket",
                    row.id
                )));
            }
            (other, _) => {
                return Err(LedgerRepositoryError::query(format!(
                    "voucher {} has unknown kind `{other}`",
                    row.id
                )));
            }
        };
        let multiplier = u32::try_from(row.multiplier_bp).map_err(|_| {
            LedgerRepositoryError::query(format!("voucher {} has a negative multiplier", row.id))
        })?;
        let state = row
            .state
            .parse::<VoucherState>()
            .map_err(|err| LedgerRepositoryError::query(err.to_string()))?;
        Ok(Self {
            id: VoucherId::from_uuid(row.id),
            kind,
            amount: Money::from_cents(row.amount_cents),
            multiplier: BasisPoints::new(multiplier),
            state,
            created_at: row.created_at,
        })
    }
}

fn snapshot_from_rows(
    ledger: LedgerRow,
    subs: Vec<SubLedgerRow>,
    voucher_rows: Vec<VoucherRow>,
) -> Result<LedgerSnapshot, LedgerRepositoryError> {
    let household = household_from_row(&ledger)?;
    let mut balance = Balance::new(
        Money::from_cents(ledger.total_budget_cents),
        Money::from_cents(ledger.used_budget_cents),
    );
    balance.sub_ledgers = subs
        .into_iter()
        .map(|row| SubLedger {
            bucket: LedgerBucket::new(row.bucket),
            total: Money::from_cents(row.total_cents),
            used: Money::from_cents(row.used_cents),
        })
        .collect();
    let vouchers = voucher_rows
        .into_iter()
        .map(Voucher::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LedgerSnapshot {
        account_id: AccountId::from_uuid(ledger.account_id),
        household,
        balance,
        vouchers,
        balance_version: ledger.balance_version,
    })
}

fn order_row(order: &Order) -> Result<NewOrderRow<'_>, LedgerRepositoryError> {
    let lines = serde_json::to_value(&order.lines)
        .map_err(|err| LedgerRepositoryError::query(format!("serialise order lines: {err}")))?;
    Ok(NewOrderRow {
        id: *order.id.as_uuid(),
        account_id: *order.account_id.as_uuid(),
        lines,
        total_cents: order.total.cents(),
        budget_portion_cents: order.budget_portion.cents(),
        voucher_portion_cents: order.voucher_portion.cents(),
        consumed_vouchers: order
            .consumed_vouchers
            .iter()
            .map(|id| *id.as_uuid())
            .collect(),
        fingerprint: order.fingerprint.as_str(),
        created_at: order.created_at,
    })
}

#[async_trait]
impl LedgerRepository for DieselLedgerRepository {
    async fn load_snapshot(
        &self,
        account_id: &AccountId,
    ) -> Result<LedgerSnapshot, LedgerRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let account_uuid = *account_id.as_uuid();
        let open_states = [VoucherState::Pending.as_str(), VoucherState::Applied.as_str()];

        let (ledger, subs, voucher_rows) = conn
            .transaction(|conn| {
                async move {
                    let ledger: Option<LedgerRow> = ledgers::table
                        .find(account_uuid)
                        .select(LedgerRow::as_select())
                        .first(conn)
                        .await
                        .optional()?;
                    let subs: Vec<SubLedgerRow> = sub_ledgers::table
                        .filter(sub_ledgers::account_id.eq(account_uuid))
                        .order(sub_ledgers::bucket.asc())
                        .select(SubLedgerRow::as_select())
                        .load(conn)
                        .await?;
                    let voucher_rows: Vec<VoucherRow> = vouchers::table
                        .filter(vouchers::account_id.eq(account_uuid))
                        .filter(vouchers::state.eq_any(open_states))
                        .order((vouchers::created_at.asc(), vouchers::id.asc()))
                        .select(VoucherRow::as_select())
                        .load(conn)
                        .await?;
                    Ok::<_, diesel::result::Error>((ledger, subs, voucher_rows))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        let Some(ledger) = ledger else {
            return Err(LedgerRepositoryError::account_not_found(account_id.to_string()));
        };
        snapshot_from_rows(ledger, subs, voucher_rows)
    }

    async fn commit_order(&self, request: CommitRequest) -> Result<Order, LedgerRepositoryError> {
        let CommitRequest { reservation, order } = request;
        // The insert row borrows `order` for as long as the connection lives.
        let committed = order.clone();
        let new_order = order_row(&order)?;
        let account_uuid = *reservation.account_id.as_uuid();
        let account_label = reservation.account_id.to_string();
        let now = committed.created_at;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction::<_, CommitFailure, _>(|conn| {
            async move {
                let current: Option<i64> = ledgers::table
                    .find(account_uuid)
                    .select(ledgers::balance_version)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let Some(current) = current else {
                    return Err(CommitFailure::Rejected(
                        LedgerRepositoryError::account_not_found(account_label),
                    ));
                };
                if current != reservation.balance_version {
                    return Err(CommitFailure::Rejected(LedgerRepositoryError::stale_balance(
                        reservation.balance_version,
                        current,
                    )));
                }

                for voucher_id in &reservation.vouchers {
                    let consumed = diesel::update(
                        vouchers::table
                            .filter(vouchers::id.eq(voucher_id.as_uuid()))
                            .filter(vouchers::account_id.eq(account_uuid))
                            .filter(vouchers::state.eq(VoucherState::Applied.as_str())),
                    )
                    .set((
                        vouchers::state.eq(VoucherState::Consumed.as_str()),
                        vouchers::consumed_at.eq(Some(now)),
                    ))
                    .execute(conn)
                    .await?;
                    if consumed == 0 {
                        return Err(CommitFailure::Rejected(
                            LedgerRepositoryError::voucher_unavailable(voucher_id.to_string()),
                        ));
                    }
                }

                diesel::update(ledgers::table.find(account_uuid))
                    .set((
                        ledgers::used_budget_cents
                            .eq(ledgers::used_budget_cents + reservation.budget_portion.cents()),
                        ledgers::balance_version.eq(ledgers::balance_version + 1),
                        ledgers::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                for (bucket, amount) in &reservation.bucket_charges {
                    diesel::update(sub_ledgers::table.find((account_uuid, bucket.as_str())))
                        .set(sub_ledgers::used_cents.eq(sub_ledgers::used_cents + amount.cents()))
                        .execute(conn)
                        .await?;
                }

                diesel::insert_into(orders::table)
                    .values(&new_order)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(LedgerRepositoryError::from)?;

        debug!(
            account_id = %committed.account_id,
            order_id = %committed.id,
            vouchers = committed.consumed_vouchers.len(),
            "order committed"
        );
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    //! Row conversion tests; database behaviour is covered by the in-memory
    //! adapter contract tests.

    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::*;
    use crate::domain::{OrderId, OrderLine};

    fn voucher_row(kind: &str, bucket: Option<&str>, state: &str) -> VoucherRow {
        VoucherRow {
            id: Uuid::from_u128(7),
            kind: kind.to_owned(),
            bucket: bucket.map(str::to_owned),
            amount_cents: 1_500,
            multiplier_bp: 10_000,
            state: state.to_owned(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("timestamp"),
        }
    }

    fn ledger_row() -> LedgerRow {
        LedgerRow {
            account_id: Uuid::from_u128(1),
            adults: 2,
            children: 1,
            infants: 0,
            total_budget_cents: 10_000,
            used_budget_cents: 2_500,
            balance_version: 4,
        }
    }

    #[rstest]
    fn general_voucher_row_converts() {
        let voucher = Voucher::try_from(voucher_row("general", None, "applied")).expect("voucher");

        assert_eq!(voucher.kind, VoucherKind::General);
        assert_eq!(voucher.state, VoucherState::Applied);
        assert_eq!(voucher.amount, Money::from_cents(1_500));
        assert_eq!(voucher.multiplier, BasisPoints::ONE);
    }

    #[rstest]
    fn restricted_voucher_row_keeps_bucket() {
        let voucher =
            Voucher::try_from(voucher_row("restricted", Some("Hygiene"), "pending")).expect("voucher");

        assert_eq!(
            voucher.kind,
            VoucherKind::Restricted {
                bucket: LedgerBucket::new("hygiene")
            }
        );
    }

    #[rstest]
    #[case(voucher_row("restricted", None, "applied"))]
    #[case(voucher_row("gift", None, "applied"))]
    #[case(voucher_row("general", None, "spent"))]
    #[case(VoucherRow { multiplier_bp: -1, ..voucher_row("general", None, "applied") })]
    fn malformed_voucher_rows_are_query_errors(#[case] row: VoucherRow) {
        let err = Voucher::try_from(row).expect_err("malformed row");

        assert!(matches!(err, LedgerRepositoryError::Query { .. }));
    }

    #[rstest]
    fn snapshot_assembles_budget_sub_ledgers_and_vouchers() {
        let subs = vec![SubLedgerRow {
            bucket: "hygiene".to_owned(),
            total_cents: 2_000,
            used_cents: 500,
        }];
        let snapshot = snapshot_from_rows(
            ledger_row(),
            subs,
            vec![voucher_row("general", None, "applied")],
        )
        .expect("snapshot");

        assert_eq!(snapshot.household, Household::new(2, 1, 0));
        assert_eq!(snapshot.balance.available_budget(), Money::from_cents(7_500));
        assert_eq!(
            snapshot
                .balance
                .sub_ledger(&LedgerBucket::new("hygiene"))
                .map(SubLedger::available),
            Some(Money::from_cents(1_500))
        );
        assert_eq!(snapshot.vouchers.len(), 1);
        assert_eq!(snapshot.balance_version, 4);
    }

    #[rstest]
    fn negative_household_counts_are_rejected() {
        let row = LedgerRow {
            infants: -1,
            ..ledger_row()
        };

        let err = snapshot_from_rows(row, Vec::new(), Vec::new()).expect_err("negative infants");

        assert_eq!(err, LedgerRepositoryError::query("infants is negative in ledgers row"));
    }

    #[rstest]
    fn order_row_flattens_money_and_voucher_ids() {
        let voucher = VoucherId::from_uuid(Uuid::from_u128(9));
        let order = Order {
            id: OrderId::from_uuid(Uuid::from_u128(3)),
            account_id: AccountId::from_uuid(Uuid::from_u128(1)),
            lines: vec![OrderLine {
                product_id: Uuid::from_u128(5),
                product_name: "Rice".to_owned(),
                quantity: 2,
                unit_price: Money::from_cents(300),
                line_total: Money::from_cents(600),
            }],
            total: Money::from_cents(600),
            budget_portion: Money::from_cents(400),
            voucher_portion: Money::from_cents(200),
            consumed_vouchers: vec![voucher],
            fingerprint: "abc".to_owned(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().expect("timestamp"),
        };

        let row = order_row(&order).expect("row");

        assert_eq!(row.total_cents, 600);
        assert_eq!(row.voucher_portion_cents, 200);
        assert_eq!(row.consumed_vouchers, vec![Uuid::from_u128(9)]);
        assert_eq!(row.lines[0]["productName"], "Rice");
    }
}
