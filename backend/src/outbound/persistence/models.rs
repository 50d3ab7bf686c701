//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer; repositories convert them
//! to and from domain types.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    failed_order_attempts, ledgers, orders, rule_config_versions, sub_ledgers, vouchers,
};

// ---------------------------------------------------------------------------
// Ledger models
// ---------------------------------------------------------------------------

/// Row struct for reading from the ledgers table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ledgers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LedgerRow {
    pub account_id: Uuid,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
    pub total_budget_cents: i64,
    pub used_budget_cents: i64,
    pub balance_version: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = sub_ledgers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SubLedgerRow {
    pub bucket: String,
    pub total_cents: i64,
    pub used_cents: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = vouchers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct VoucherRow {
    pub id: Uuid,
    pub kind: String,
    pub bucket: Option<String>,
    pub amount_cents: i64,
    pub multiplier_bp: i32,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for committed orders.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orders)]
pub(crate) struct NewOrderRow<'a> {
    pub id: Uuid,
    pub account_id: Uuid,
    pub lines: serde_json::Value,
    pub total_cents: i64,
    pub budget_portion_cents: i64,
    pub voucher_portion_cents: i64,
    pub consumed_vouchers: Vec<Uuid>,
    pub fingerprint: &'a str,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Rule configuration models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = rule_config_versions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RuleConfigRow {
    pub version: i64,
    pub limits: serde_json::Value,
    pub program_pause: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Failure audit models
// ---------------------------------------------------------------------------

/// Row struct for both reading and inserting failure audit records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = failed_order_attempts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct FailedAttemptRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub trace_id: Option<String>,
    pub kind: String,
    pub messages: serde_json::Value,
    pub cart: serde_json::Value,
    pub totals: serde_json::Value,
    pub balance: Option<serde_json::Value>,
    pub fingerprint: Option<String>,
    pub cart_hash: String,
    pub client: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
