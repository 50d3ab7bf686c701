//! Immutable failed-attempt records and their query shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccountId, Balance, BasisPoints, LedgerBucket, LedgerSnapshot, Money, RuleVersion, SubLedger,
    VoucherId, VoucherKind, VoucherState,
};

/// Identifier of a failed-attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailedAttemptId(Uuid);

impl FailedAttemptId {
    /// Generate a fresh identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for FailedAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Terminal rejection category stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    LockTimeout,
    Availability,
    LimitViolation,
    BudgetViolation,
    PersistenceFailure,
}

impl FailureKind {
    /// Stable storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::LockTimeout => "lock_timeout",
            Self::Availability => "availability",
            Self::LimitViolation => "limit_violation",
            Self::BudgetViolation => "budget_violation",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`FailureKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown failure kind `{0}`")]
pub struct UnknownFailureKind(pub String);

impl FromStr for FailureKind {
    type Err = UnknownFailureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rate_limited" => Ok(Self::RateLimited),
            "lock_timeout" => Ok(Self::LockTimeout),
            "availability" => Ok(Self::Availability),
            "limit_violation" => Ok(Self::LimitViolation),
            "budget_violation" => Ok(Self::BudgetViolation),
            "persistence_failure" => Ok(Self::PersistenceFailure),
            other => Err(UnknownFailureKind(other.to_owned())),
        }
    }
}

/// Client-supplied request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_version: Option<RuleVersion>,
}

/// Totals computed for the rejected cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedTotals {
    pub cart_total: Money,
    #[serde(default)]
    pub bucket_totals: BTreeMap<LedgerBucket, Money>,
}

/// Voucher as seen at the time of failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherSummary {
    pub id: VoucherId,
    pub kind: VoucherKind,
    pub amount: Money,
    pub effective_value: Money,
    pub created_at: DateTime<Utc>,
}

/// Balance figures as seen at the time of failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub total_budget: Money,
    pub used_budget: Money,
    pub available_budget: Money,
    #[serde(default)]
    pub sub_ledgers: Vec<SubLedger>,
    #[serde(default)]
    pub applied_vouchers: Vec<VoucherSummary>,
    pub balance_version: i64,
}

impl BalanceSnapshot {
    /// Capture the figures a participant saw, valuing vouchers with any
    /// program-pause override in force.
    pub fn capture(
        snapshot: &LedgerSnapshot,
        voucher_override: Option<BasisPoints>,
    ) -> Self {
        let Balance {
            total_budget,
            used_budget,
            sub_ledgers,
        } = &snapshot.balance;
        Self {
            total_budget: *total_budget,
            used_budget: *used_budget,
            available_budget: snapshot.balance.available_budget(),
            sub_ledgers: sub_ledgers.clone(),
            applied_vouchers: snapshot
                .vouchers
                .iter()
                .filter(|voucher| voucher.state == VoucherState::Applied)
                .map(|voucher| VoucherSummary {
                    id: voucher.id,
                    kind: voucher.kind.clone(),
                    amount: voucher.amount,
                    effective_value: voucher.effective_value(voucher_override),
                    created_at: voucher.created_at,
                })
                .collect(),
            balance_version: snapshot.balance_version,
        }
    }
}

/// Immutable audit record of one rejected or errored submission.
///
/// Holds enough context to reconstruct what the participant saw without
/// replaying rule evaluation. Records are never updated; retention deletes
/// them by age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOrderAttempt {
    pub id: FailedAttemptId,
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub kind: FailureKind,
    pub messages: Vec<String>,
    pub cart: serde_json::Value,
    pub totals: ComputedTotals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub cart_hash: String,
    pub client: ClientMeta,
    pub created_at: DateTime<Utc>,
}

/// Ordering key for newest-first listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttemptKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&FailedOrderAttempt> for FailedAttemptKey {
    fn from(value: &FailedOrderAttempt) -> Self {
        Self {
            created_at: value.created_at,
            id: *value.id.as_uuid(),
        }
    }
}

/// Repository-level listing request.
///
/// Returns records strictly older than `before` (by `(created_at, id)`),
/// newest first, at most `limit` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttemptFilter {
    pub account_id: Option<AccountId>,
    pub before: Option<FailedAttemptKey>,
    pub limit: usize,
}

/// Inclusive-exclusive time range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Whether `at` falls inside the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

/// A value and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountedValue {
    pub value: String,
    pub count: u64,
}

/// Aggregate failure statistics over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub range: TimeRange,
    pub total: u64,
    pub by_kind: BTreeMap<FailureKind, u64>,
    pub top_messages: Vec<CountedValue>,
    pub top_accounts: Vec<CountedValue>,
}

/// Sort counted values by descending count then ascending value, keeping
/// at most `top_n`.
pub fn rank_counts(counts: impl IntoIterator<Item = (String, u64)>, top_n: usize) -> Vec<CountedValue> {
    let mut ranked: Vec<CountedValue> = counts
        .into_iter()
        .map(|(value, count)| CountedValue { value, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    ranked.truncate(top_n);
    ranked
}

/// Sampled record reported by a dry-run sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSample {
    pub id: FailedAttemptId,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetentionReport {
    DryRun {
        cutoff: DateTime<Utc>,
        would_delete: u64,
        samples: Vec<RetentionSample>,
    },
    Deleted {
        cutoff: DateTime<Utc>,
        deleted: u64,
    },
}
