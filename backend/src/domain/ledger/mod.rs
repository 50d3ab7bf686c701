//! Balance ledger: budgets, category sub-ledgers and vouchers.
//!
//! [`BalanceLedger::check_and_reserve`] is a pure computation over a
//! [`LedgerSnapshot`] read at the start of the locked critical section. It
//! produces a [`ReservationToken`] describing exactly which amounts and
//! vouchers a commit will consume. The token is applied to storage by
//! [`crate::domain::ports::LedgerRepository::commit_order`] in the same atomic
//! unit that persists the order; dropping it through
//! [`BalanceLedger::release`] leaves the ledger untouched.
//!
//! Validation order:
//! 1. each category sub-ledger (for example hygiene) against its sub-budget;
//! 2. the cart total against `available_budget`;
//! 3. vouchers, oldest applied first, when the standard budget falls short.
//!
//! All failures are collected and returned together.

mod voucher;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{AccountId, BasisPoints, Cart, Household, LedgerBucket, Money};

pub use self::voucher::{Voucher, VoucherId, VoucherKind, VoucherState, VoucherTransitionError};

/// Budget dedicated to one ledger bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLedger {
    pub bucket: LedgerBucket,
    pub total: Money,
    pub used: Money,
}

impl SubLedger {
    /// `total − used`, never negative.
    pub fn available(&self) -> Money {
        self.total.saturating_sub_floor(self.used)
    }
}

/// Monetary ledger of one account.
///
/// `available_budget` is derived as `total_budget − used_budget` and is never
/// negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub total_budget: Money,
    pub used_budget: Money,
    #[serde(default)]
    pub sub_ledgers: Vec<SubLedger>,
}

impl Balance {
    /// Construct a balance without sub-ledgers.
    pub fn new(total_budget: Money, used_budget: Money) -> Self {
        Self {
            total_budget,
            used_budget,
            sub_ledgers: Vec::new(),
        }
    }

    /// Remaining standard budget.
    pub fn available_budget(&self) -> Money {
        self.total_budget.saturating_sub_floor(self.used_budget)
    }

    /// Sub-ledger for `bucket`, if the account has one.
    pub fn sub_ledger(&self, bucket: &LedgerBucket) -> Option<&SubLedger> {
        self.sub_ledgers.iter().find(|ledger| &ledger.bucket == bucket)
    }

    fn sub_ledger_mut(&mut self, bucket: &LedgerBucket) -> Option<&mut SubLedger> {
        self.sub_ledgers
            .iter_mut()
            .find(|ledger| &ledger.bucket == bucket)
    }
}

/// Everything the ledger needs about one account, read in one go.
///
/// `balance_version` increments on every committed order; commits carry the
/// version they were computed against so storage can reject stale writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub account_id: AccountId,
    pub household: Household,
    pub balance: Balance,
    pub vouchers: Vec<Voucher>,
    pub balance_version: i64,
}

impl LedgerSnapshot {
    /// Applied vouchers eligible for `cart`, oldest first.
    pub fn eligible_vouchers<'a>(&'a self, cart: &Cart) -> Vec<&'a Voucher> {
        let mut eligible: Vec<&Voucher> = self
            .vouchers
            .iter()
            .filter(|voucher| voucher.state == VoucherState::Applied && voucher.kind.matches(cart))
            .collect();
        eligible.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        eligible
    }

    /// Apply a reservation in place.
    ///
    /// Used by storage adapters that hold the snapshot themselves. Fails
    /// without mutating anything when the token is stale or a voucher is no
    /// longer applied.
    pub fn apply(&mut self, token: &ReservationToken) -> Result<(), LedgerApplyError> {
        if token.balance_version != self.balance_version {
            return Err(LedgerApplyError::StaleBalance {
                expected: token.balance_version,
                actual: self.balance_version,
            });
        }
        for id in &token.vouchers {
            let voucher = self
                .vouchers
                .iter()
                .find(|voucher| &voucher.id == id)
                .ok_or(LedgerApplyError::MissingVoucher(*id))?;
            if !voucher.state.can_transition_to(VoucherState::Consumed) {
                return Err(LedgerApplyError::Voucher(VoucherTransitionError::Illegal {
                    id: *id,
                    from: voucher.state,
                    to: VoucherState::Consumed,
                }));
            }
        }

        for voucher in self
            .vouchers
            .iter_mut()
            .filter(|voucher| token.vouchers.contains(&voucher.id))
        {
            voucher.transition(VoucherState::Consumed)?;
        }
        self.balance.used_budget = self.balance.used_budget + token.budget_portion;
        for (bucket, amount) in &token.bucket_charges {
            if let Some(ledger) = self.balance.sub_ledger_mut(bucket) {
                ledger.used = ledger.used + *amount;
            }
        }
        self.balance_version += 1;
        Ok(())
    }
}

/// Errors raised when applying a reservation to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerApplyError {
    #[error("balance version moved from {expected} to {actual}")]
    StaleBalance { expected: i64, actual: i64 },
    #[error("voucher {0} is missing from the ledger")]
    MissingVoucher(VoucherId),
    #[error(transparent)]
    Voucher(#[from] VoucherTransitionError),
}

/// Why a cart cannot be paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BudgetViolation {
    /// A category sub-ledger cannot cover its share of the cart.
    SubBudgetExceeded {
        bucket: LedgerBucket,
        required: Money,
        available: Money,
    },
    /// Budget plus every eligible voucher falls short of the cart total.
    #[serde(rename_all = "camelCase")]
    InsufficientFunds {
        required: Money,
        available_budget: Money,
        voucher_coverage: Money,
    },
}

impl BudgetViolation {
    /// Human-readable message for clients and audit records.
    pub fn message(&self) -> String {
        match self {
            Self::SubBudgetExceeded {
                bucket,
                required,
                available,
            } => format!("{bucket} items total {required} but only {available} remains in the {bucket} budget"),
            Self::InsufficientFunds {
                required,
                available_budget,
                voucher_coverage,
            } => format!(
                "order total {required} exceeds available budget {available_budget} plus vouchers {voucher_coverage}"
            ),
        }
    }
}

/// Amounts and vouchers a successful commit will consume.
///
/// Holds no storage resources; it is a plan computed against one
/// `balance_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationToken {
    pub account_id: AccountId,
    pub balance_version: i64,
    pub cart_total: Money,
    pub budget_portion: Money,
    pub voucher_portion: Money,
    /// Voucher value beyond the shortfall, lost by whole-voucher consumption.
    pub forfeited: Money,
    pub bucket_charges: BTreeMap<LedgerBucket, Money>,
    pub vouchers: Vec<VoucherId>,
}

impl ReservationToken {
    /// Whether vouchers are required to cover the cart.
    pub fn uses_vouchers(&self) -> bool {
        !self.vouchers.is_empty()
    }
}

/// Stateless budget and voucher checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceLedger {
    voucher_multiplier_override: Option<BasisPoints>,
}

impl BalanceLedger {
    /// Ledger using each voucher's own multiplier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger applying a program-pause multiplier to every voucher.
    pub fn with_voucher_multiplier_override(override_multiplier: Option<BasisPoints>) -> Self {
        Self {
            voucher_multiplier_override: override_multiplier,
        }
    }

    /// Validate the cart against the snapshot and plan the consumption.
    ///
    /// Returns every budget violation found; no partial reservation is ever
    /// produced.
    pub fn check_and_reserve(
        &self,
        snapshot: &LedgerSnapshot,
        cart: &Cart,
    ) -> Result<ReservationToken, Vec<BudgetViolation>> {
        let cart_total = cart.total();
        let mut violations = Vec::new();
        let mut bucket_charges = BTreeMap::new();

        for (bucket, required) in cart.bucket_totals() {
            let Some(ledger) = snapshot.balance.sub_ledger(&bucket) else {
                continue;
            };
            let available = ledger.available();
            if required > available {
                violations.push(BudgetViolation::SubBudgetExceeded {
                    bucket,
                    required,
                    available,
                });
            } else {
                bucket_charges.insert(bucket, required);
            }
        }

        let available_budget = snapshot.balance.available_budget();
        let budget_portion = cart_total.min(available_budget);
        let shortfall = cart_total.saturating_sub_floor(available_budget);

        let mut vouchers = Vec::new();
        let mut voucher_coverage = Money::ZERO;
        if shortfall.is_positive() {
            for voucher in snapshot.eligible_vouchers(cart) {
                if voucher_coverage >= shortfall {
                    break;
                }
                let value = voucher.effective_value(self.voucher_multiplier_override);
                if !value.is_positive() {
                    continue;
                }
                voucher_coverage = voucher_coverage + value;
                vouchers.push(voucher.id);
            }
            if voucher_coverage < shortfall {
                violations.push(BudgetViolation::InsufficientFunds {
                    required: cart_total,
                    available_budget,
                    voucher_coverage,
                });
            }
        }

        if !violations.is_empty() {
            debug!(
                account_id = %snapshot.account_id,
                violations = violations.len(),
                "budget check failed"
            );
            return Err(violations);
        }

        Ok(ReservationToken {
            account_id: snapshot.account_id.clone(),
            balance_version: snapshot.balance_version,
            cart_total,
            budget_portion,
            voucher_portion: shortfall,
            forfeited: voucher_coverage.saturating_sub_floor(shortfall),
            bucket_charges,
            vouchers,
        })
    }

    /// Discard a reservation without touching the ledger.
    pub fn release(&self, token: ReservationToken) {
        debug!(
            account_id = %token.account_id,
            balance_version = token.balance_version,
            "reservation released"
        );
    }
}

#[cfg(test)]
mod tests;
