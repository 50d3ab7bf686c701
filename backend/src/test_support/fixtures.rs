//! Builders for carts, ledgers, and rules used across test suites.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::domain::{
    AccountId, Balance, BasisPoints, Cart, CartLine, CategoryRef, ClientMeta, ComputedTotals,
    FailedAttemptId, FailedOrderAttempt, FailureKind, Household, LedgerBucket, LedgerSnapshot,
    LimitScope, LimitTarget, LimitTargetKind, Money, ProductLimit, ProductRef, Voucher, VoucherId,
    VoucherKind, VoucherState,
};

/// Fixed instant tests anchor their clocks to.
pub fn epoch() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single() {
        Some(at) => at,
        None => panic!("fixture timestamp is valid"),
    }
}

/// Category with a random id.
pub fn category(name: &str) -> CategoryRef {
    CategoryRef {
        id: Uuid::new_v4(),
        name: name.to_owned(),
    }
}

/// Available product in `category` priced at `cents`.
pub fn product(name: &str, category: &CategoryRef, cents: i64) -> ProductRef {
    ProductRef {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        category: category.clone(),
        subcategory: None,
        unit_price: Money::from_cents(cents),
        ledger_bucket: None,
        available: true,
    }
}

/// Copy of `product` placed in `subcategory`.
pub fn in_subcategory(product: &ProductRef, subcategory: &CategoryRef) -> ProductRef {
    ProductRef {
        subcategory: Some(subcategory.clone()),
        ..product.clone()
    }
}

/// Copy of `product` charged to the `bucket` sub-ledger.
pub fn in_bucket(product: &ProductRef, bucket: &str) -> ProductRef {
    ProductRef {
        ledger_bucket: Some(LedgerBucket::new(bucket)),
        ..product.clone()
    }
}

/// Cart from `(product, quantity)` pairs.
pub fn cart(lines: &[(&ProductRef, i32)]) -> Cart {
    Cart::new(
        lines
            .iter()
            .map(|(product, quantity)| CartLine {
                product: (*product).clone(),
                quantity: *quantity,
            })
            .collect(),
    )
}

/// Limit on a category.
pub fn category_limit(category: &CategoryRef, allowed: u32, scope: LimitScope) -> ProductLimit {
    ProductLimit {
        target: LimitTarget {
            kind: LimitTargetKind::Category,
            id: category.id,
            name: category.name.clone(),
        },
        allowed,
        scope,
    }
}

/// Limit on a subcategory.
pub fn subcategory_limit(subcategory: &CategoryRef, allowed: u32, scope: LimitScope) -> ProductLimit {
    ProductLimit {
        target: LimitTarget {
            kind: LimitTargetKind::Subcategory,
            id: subcategory.id,
            name: subcategory.name.clone(),
        },
        allowed,
        scope,
    }
}

/// Ledger with `available_cents` of standard budget and no vouchers.
pub fn ledger(account_id: &AccountId, available_cents: i64) -> LedgerSnapshot {
    LedgerSnapshot {
        account_id: account_id.clone(),
        household: Household::new(2, 1, 0),
        balance: Balance::new(Money::from_cents(available_cents), Money::ZERO),
        vouchers: Vec::new(),
        balance_version: 1,
    }
}

/// General-purpose voucher at ×1 created `minutes_after` the epoch.
pub fn voucher(cents: i64, state: VoucherState, minutes_after: i64) -> Voucher {
    Voucher {
        id: VoucherId::random(),
        kind: VoucherKind::General,
        amount: Money::from_cents(cents),
        multiplier: BasisPoints::ONE,
        state,
        created_at: epoch() + chrono::Duration::minutes(minutes_after),
    }
}

/// Minimal failure record created `minutes_ago` before the epoch.
pub fn failed_attempt(
    account_id: &AccountId,
    kind: FailureKind,
    minutes_ago: i64,
    message: &str,
) -> FailedOrderAttempt {
    FailedOrderAttempt {
        id: FailedAttemptId::random(),
        account_id: account_id.clone(),
        trace_id: None,
        kind,
        messages: vec![message.to_owned()],
        cart: serde_json::Value::Null,
        totals: ComputedTotals::default(),
        balance: None,
        fingerprint: None,
        cart_hash: String::new(),
        client: ClientMeta::default(),
        created_at: epoch() - chrono::Duration::minutes(minutes_ago),
    }
}
