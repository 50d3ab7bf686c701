//! Tests for budget and voucher reservation.

use chrono::{Duration, TimeZone, Utc};
use rstest::{fixture, rstest};
use uuid::Uuid;

use super::*;
use crate::domain::{CartLine, CategoryRef, ProductRef};

fn product(price: i64, bucket: Option<&str>) -> ProductRef {
    ProductRef {
        id: Uuid::new_v4(),
        name: format!("Item {price}"),
        category: CategoryRef {
            id: Uuid::new_v4(),
            name: "Groceries".to_owned(),
        },
        subcategory: None,
        unit_price: Money::from_cents(price),
        ledger_bucket: bucket.map(LedgerBucket::new),
        available: true,
    }
}

fn cart_of(price: i64, bucket: Option<&str>) -> Cart {
    Cart::new(vec![CartLine {
        product: product(price, bucket),
        quantity: 1,
    }])
}

fn voucher(amount: i64, age_days: i64, state: VoucherState) -> Voucher {
    let base = Utc
        .with_ymd_and_hms(2026, 1, 31, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    Voucher {
        id: VoucherId::random(),
        kind: VoucherKind::General,
        amount: Money::from_cents(amount),
        multiplier: BasisPoints::ONE,
        state,
        created_at: base - Duration::days(age_days),
    }
}

#[fixture]
fn snapshot() -> LedgerSnapshot {
    LedgerSnapshot {
        account_id: AccountId::random(),
        household: Household::new(1, 0, 0),
        balance: Balance::new(Money::from_cents(10_000), Money::from_cents(5_000)),
        vouchers: Vec::new(),
        balance_version: 7,
    }
}

#[rstest]
fn budget_only_order_reserves_cart_total(snapshot: LedgerSnapshot) {
    let token = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(2_000, None))
        .expect("affordable");

    assert_eq!(token.budget_portion, Money::from_cents(2_000));
    assert_eq!(token.voucher_portion, Money::ZERO);
    assert!(!token.uses_vouchers());
    assert_eq!(token.balance_version, 7);
}

#[rstest]
fn voucher_covers_shortfall_and_is_consumed_on_apply(mut snapshot: LedgerSnapshot) {
    let fifteen = voucher(1_500, 1, VoucherState::Applied);
    snapshot.vouchers.push(fifteen.clone());

    let token = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(6_000, None))
        .expect("voucher covers shortfall");

    assert_eq!(token.vouchers, vec![fifteen.id]);
    assert_eq!(token.budget_portion, Money::from_cents(5_000));
    assert_eq!(token.voucher_portion, Money::from_cents(1_000));
    assert_eq!(token.forfeited, Money::from_cents(500));

    snapshot.apply(&token).expect("apply");
    assert_eq!(snapshot.balance.available_budget(), Money::ZERO);
    assert_eq!(
        snapshot.vouchers.first().map(|v| v.state),
        Some(VoucherState::Consumed)
    );
    assert_eq!(snapshot.balance_version, 8);
}

#[rstest]
fn vouchers_are_selected_oldest_first_and_only_while_needed(mut snapshot: LedgerSnapshot) {
    let newest = voucher(1_000, 1, VoucherState::Applied);
    let oldest = voucher(1_000, 30, VoucherState::Applied);
    let middle = voucher(1_000, 10, VoucherState::Applied);
    snapshot.vouchers = vec![newest.clone(), oldest.clone(), middle.clone()];

    let token = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(6_500, None))
        .expect("two vouchers suffice");

    assert_eq!(token.vouchers, vec![oldest.id, middle.id]);
}

#[rstest]
#[case(VoucherState::Pending)]
#[case(VoucherState::Consumed)]
#[case(VoucherState::Expired)]
fn non_applied_vouchers_are_never_used(mut snapshot: LedgerSnapshot, #[case] state: VoucherState) {
    snapshot.vouchers.push(voucher(5_000, 3, state));

    let violations = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(6_000, None))
        .expect_err("voucher is not usable");

    assert_eq!(
        violations,
        vec![BudgetViolation::InsufficientFunds {
            required: Money::from_cents(6_000),
            available_budget: Money::from_cents(5_000),
            voucher_coverage: Money::ZERO,
        }]
    );
}

#[rstest]
fn insufficient_vouchers_fail_without_partial_consumption(mut snapshot: LedgerSnapshot) {
    snapshot.vouchers.push(voucher(500, 2, VoucherState::Applied));
    let before = snapshot.clone();

    let violations = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(6_000, None))
        .expect_err("still short");

    assert_eq!(violations.len(), 1);
    assert_eq!(snapshot, before);
}

#[rstest]
fn program_pause_multiplier_scales_voucher_value(mut snapshot: LedgerSnapshot) {
    snapshot.vouchers.push(voucher(1_000, 2, VoucherState::Applied));
    let cart = cart_of(6_500, None);

    assert!(BalanceLedger::new().check_and_reserve(&snapshot, &cart).is_err());

    let paused = BalanceLedger::with_voucher_multiplier_override(Some(BasisPoints::new(20_000)));
    let token = paused
        .check_and_reserve(&snapshot, &cart)
        .expect("doubled voucher covers");
    assert_eq!(token.voucher_portion, Money::from_cents(1_500));
    assert_eq!(
        snapshot.vouchers.first().map(|v| v.amount),
        Some(Money::from_cents(1_000))
    );
}

#[rstest]
fn restricted_voucher_requires_exclusive_bucket_cart(mut snapshot: LedgerSnapshot) {
    let mut hygiene = voucher(2_000, 2, VoucherState::Applied);
    hygiene.kind = VoucherKind::Restricted {
        bucket: LedgerBucket::new("hygiene"),
    };
    snapshot.vouchers.push(hygiene.clone());

    let ledger = BalanceLedger::new();
    assert!(ledger
        .check_and_reserve(&snapshot, &cart_of(6_000, None))
        .is_err());
    let token = ledger
        .check_and_reserve(&snapshot, &cart_of(6_000, Some("hygiene")))
        .expect("restricted voucher applies");
    assert_eq!(token.vouchers, vec![hygiene.id]);
}

#[rstest]
fn sub_ledger_and_overall_violations_are_reported_together(mut snapshot: LedgerSnapshot) {
    snapshot.balance.sub_ledgers.push(SubLedger {
        bucket: LedgerBucket::new("hygiene"),
        total: Money::from_cents(1_000),
        used: Money::from_cents(400),
    });

    let violations = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(7_000, Some("hygiene")))
        .expect_err("both budgets exceeded");

    assert_eq!(violations.len(), 2);
    assert!(matches!(
        violations.first(),
        Some(BudgetViolation::SubBudgetExceeded { available, .. }) if *available == Money::from_cents(600)
    ));
}

#[rstest]
fn sub_ledger_charges_apply_on_commit(mut snapshot: LedgerSnapshot) {
    snapshot.balance.sub_ledgers.push(SubLedger {
        bucket: LedgerBucket::new("hygiene"),
        total: Money::from_cents(1_000),
        used: Money::ZERO,
    });

    let token = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(800, Some("hygiene")))
        .expect("within sub-budget");
    snapshot.apply(&token).expect("apply");

    let hygiene = snapshot
        .balance
        .sub_ledger(&LedgerBucket::new("hygiene"))
        .expect("sub-ledger");
    assert_eq!(hygiene.available(), Money::from_cents(200));
    assert_eq!(snapshot.balance.available_budget(), Money::from_cents(4_200));
}

#[rstest]
fn apply_rejects_stale_tokens(mut snapshot: LedgerSnapshot) {
    let token = BalanceLedger::new()
        .check_and_reserve(&snapshot, &cart_of(1_000, None))
        .expect("affordable");
    snapshot.balance_version += 1;

    let err = snapshot.apply(&token).expect_err("stale");
    assert_eq!(
        err,
        LedgerApplyError::StaleBalance {
            expected: 7,
            actual: 8
        }
    );
}

#[rstest]
#[case(VoucherState::Pending, VoucherState::Applied, true)]
#[case(VoucherState::Applied, VoucherState::Consumed, true)]
#[case(VoucherState::Pending, VoucherState::Expired, true)]
#[case(VoucherState::Applied, VoucherState::Expired, true)]
#[case(VoucherState::Pending, VoucherState::Consumed, false)]
#[case(VoucherState::Consumed, VoucherState::Applied, false)]
#[case(VoucherState::Expired, VoucherState::Applied, false)]
fn voucher_lifecycle_transitions(
    #[case] from: VoucherState,
    #[case] to: VoucherState,
    #[case] legal: bool,
) {
    let mut subject = voucher(100, 0, from);
    assert_eq!(subject.transition(to).is_ok(), legal);
}
