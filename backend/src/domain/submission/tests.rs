//! Pipeline tests driving the coordinator through mocked ports.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{
    LedgerRepositoryError, LockAcquisition, MockAccountLockService, MockFailedAttemptRepository,
    MockLedgerRepository, MockRuleConfigRepository, MockSubmissionClaimStore,
    RuleConfigRepositoryError, SubmissionClaimError,
};
use crate::domain::{
    AccountId, AccountLockLease, Cart, ClaimOutcome, ClientMeta, ErrorCode, FailureKind,
    FailureRecorder, LedgerSnapshot, LimitScope, Money, ProductRef, RuleSnapshot, RuleVersion,
    SubmissionGuard, ThrottleController, ThrottlePolicy, ThrottleReason, VoucherState,
};
use crate::test_support::MutableClock;
use crate::test_support::fixtures::{cart, category, category_limit, epoch, ledger, product, voucher};

struct Harness {
    account_id: AccountId,
    config: SubmissionConfig,
    clock: Arc<MutableClock>,
    throttle: Arc<ThrottleController>,
    ledger: MockLedgerRepository,
    rules: MockRuleConfigRepository,
    locks: MockAccountLockService,
    claims: MockSubmissionClaimStore,
    failures: MockFailedAttemptRepository,
    lock_service_available: bool,
}

impl Harness {
    fn serve_rules(&mut self, rules: RuleSnapshot) {
        self.rules
            .expect_load_rules()
            .returning(move || Ok(rules.clone()));
    }

    fn serve_snapshot(&mut self, snapshot: LedgerSnapshot) {
        self.ledger
            .expect_load_snapshot()
            .returning(move |_| Ok(snapshot.clone()));
    }

    fn lock_granted(&mut self) {
        self.locks.expect_acquire().returning(|account_id, _, _| {
            Ok(LockAcquisition::Acquired(AccountLockLease {
                account_id: account_id.clone(),
                token: "lease-1".to_owned(),
            }))
        });
        self.locks.expect_release().times(1).returning(|_| Ok(()));
    }

    fn claims_fresh(&mut self) {
        self.claims
            .expect_claim()
            .times(1)
            .returning(|_, _| Ok(ClaimOutcome::Fresh));
    }

    fn commits_succeed(&mut self) {
        self.ledger
            .expect_commit_order()
            .returning(|request| Ok(request.order));
    }

    fn expect_recorded(&mut self, kind: FailureKind) {
        self.failures
            .expect_insert()
            .withf(move |attempt| attempt.kind == kind)
            .times(1)
            .returning(|_| Ok(()));
    }

    fn request(&self, cart: Cart) -> SubmitOrderRequest {
        SubmitOrderRequest {
            account_id: self.account_id.clone(),
            cart,
            client: ClientMeta::default(),
        }
    }

    fn build(self) -> (SubmissionCoordinator, Arc<ThrottleController>) {
        let guard = SubmissionGuard::new(Arc::new(self.locks), Arc::new(self.claims), &self.config)
            .with_lock_service_available(self.lock_service_available);
        let coordinator = SubmissionCoordinator::new(SubmissionDependencies {
            ledger: Arc::new(self.ledger),
            rules: Arc::new(self.rules),
            guard,
            throttle: self.throttle.clone(),
            recorder: FailureRecorder::new(Arc::new(self.failures), self.clock.clone()),
            clock: self.clock,
        });
        (coordinator, self.throttle)
    }
}

#[fixture]
fn harness() -> Harness {
    let config = SubmissionConfig::default();
    let clock = Arc::new(MutableClock::new(epoch()));
    let throttle = Arc::new(ThrottleController::new(
        ThrottlePolicy::from_config(&config),
        clock.clone(),
    ));
    Harness {
        account_id: AccountId::random(),
        config,
        clock,
        throttle,
        ledger: MockLedgerRepository::new(),
        rules: MockRuleConfigRepository::new(),
        locks: MockAccountLockService::new(),
        claims: MockSubmissionClaimStore::new(),
        failures: MockFailedAttemptRepository::new(),
        lock_service_available: true,
    }
}

fn rules_v1() -> RuleSnapshot {
    RuleSnapshot {
        version: RuleVersion::new(1),
        ..RuleSnapshot::default()
    }
}

fn groceries() -> ProductRef {
    product("Rice", &category("Grains"), 1_500)
}

/// $50 of budget plus one $15 voucher.
fn budget_with_voucher(account_id: &AccountId) -> LedgerSnapshot {
    let mut snapshot = ledger(account_id, 5_000);
    snapshot.vouchers.push(voucher(1_500, VoucherState::Applied, 0));
    snapshot
}

#[rstest]
#[tokio::test]
async fn commits_budget_first_then_whole_vouchers(mut harness: Harness) {
    let snapshot = budget_with_voucher(&harness.account_id);
    let voucher_id = snapshot.vouchers[0].id;
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(snapshot);
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().never();
    harness
        .ledger
        .expect_commit_order()
        .withf(move |request| {
            request.reservation.vouchers == vec![voucher_id]
                && request.reservation.balance_version == 1
                && request.order.lines.len() == 1
        })
        .times(1)
        .returning(|request| Ok(request.order));
    harness.failures.expect_insert().never();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 4)]));
    let (coordinator, throttle) = harness.build();

    let receipt = coordinator.submit(request.clone()).await.expect("order commits");

    assert_eq!(receipt.totals.total, Money::from_cents(6_000));
    assert_eq!(receipt.totals.budget_portion, Money::from_cents(5_000));
    assert_eq!(receipt.totals.voucher_portion, Money::from_cents(1_000));
    assert_eq!(receipt.totals.forfeited_voucher_value, Money::from_cents(500));
    assert_eq!(receipt.totals.consumed_vouchers, vec![voucher_id]);
    assert!(!receipt.degraded);
    assert_eq!(receipt.created_at, epoch());
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[tokio::test]
async fn limit_violations_are_recorded_and_release_the_claim(mut harness: Harness) {
    let meat = category("Meat");
    let beef = product("Beef", &meat, 500);
    harness.serve_rules(RuleSnapshot {
        limits: vec![category_limit(&meat, 2, LimitScope::PerOrder)],
        ..rules_v1()
    });
    harness.serve_snapshot(ledger(&harness.account_id, 10_000));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().times(1).returning(|_| Ok(()));
    harness.ledger.expect_commit_order().never();
    harness.expect_recorded(FailureKind::LimitViolation);
    let request = harness.request(cart(&[(&beef, 3)]));
    let (coordinator, throttle) = harness.build();

    let err = coordinator.submit(request.clone()).await.expect_err("over limit");

    let SubmissionError::LimitViolation { issues } = &err else {
        panic!("expected limit violation, got {err:?}");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Limit);
    assert!(issues[0].message.starts_with("Meat: 3 selected but only 2 allowed"));
    assert_eq!(throttle.failure_streak(&request.account_id), 1);
}

#[rstest]
#[tokio::test]
async fn budget_violations_capture_the_balance_seen(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 1_000));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().times(1).returning(|_| Ok(()));
    harness
        .failures
        .expect_insert()
        .withf(|attempt| {
            attempt.kind == FailureKind::BudgetViolation
                && attempt.balance.as_ref().map(|balance| balance.available_budget)
                    == Some(Money::from_cents(1_000))
                && attempt.fingerprint.is_some()
                && attempt.totals.cart_total == Money::from_cents(3_000)
                && attempt.messages
                    == vec!["order total 30.00 exceeds available budget 10.00 plus vouchers 0.00".to_owned()]
        })
        .times(1)
        .returning(|_| Ok(()));
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 2)]));
    let (coordinator, _) = harness.build();

    let err = coordinator.submit(request).await.expect_err("over budget");

    assert_eq!(err.stage(), SubmissionStage::BudgetViolation);
    assert_eq!(err.issues()[0].kind, IssueKind::Budget);
}

#[rstest]
#[tokio::test]
async fn failure_strikes_back_off_the_next_attempt(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 100));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().returning(|_| Ok(()));
    harness.failures.expect_insert().times(2).returning(|_| Ok(()));
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, _) = harness.build();

    let first = coordinator.submit(request.clone()).await;
    assert!(matches!(first, Err(SubmissionError::BudgetViolation { .. })));

    let second = coordinator.submit(request).await.expect_err("backing off");
    match second {
        SubmissionError::RateLimited {
            reason,
            retry_after,
        } => {
            assert_eq!(reason, ThrottleReason::Backoff);
            assert!(retry_after <= Duration::from_secs(2));
        }
        other => panic!("expected backoff, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn rate_limited_attempts_never_reach_the_lock(mut harness: Harness) {
    harness.locks.expect_acquire().never();
    harness.expect_recorded(FailureKind::RateLimited);
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, throttle) = harness.build();
    for _ in 0..3 {
        throttle.check(&request.account_id);
    }

    let err = coordinator.submit(request.clone()).await.expect_err("rate limited");

    assert!(matches!(
        err,
        SubmissionError::RateLimited {
            reason: ThrottleReason::RateLimit,
            ..
        }
    ));
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[tokio::test]
async fn duplicates_are_neither_recorded_nor_forgotten(mut harness: Harness) {
    harness.rules.expect_load_rules().never();
    harness.ledger.expect_load_snapshot().never();
    harness.lock_granted();
    harness
        .claims
        .expect_claim()
        .times(1)
        .returning(|_, _| Ok(ClaimOutcome::Duplicate));
    harness.claims.expect_forget().never();
    harness.failures.expect_insert().never();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, throttle) = harness.build();

    let err = coordinator.submit(request.clone()).await.expect_err("duplicate");

    assert_eq!(err, SubmissionError::DuplicateSubmission);
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[tokio::test]
async fn lock_timeouts_reject_without_touching_the_ledger(mut harness: Harness) {
    let wait = harness.config.lock_wait_timeout;
    harness
        .locks
        .expect_acquire()
        .times(1)
        .returning(|_, _, _| Ok(LockAcquisition::TimedOut));
    harness.locks.expect_release().never();
    harness.claims.expect_claim().never();
    harness.ledger.expect_load_snapshot().never();
    harness.expect_recorded(FailureKind::LockTimeout);
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, throttle) = harness.build();

    let err = coordinator.submit(request.clone()).await.expect_err("timed out");

    assert_eq!(err, SubmissionError::LockTimeout { retry_after: wait });
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[tokio::test]
async fn unreachable_lock_backend_commits_in_degraded_mode(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    harness
        .locks
        .expect_acquire()
        .times(1)
        .returning(|_, _, _| Err(crate::domain::ports::AccountLockError::unavailable("refused")));
    harness.locks.expect_release().never();
    harness.claims.expect_claim().never();
    harness.commits_succeed();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, _) = harness.build();

    let receipt = coordinator.submit(request).await.expect("degraded commit");

    assert!(receipt.degraded);
}

#[rstest]
#[tokio::test]
async fn declared_unavailable_lock_service_skips_the_backend(mut harness: Harness) {
    harness.lock_service_available = false;
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    harness.locks.expect_acquire().never();
    harness.claims.expect_claim().never();
    harness.commits_succeed();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, _) = harness.build();

    let receipt = coordinator.submit(request).await.expect("degraded commit");

    assert!(receipt.degraded);
}

#[rstest]
#[tokio::test]
async fn unreachable_claim_store_degrades_after_locking(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    harness.lock_granted();
    harness
        .claims
        .expect_claim()
        .times(1)
        .returning(|_, _| Err(SubmissionClaimError::unavailable("refused")));
    harness.commits_succeed();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, _) = harness.build();

    let receipt = coordinator.submit(request).await.expect("degraded commit");

    assert!(receipt.degraded);
}

#[rstest]
#[tokio::test]
async fn stale_balance_is_revalidated_once(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    harness.lock_granted();
    harness.claims_fresh();
    let mut calls = 0_u32;
    harness
        .ledger
        .expect_commit_order()
        .times(2)
        .returning(move |request| {
            calls += 1;
            if calls == 1 {
                Err(LedgerRepositoryError::stale_balance(1_i64, 2_i64))
            } else {
                Ok(request.order)
            }
        });
    harness.failures.expect_insert().never();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, _) = harness.build();

    let receipt = coordinator.submit(request).await.expect("retry commits");

    assert_eq!(receipt.totals.total, Money::from_cents(1_500));
}

#[rstest]
#[case::second_conflict(LedgerRepositoryError::voucher_unavailable("v-1"), 2)]
#[case::connection_lost(LedgerRepositoryError::connection("reset by peer"), 1)]
#[tokio::test]
async fn persistence_failures_forget_the_claim(
    mut harness: Harness,
    #[case] failure: LedgerRepositoryError,
    #[case] commits: usize,
) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().times(1).returning(|_| Ok(()));
    let mut calls = 0_usize;
    harness
        .ledger
        .expect_commit_order()
        .times(commits)
        .returning(move |_| {
            calls += 1;
            if calls < commits {
                Err(LedgerRepositoryError::stale_balance(1_i64, 2_i64))
            } else {
                Err(failure.clone())
            }
        });
    harness.expect_recorded(FailureKind::PersistenceFailure);
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, throttle) = harness.build();

    let err = coordinator.submit(request.clone()).await.expect_err("commit fails");

    assert!(matches!(err, SubmissionError::PersistenceFailure { .. }));
    assert_eq!(throttle.failure_streak(&request.account_id), 1);
}

#[rstest]
#[tokio::test]
async fn unknown_accounts_are_not_recorded(mut harness: Harness) {
    harness.serve_rules(rules_v1());
    harness
        .ledger
        .expect_load_snapshot()
        .returning(|account_id| Err(LedgerRepositoryError::account_not_found(account_id.to_string())));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().times(1).returning(|_| Ok(()));
    harness.failures.expect_insert().never();
    let rice = groceries();
    let request = harness.request(cart(&[(&rice, 1)]));
    let (coordinator, throttle) = harness.build();

    let err = coordinator.submit(request.clone()).await.expect_err("no ledger");

    assert_eq!(
        err,
        SubmissionError::UnknownAccount {
            account_id: request.account_id.to_string()
        }
    );
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[tokio::test]
async fn submission_reports_every_issue_under_the_first_failing_category(mut harness: Harness) {
    let meat = category("Meat");
    let beef = product("Beef", &meat, 2_000);
    let mut retired = product("Lentils", &category("Grains"), 300);
    retired.available = false;
    harness.serve_rules(RuleSnapshot {
        limits: vec![category_limit(&meat, 1, LimitScope::PerOrder)],
        ..rules_v1()
    });
    harness.serve_snapshot(ledger(&harness.account_id, 1_000));
    harness.lock_granted();
    harness.claims_fresh();
    harness.claims.expect_forget().returning(|_| Ok(()));
    harness.expect_recorded(FailureKind::Availability);
    let request = harness.request(cart(&[(&beef, 2), (&retired, 1)]));
    let (coordinator, _) = harness.build();

    let err = coordinator.submit(request).await.expect_err("rejected");

    assert_eq!(err.stage(), SubmissionStage::AvailabilityViolation);
    let kinds: Vec<IssueKind> = err.issues().iter().map(|issue| issue.kind).collect();
    assert_eq!(kinds, vec![IssueKind::Availability, IssueKind::Limit, IssueKind::Budget]);
}

#[rstest]
#[tokio::test]
async fn validation_warns_about_vouchers_and_newer_rules(mut harness: Harness) {
    harness.serve_rules(RuleSnapshot {
        version: RuleVersion::new(3),
        ..RuleSnapshot::default()
    });
    harness.serve_snapshot(budget_with_voucher(&harness.account_id));
    harness.locks.expect_acquire().never();
    harness.claims.expect_claim().never();
    harness.failures.expect_insert().never();
    harness.ledger.expect_commit_order().never();
    let rice = groceries();
    let request = ValidateCartRequest {
        account_id: harness.account_id.clone(),
        cart: cart(&[(&rice, 4)]),
        client: ClientMeta {
            rule_version: Some(RuleVersion::new(2)),
            ..ClientMeta::default()
        },
    };
    let (coordinator, throttle) = harness.build();

    let report = coordinator.validate(request.clone()).await.expect("report");

    assert!(report.valid);
    assert!(report.errors.is_empty());
    let warnings: Vec<(IssueKind, &str)> = report
        .warnings
        .iter()
        .map(|issue| (issue.kind, issue.message.as_str()))
        .collect();
    assert_eq!(
        warnings,
        vec![
            (IssueKind::Budget, "10.00 in vouchers will be used to cover this order"),
            (IssueKind::System, "Purchase rules changed since your cart was last checked"),
        ]
    );
    assert_eq!(throttle.failure_streak(&request.account_id), 0);
}

#[rstest]
#[case::empty(&[], "Your cart is empty")]
#[case::negative(&[-1], "Rice: quantity cannot be negative")]
#[tokio::test]
async fn validation_flags_unusable_quantities(
    mut harness: Harness,
    #[case] quantities: &[i32],
    #[case] expected: &str,
) {
    harness.serve_rules(rules_v1());
    harness.serve_snapshot(ledger(&harness.account_id, 5_000));
    let rice = groceries();
    let lines: Vec<(&ProductRef, i32)> = quantities.iter().map(|qty| (&rice, *qty)).collect();
    let request = ValidateCartRequest {
        account_id: harness.account_id.clone(),
        cart: cart(&lines),
        client: ClientMeta::default(),
    };
    let (coordinator, _) = harness.build();

    let report = coordinator.validate(request).await.expect("report");

    assert!(!report.valid);
    assert!(report.errors.iter().any(|issue| issue.message == expected));
}

#[rstest]
#[tokio::test]
async fn validation_surfaces_storage_outages(mut harness: Harness) {
    harness
        .rules
        .expect_load_rules()
        .returning(|| Err(RuleConfigRepositoryError::connection("refused")));
    let request = ValidateCartRequest {
        account_id: harness.account_id.clone(),
        cart: Cart::default(),
        client: ClientMeta::default(),
    };
    let (coordinator, _) = harness.build();

    let err = coordinator.validate(request).await.expect_err("outage");

    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
#[case(
    SubmissionError::RateLimited { reason: ThrottleReason::Backoff, retry_after: Duration::from_millis(1_500) },
    ErrorCode::TooManyRequests,
    Some(2)
)]
#[case(
    SubmissionError::LockTimeout { retry_after: Duration::from_secs(3) },
    ErrorCode::Conflict,
    Some(3)
)]
#[case(SubmissionError::DuplicateSubmission, ErrorCode::Conflict, None)]
#[case(
    SubmissionError::UnknownAccount { account_id: "acct".to_owned() },
    ErrorCode::NotFound,
    None
)]
#[case(SubmissionError::BudgetViolation { issues: Vec::new() }, ErrorCode::UnprocessableEntity, None)]
#[case(
    SubmissionError::PersistenceFailure { message: "pool exhausted".to_owned() },
    ErrorCode::InternalError,
    None
)]
fn submission_errors_map_to_api_errors(
    #[case] err: SubmissionError,
    #[case] code: ErrorCode,
    #[case] retry_after: Option<u64>,
) {
    let api: crate::domain::Error = err.into();

    assert_eq!(api.code(), code);
    let advertised = api
        .details()
        .and_then(|details| details.get("retryAfter"))
        .and_then(serde_json::Value::as_u64);
    assert_eq!(advertised, retry_after);
    assert!(
        api.details()
            .and_then(|details| details.get("errors"))
            .is_some_and(serde_json::Value::is_array),
        "every rejection lists its errors"
    );
    assert!(!api.message().contains("pool exhausted"));
}

#[rstest]
#[case(SubmissionStage::Received, false)]
#[case(SubmissionStage::RolledBack, false)]
#[case(SubmissionStage::Committed, true)]
#[case(SubmissionStage::Duplicate, true)]
fn terminal_stages_are_final(#[case] stage: SubmissionStage, #[case] terminal: bool) {
    assert_eq!(stage.is_terminal(), terminal);
}
