//! Submission behaviour under contention and cancellation.
//!
//! Runs the coordinator over the in-memory adapters with real tasks: racing
//! submissions for one account, and a request dropped while it holds the
//! account lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pantry_backend::domain::ports::{CommitRequest, LedgerRepository, LedgerRepositoryError};
use pantry_backend::domain::{
    AccountId, Cart, CategoryRef, ClientMeta, LedgerSnapshot, Money, Order, OrderReceipt,
    RuleSnapshot, RuleVersion, SubmissionError, SubmitOrderRequest,
};
use pantry_backend::outbound::memory::InMemoryLedgerRepository;
use pantry_backend::test_support::InMemoryPipeline;
use pantry_backend::test_support::fixtures::{cart, category, ledger, product};
use rstest::{fixture, rstest};

struct Setup {
    pipeline: InMemoryPipeline,
    account: AccountId,
    category: CategoryRef,
}

#[fixture]
fn setup() -> Setup {
    let pipeline = InMemoryPipeline::new(RuleSnapshot {
        version: RuleVersion::new(1),
        ..RuleSnapshot::default()
    });
    let account = AccountId::random();
    pipeline.ledger.upsert(ledger(&account, 2_000));
    Setup {
        pipeline,
        account,
        category: category("Pantry staples"),
    }
}

impl Setup {
    fn request(&self, cart: Cart) -> SubmitOrderRequest {
        SubmitOrderRequest {
            account_id: self.account.clone(),
            cart,
            client: ClientMeta::default(),
        }
    }

    fn one_item_cart(&self, name: &str, cents: i64) -> Cart {
        let item = product(name, &self.category, cents);
        cart(&[(&item, 1)])
    }

    fn remaining_budget(&self) -> Money {
        self.pipeline
            .ledger
            .ledger(&self.account)
            .expect("ledger seeded")
            .balance
            .available_budget()
    }
}

/// Ledger whose first snapshot read stalls, leaving the submission parked
/// inside the guarded section.
struct StallingLedger {
    inner: Arc<InMemoryLedgerRepository>,
    stalled: AtomicBool,
}

#[async_trait]
impl LedgerRepository for StallingLedger {
    async fn load_snapshot(
        &self,
        account_id: &AccountId,
    ) -> Result<LedgerSnapshot, LedgerRepositoryError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        self.inner.load_snapshot(account_id).await
    }

    async fn commit_order(&self, request: CommitRequest) -> Result<Order, LedgerRepositoryError> {
        self.inner.commit_order(request).await
    }
}

#[rstest]
#[case::guaranteed(true)]
#[case::degraded(false)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_submissions_commit_at_most_one_order(setup: Setup, #[case] lock_service_up: bool) {
    setup.pipeline.locks.set_available(lock_service_up);
    setup.pipeline.claims.set_available(lock_service_up);
    let coordinator = setup.pipeline.coordinator();

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = setup.request(setup.one_item_cart("Rice 2kg", 1_500));
        async move { coordinator.submit(request).await }
    });
    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        let request = setup.request(setup.one_item_cart("Lentils 1kg", 1_500));
        async move { coordinator.submit(request).await }
    });
    let outcomes: Vec<Result<OrderReceipt, SubmissionError>> = vec![
        first.await.expect("first task"),
        second.await.expect("second task"),
    ];

    let accepted: Vec<&OrderReceipt> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 1, "exactly one submission commits");
    assert_eq!(accepted.first().map(|r| r.degraded), Some(!lock_service_up));
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(SubmissionError::BudgetViolation { .. }))),
        "the loser is rejected for budget: {outcomes:?}"
    );
    assert_eq!(setup.pipeline.ledger.orders_for(&setup.account).len(), 1);
    assert_eq!(setup.remaining_budget(), Money::from_cents(500));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancelled_submission_frees_the_lock_and_the_claim(setup: Setup) {
    let coordinator = setup.pipeline.coordinator_over(Arc::new(StallingLedger {
        inner: setup.pipeline.ledger.clone(),
        stalled: AtomicBool::new(false),
    }));
    let basket = setup.one_item_cart("Rice 2kg", 1_500);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        coordinator.submit(setup.request(basket.clone())),
    )
    .await;
    assert!(cancelled.is_err(), "first submission should be cut off");

    let retry = coordinator.submit(setup.request(basket)).await;

    let receipt = retry.expect("retry commits once the dropped session is cleaned up");
    assert!(!receipt.degraded);
    assert!(!setup.pipeline.locks.is_locked(&setup.account));
    assert_eq!(setup.pipeline.ledger.orders_for(&setup.account).len(), 1);
    assert_eq!(setup.remaining_budget(), Money::from_cents(500));
}
