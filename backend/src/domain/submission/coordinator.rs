//! The submission pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, info, warn};

use super::outcome::{
    CartValidationReport, IssueKind, OrderReceipt, OrderTotals, SubmissionError, SubmissionStage,
    SubmitOrderRequest, ValidateCartRequest, ValidationIssue,
};
use crate::domain::ports::{
    CommitRequest, LedgerRepository, LedgerRepositoryError, RuleConfigRepository,
    RuleConfigRepositoryError, SubmissionService,
};
use crate::domain::{
    AccountId, BalanceLedger, BalanceSnapshot, Cart, ClaimOutcome, ComputedTotals, Error,
    FailureContext, FailureKind, FailureRecorder, GuardError, GuardSession, LedgerSnapshot, Order,
    OrderId, ReservationToken, RuleSnapshot, RuleVersion, SubmissionFingerprint, SubmissionGuard,
    ThrottleController, ThrottleDecision, evaluate_limits, submission_fingerprint,
};

/// Collaborators of a [`SubmissionCoordinator`].
#[derive(Clone)]
pub struct SubmissionDependencies {
    pub ledger: Arc<dyn LedgerRepository>,
    pub rules: Arc<dyn RuleConfigRepository>,
    pub guard: SubmissionGuard,
    pub throttle: Arc<ThrottleController>,
    pub recorder: FailureRecorder,
    pub clock: Arc<dyn Clock>,
}

/// Drives one submission from `Received` to a terminal stage.
///
/// Every rejection except `Duplicate` is handed to the failure recorder. The
/// account lock and an uncommitted claim are released when the guard session
/// ends, including when the submission future is dropped mid-flight.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    ledger: Arc<dyn LedgerRepository>,
    rules: Arc<dyn RuleConfigRepository>,
    guard: SubmissionGuard,
    throttle: Arc<ThrottleController>,
    recorder: FailureRecorder,
    clock: Arc<dyn Clock>,
}

/// Context gathered while the pipeline runs, kept for the failure record.
#[derive(Default)]
struct AttemptContext {
    fingerprint: Option<SubmissionFingerprint>,
    balance: Option<BalanceSnapshot>,
}

struct StageTrace<'a> {
    account_id: &'a AccountId,
    stage: SubmissionStage,
}

impl<'a> StageTrace<'a> {
    fn new(account_id: &'a AccountId) -> Self {
        debug!(%account_id, stage = %SubmissionStage::Received, "submission received");
        Self {
            account_id,
            stage: SubmissionStage::Received,
        }
    }

    fn advance(&mut self, next: SubmissionStage) {
        debug!(
            account_id = %self.account_id,
            from = %self.stage,
            to = %next,
            "submission stage transition"
        );
        self.stage = next;
    }
}

/// Availability, limit, and budget findings for one cart.
struct Assessment {
    availability: Vec<ValidationIssue>,
    limits: Vec<ValidationIssue>,
    budget: Vec<ValidationIssue>,
    reservation: Option<ReservationToken>,
}

impl Assessment {
    fn run(cart: &Cart, rules: &RuleSnapshot, snapshot: &LedgerSnapshot) -> Self {
        let limits = evaluate_limits(cart, &snapshot.household, &rules.limits)
            .into_iter()
            .map(|violation| ValidationIssue::new(IssueKind::Limit, violation.message()))
            .collect();
        let ledger = BalanceLedger::with_voucher_multiplier_override(rules.voucher_multiplier_override());
        let (reservation, budget) = match ledger.check_and_reserve(snapshot, cart) {
            Ok(token) => (Some(token), Vec::new()),
            Err(violations) => (
                None,
                violations
                    .iter()
                    .map(|violation| ValidationIssue::new(IssueKind::Budget, violation.message()))
                    .collect(),
            ),
        };
        Self {
            availability: availability_issues(cart),
            limits,
            budget,
            reservation,
        }
    }

    fn errors(&self) -> Vec<ValidationIssue> {
        self.availability
            .iter()
            .chain(&self.limits)
            .chain(&self.budget)
            .cloned()
            .collect()
    }

    /// The reservation when the cart is clean, otherwise the rejection named
    /// after the first failing category and carrying every issue found.
    fn into_reservation(self) -> Result<ReservationToken, SubmissionError> {
        let Self {
            availability,
            limits,
            budget,
            reservation,
        } = self;
        let availability_failed = !availability.is_empty();
        let limits_failed = !limits.is_empty();
        let issues: Vec<ValidationIssue> = availability.into_iter().chain(limits).chain(budget).collect();
        match reservation {
            Some(token) if issues.is_empty() => Ok(token),
            _ if availability_failed => Err(SubmissionError::AvailabilityViolation { issues }),
            _ if limits_failed => Err(SubmissionError::LimitViolation { issues }),
            _ => Err(SubmissionError::BudgetViolation { issues }),
        }
    }
}

fn availability_issues(cart: &Cart) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if cart.lines().iter().all(|line| line.quantity == 0) {
        issues.push(ValidationIssue::new(IssueKind::Availability, "Your cart is empty"));
    }
    for line in cart.lines() {
        let product = &line.product;
        if line.quantity < 0 {
            issues.push(ValidationIssue::for_product(
                IssueKind::Availability,
                format!("{}: quantity cannot be negative", product.name),
                product.id,
            ));
        } else if line.quantity > 0 && !product.available {
            issues.push(ValidationIssue::for_product(
                IssueKind::Availability,
                format!("{} is no longer available", product.name),
                product.id,
            ));
        }
    }
    issues
}

fn map_rules_error(err: RuleConfigRepositoryError) -> SubmissionError {
    SubmissionError::PersistenceFailure {
        message: err.to_string(),
    }
}

fn map_ledger_error(err: LedgerRepositoryError) -> SubmissionError {
    match err {
        LedgerRepositoryError::AccountNotFound { account_id } => {
            SubmissionError::UnknownAccount { account_id }
        }
        other => SubmissionError::PersistenceFailure {
            message: other.to_string(),
        },
    }
}

fn query_error(err: SubmissionError) -> Error {
    match err {
        SubmissionError::PersistenceFailure { message } => {
            Error::service_unavailable(format!("order data unavailable: {message}"))
        }
        other => Error::from(other),
    }
}

impl SubmissionCoordinator {
    /// Build a coordinator.
    pub fn new(deps: SubmissionDependencies) -> Self {
        let SubmissionDependencies {
            ledger,
            rules,
            guard,
            throttle,
            recorder,
            clock,
        } = deps;
        Self {
            ledger,
            rules,
            guard,
            throttle,
            recorder,
            clock,
        }
    }

    /// Check a cart without taking locks, consuming throttle budget, or
    /// mutating anything.
    pub async fn validate(&self, request: ValidateCartRequest) -> Result<CartValidationReport, Error> {
        let rules = self
            .rules
            .load_rules()
            .await
            .map_err(|err| query_error(map_rules_error(err)))?;
        let snapshot = self
            .ledger
            .load_snapshot(&request.account_id)
            .await
            .map_err(|err| query_error(map_ledger_error(err)))?;

        let assessment = Assessment::run(&request.cart, &rules, &snapshot);
        let mut warnings = Vec::new();
        if let Some(token) = &assessment.reservation
            && token.uses_vouchers()
        {
            warnings.push(ValidationIssue::new(
                IssueKind::Budget,
                format!(
                    "{} in vouchers will be used to cover this order",
                    token.voucher_portion
                ),
            ));
        }
        if rules.is_newer_than(request.client.rule_version) {
            warnings.push(ValidationIssue::new(
                IssueKind::System,
                "Purchase rules changed since your cart was last checked",
            ));
        }
        let errors = assessment.errors();
        Ok(CartValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        })
    }

    /// Run the full pipeline for one submission.
    pub async fn submit(&self, request: SubmitOrderRequest) -> Result<OrderReceipt, SubmissionError> {
        let mut trace = StageTrace::new(&request.account_id);
        let mut attempt = AttemptContext::default();
        let result = self.run(&request, &mut trace, &mut attempt).await;

        match &result {
            Ok(receipt) => {
                self.throttle.record_success(&request.account_id);
                info!(
                    account_id = %request.account_id,
                    order_id = %receipt.order_id,
                    total = %receipt.totals.total,
                    degraded = receipt.degraded,
                    "order committed"
                );
            }
            Err(err) => {
                trace.advance(err.stage());
                if err.counts_as_strike() {
                    self.throttle.record_failure(&request.account_id);
                }
                if let Some(kind) = err.failure_kind() {
                    self.recorder
                        .record(failure_context(&request, kind, err, attempt))
                        .await;
                }
            }
        }
        result
    }

    async fn run(
        &self,
        request: &SubmitOrderRequest,
        trace: &mut StageTrace<'_>,
        attempt: &mut AttemptContext,
    ) -> Result<OrderReceipt, SubmissionError> {
        if let ThrottleDecision::Rejected {
            reason,
            retry_after,
        } = self.throttle.check(&request.account_id)
        {
            return Err(SubmissionError::RateLimited {
                reason,
                retry_after,
            });
        }
        trace.advance(SubmissionStage::Admitted);

        let mut session = self
            .guard
            .enter(&request.account_id)
            .await
            .map_err(|GuardError::LockTimeout { retry_after }| SubmissionError::LockTimeout {
                retry_after,
            })?;
        trace.advance(SubmissionStage::LockAcquired);

        let outcome = self.run_guarded(request, &mut session, trace, attempt).await;
        if outcome.is_ok() {
            session.keep_claim();
        }
        self.guard.exit(session).await;
        outcome
    }

    async fn run_guarded(
        &self,
        request: &SubmitOrderRequest,
        session: &mut GuardSession,
        trace: &mut StageTrace<'_>,
        attempt: &mut AttemptContext,
    ) -> Result<OrderReceipt, SubmissionError> {
        let now = self.clock.utc();
        let fingerprint = submission_fingerprint(&request.account_id, &request.cart, now).map_err(
            |err| SubmissionError::PersistenceFailure {
                message: err.to_string(),
            },
        )?;
        attempt.fingerprint = Some(fingerprint);
        if self.guard.claim(session, &fingerprint).await == ClaimOutcome::Duplicate {
            return Err(SubmissionError::DuplicateSubmission);
        }

        let rules = self.rules.load_rules().await.map_err(map_rules_error)?;
        let mut retried_stale = false;
        loop {
            let snapshot = self
                .ledger
                .load_snapshot(&request.account_id)
                .await
                .map_err(map_ledger_error)?;
            attempt.balance = Some(BalanceSnapshot::capture(
                &snapshot,
                rules.voucher_multiplier_override(),
            ));

            let reservation = Assessment::run(&request.cart, &rules, &snapshot).into_reservation()?;
            trace.advance(SubmissionStage::Validated);
            trace.advance(SubmissionStage::Reserved);

            let order = Order {
                id: OrderId::random(),
                account_id: request.account_id.clone(),
                lines: Order::lines_from_cart(&request.cart),
                total: reservation.cart_total,
                budget_portion: reservation.budget_portion,
                voucher_portion: reservation.voucher_portion,
                consumed_vouchers: reservation.vouchers.clone(),
                fingerprint: fingerprint.to_hex(),
                created_at: now,
            };
            let commit = CommitRequest {
                reservation: reservation.clone(),
                order,
            };
            match self.ledger.commit_order(commit).await {
                Ok(order) => {
                    trace.advance(SubmissionStage::Committed);
                    return Ok(receipt(order, &reservation, session.is_degraded()));
                }
                Err(
                    err @ (LedgerRepositoryError::StaleBalance { .. }
                    | LedgerRepositoryError::VoucherUnavailable { .. }),
                ) if !retried_stale => {
                    warn!(
                        account_id = %request.account_id,
                        error = %err,
                        "ledger changed during submission; re-validating once"
                    );
                    BalanceLedger::new().release(reservation);
                    trace.advance(SubmissionStage::RolledBack);
                    retried_stale = true;
                }
                Err(err) => {
                    BalanceLedger::new().release(reservation);
                    trace.advance(SubmissionStage::RolledBack);
                    return Err(SubmissionError::PersistenceFailure {
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

fn receipt(order: Order, reservation: &ReservationToken, degraded: bool) -> OrderReceipt {
    OrderReceipt {
        order_id: order.id,
        totals: OrderTotals {
            total: order.total,
            budget_portion: order.budget_portion,
            voucher_portion: order.voucher_portion,
            forfeited_voucher_value: reservation.forfeited,
            consumed_vouchers: order.consumed_vouchers,
        },
        degraded,
        created_at: order.created_at,
    }
}

fn failure_context(
    request: &SubmitOrderRequest,
    kind: FailureKind,
    err: &SubmissionError,
    attempt: AttemptContext,
) -> FailureContext {
    let issues = err.issues();
    let messages = if issues.is_empty() {
        vec![err.to_string()]
    } else {
        issues.iter().map(|issue| issue.message.clone()).collect()
    };
    FailureContext {
        account_id: request.account_id.clone(),
        cart: request.cart.clone(),
        totals: ComputedTotals {
            cart_total: request.cart.total(),
            bucket_totals: request.cart.bucket_totals(),
        },
        balance: attempt.balance,
        fingerprint: attempt.fingerprint,
        kind,
        messages,
        client: request.client.clone(),
    }
}

#[async_trait]
impl SubmissionService for SubmissionCoordinator {
    async fn validate_cart(
        &self,
        request: ValidateCartRequest,
    ) -> Result<CartValidationReport, Error> {
        self.validate(request).await
    }

    async fn submit_order(&self, request: SubmitOrderRequest) -> Result<OrderReceipt, SubmissionError> {
        self.submit(request).await
    }

    async fn rule_version(&self) -> Result<RuleVersion, Error> {
        self.rules
            .current_version()
            .await
            .map_err(|err| query_error(map_rules_error(err)))
    }
}
