//! Best-effort failure recording.

use std::sync::Arc;

use mockable::Clock;
use tracing::{info, warn};

use super::{BalanceSnapshot, ClientMeta, ComputedTotals, FailedAttemptId, FailedOrderAttempt, FailureKind};
use crate::domain::ports::FailedAttemptRepository;
use crate::domain::{AccountId, Cart, SubmissionFingerprint, TraceId, cart_hash};

/// Everything known about a failed submission at the point of failure.
#[derive(Debug, Clone)]
pub struct FailureContext {
    pub account_id: AccountId,
    pub cart: Cart,
    pub totals: ComputedTotals,
    pub balance: Option<BalanceSnapshot>,
    pub fingerprint: Option<SubmissionFingerprint>,
    pub kind: FailureKind,
    pub messages: Vec<String>,
    pub client: ClientMeta,
}

/// Persists one immutable audit record per failed attempt.
///
/// Recording never fails the caller: storage errors are logged and dropped.
#[derive(Clone)]
pub struct FailureRecorder {
    repository: Arc<dyn FailedAttemptRepository>,
    clock: Arc<dyn Clock>,
}

impl FailureRecorder {
    /// Build a recorder over `repository`.
    pub fn new(repository: Arc<dyn FailedAttemptRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Record a failed attempt, swallowing any storage error.
    pub async fn record(&self, context: FailureContext) {
        let attempt = self.build(context);
        match self.repository.insert(&attempt).await {
            Ok(()) => info!(
                account_id = %attempt.account_id,
                attempt_id = %attempt.id,
                kind = %attempt.kind,
                "failed order attempt recorded"
            ),
            Err(err) => warn!(
                account_id = %attempt.account_id,
                kind = %attempt.kind,
                error = %err,
                "failed to record failed order attempt"
            ),
        }
    }

    fn build(&self, context: FailureContext) -> FailedOrderAttempt {
        let FailureContext {
            account_id,
            cart,
            totals,
            balance,
            fingerprint,
            kind,
            messages,
            client,
        } = context;
        let cart_json = serde_json::to_value(&cart).unwrap_or_else(|err| {
            warn!(error = %err, "cart snapshot could not be serialised");
            serde_json::Value::Null
        });
        let hash = cart_hash(&account_id, &cart).map_or_else(
            |err| {
                warn!(error = %err, "cart hash could not be computed");
                String::new()
            },
            |hash| hash.to_hex(),
        );
        FailedOrderAttempt {
            id: FailedAttemptId::random(),
            account_id,
            trace_id: TraceId::current().map(|id| id.to_string()),
            kind,
            messages,
            cart: cart_json,
            totals,
            balance,
            fingerprint: fingerprint.map(|value| value.to_hex()),
            cart_hash: hash,
            client,
            created_at: self.clock.utc(),
        }
    }
}
