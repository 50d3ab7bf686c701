//! Mutex-guarded ledger store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ports::{CommitRequest, LedgerRepository, LedgerRepositoryError};
use crate::domain::{AccountId, LedgerApplyError, LedgerSnapshot, Order, VoucherTransitionError};

#[derive(Default)]
struct LedgerState {
    ledgers: HashMap<AccountId, LedgerSnapshot>,
    orders: Vec<Order>,
}

/// Ledger repository holding snapshots and committed orders in memory.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerRepository {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `snapshots`.
    pub fn with_ledgers(snapshots: impl IntoIterator<Item = LedgerSnapshot>) -> Self {
        let repo = Self::new();
        for snapshot in snapshots {
            repo.upsert(snapshot);
        }
        repo
    }

    /// Insert or replace an account's ledger.
    pub fn upsert(&self, snapshot: LedgerSnapshot) {
        self.lock_state()
            .ledgers
            .insert(snapshot.account_id.clone(), snapshot);
    }

    /// Current ledger of `account_id`.
    pub fn ledger(&self, account_id: &AccountId) -> Option<LedgerSnapshot> {
        self.lock_state().ledgers.get(account_id).cloned()
    }

    /// Orders committed for `account_id`, oldest first.
    pub fn orders_for(&self, account_id: &AccountId) -> Vec<Order> {
        self.lock_state()
            .orders
            .iter()
            .filter(|order| &order.account_id == account_id)
            .cloned()
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn map_apply_error(err: LedgerApplyError) -> LedgerRepositoryError {
    match err {
        LedgerApplyError::StaleBalance { expected, actual } => {
            LedgerRepositoryError::stale_balance(expected, actual)
        }
        LedgerApplyError::MissingVoucher(id)
        | LedgerApplyError::Voucher(VoucherTransitionError::Illegal { id, .. }) => {
            LedgerRepositoryError::voucher_unavailable(id.to_string())
        }
        LedgerApplyError::Voucher(other) => LedgerRepositoryError::query(other.to_string()),
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn load_snapshot(
        &self,
        account_id: &AccountId,
    ) -> Result<LedgerSnapshot, LedgerRepositoryError> {
        self.ledger(account_id)
            .ok_or_else(|| LedgerRepositoryError::account_not_found(account_id.to_string()))
    }

    async fn commit_order(&self, request: CommitRequest) -> Result<Order, LedgerRepositoryError> {
        let CommitRequest { reservation, order } = request;
        let mut state = self.lock_state();
        let snapshot = state
            .ledgers
            .get_mut(&reservation.account_id)
            .ok_or_else(|| {
                LedgerRepositoryError::account_not_found(reservation.account_id.to_string())
            })?;
        snapshot.apply(&reservation).map_err(map_apply_error)?;
        debug!(
            account_id = %reservation.account_id,
            balance_version = snapshot.balance_version,
            "in-memory ledger committed order"
        );
        state.orders.push(order.clone());
        Ok(order)
    }
}
