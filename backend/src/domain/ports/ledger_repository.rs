//! Port for reading and atomically mutating an account's ledger.
//!
//! Balance and voucher rows change only through [`LedgerRepository::commit_order`],
//! which applies a [`ReservationToken`] and persists the [`Order`] as one atomic
//! unit. The commit re-checks the `balance_version` the reservation was computed
//! against so a stale plan can never be written, even when the account lock was
//! skipped in degraded mode.

use async_trait::async_trait;

use crate::domain::{AccountId, LedgerSnapshot, Order, ReservationToken};

use super::define_port_error;

define_port_error! {
    /// Errors raised by ledger repositories.
    pub enum LedgerRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "ledger repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "ledger repository query failed: {message}",
        /// The account has no ledger.
        AccountNotFound { account_id: String } => "account {account_id} has no ledger",
        /// The balance changed since the reservation was computed.
        StaleBalance { expected: i64, actual: i64 } => "balance version moved from {expected} to {actual}",
        /// A reserved voucher is no longer applied.
        VoucherUnavailable { voucher_id: String } => "voucher {voucher_id} is no longer applied",
    }
}

/// Order and reservation committed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub reservation: ReservationToken,
    pub order: Order,
}

/// Port for ledger persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Read the balance, vouchers, household and balance version of an account.
    async fn load_snapshot(&self, account_id: &AccountId)
    -> Result<LedgerSnapshot, LedgerRepositoryError>;

    /// Apply the reservation and persist the order atomically.
    ///
    /// Nothing is written when any part fails.
    async fn commit_order(&self, request: CommitRequest) -> Result<Order, LedgerRepositoryError>;
}
