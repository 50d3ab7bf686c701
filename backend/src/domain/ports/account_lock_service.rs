//! Port for per-account exclusive locks.
//!
//! Locks are leases: they carry an owner token and expire after a TTL so a
//! crashed holder cannot wedge an account. Acquisition waits at most the given
//! timeout.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{AccountId, AccountLockLease};

use super::define_port_error;

define_port_error! {
    /// Errors raised by lock services.
    pub enum AccountLockError {
        /// The lock backend cannot be reached.
        Unavailable { message: String } => "account lock service unavailable: {message}",
    }
}

/// Result of a bounded lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The caller now holds the lease.
    Acquired(AccountLockLease),
    /// Another holder kept the lock for the whole wait.
    TimedOut,
}

/// Port for distributed per-account locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountLockService: Send + Sync {
    /// Try to acquire the account lock, waiting at most `wait_timeout`.
    async fn acquire(
        &self,
        account_id: &AccountId,
        lease_ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<LockAcquisition, AccountLockError>;

    /// Release a lease. Releasing an expired or foreign lease is a no-op.
    async fn release(&self, lease: &AccountLockLease) -> Result<(), AccountLockError>;
}
