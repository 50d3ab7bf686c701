//! Idempotency and per-account lock guard.
//!
//! Every mutating submission enters the guard before any validation or ledger
//! work:
//!
//! 1. [`SubmissionGuard::enter`] acquires the per-account lease, waiting at
//!    most the configured timeout. Timing out surfaces as
//!    [`GuardError::LockTimeout`], never as a silent pass-through.
//! 2. [`SubmissionGuard::claim`] records the submission fingerprint; a repeat
//!    inside the dedup window yields [`ClaimOutcome::Duplicate`].
//! 3. [`SubmissionGuard::exit`] drops an uncommitted claim and releases the
//!    lease. A [`GuardSession`] dropped without an exit (the request future
//!    was cancelled, or the task panicked) hands the same cleanup to the
//!    runtime, so neither the lock nor the claim outlives the request.
//!
//! When the lock or claim backend is unavailable (declared up front through
//! `lock_service_available`, or discovered at runtime) the session runs in
//! [`GuardMode::Degraded`]: no lock and no dedup. Degradation is logged at
//! warn level and reported on the session so callers can surface it.

mod fingerprint;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AccountId;
use super::ports::{AccountLockService, LockAcquisition, SubmissionClaimStore};

pub use self::fingerprint::{
    FingerprintError, SubmissionFingerprint, cart_hash, submission_fingerprint,
};

/// Lease on one account's exclusive lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLockLease {
    pub account_id: AccountId,
    /// Owner token; only the holder of this token can release the lock.
    pub token: String,
}

/// Result of claiming a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Fresh,
    Duplicate,
}

/// Whether concurrency guarantees hold for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    Guaranteed,
    Degraded,
}

/// Errors that stop a submission at the guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("another submission for this account is in progress")]
    LockTimeout { retry_after: Duration },
}

/// State held between [`SubmissionGuard::enter`] and [`SubmissionGuard::exit`].
///
/// Owns the lease and any claim not yet kept by a committed order; dropping
/// the session releases both in the background.
pub struct GuardSession {
    account_id: AccountId,
    mode: GuardMode,
    lease: Option<AccountLockLease>,
    pending_claim: Option<SubmissionFingerprint>,
    locks: Arc<dyn AccountLockService>,
    claims: Arc<dyn SubmissionClaimStore>,
}

impl std::fmt::Debug for GuardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardSession")
            .field("account_id", &self.account_id)
            .field("mode", &self.mode)
            .field("lease", &self.lease)
            .field("pending_claim", &self.pending_claim)
            .finish_non_exhaustive()
    }
}

impl GuardSession {
    /// Account the session guards.
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// Current mode.
    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Whether the session lost its guarantees.
    pub fn is_degraded(&self) -> bool {
        self.mode == GuardMode::Degraded
    }

    /// Lease held by the session, if any.
    pub fn lease(&self) -> Option<&AccountLockLease> {
        self.lease.as_ref()
    }

    /// Claim that will be dropped when the session ends, if any.
    pub fn pending_claim(&self) -> Option<&SubmissionFingerprint> {
        self.pending_claim.as_ref()
    }

    /// Keep the fingerprint claimed for the rest of the dedup window.
    ///
    /// Called once the order is committed; until then the claim is released
    /// with the session.
    pub fn keep_claim(&mut self) {
        self.pending_claim = None;
    }

    fn cleanup(&mut self) -> Option<SessionCleanup> {
        let pending_claim = self.pending_claim.take();
        let lease = self.lease.take();
        if pending_claim.is_none() && lease.is_none() {
            return None;
        }
        Some(SessionCleanup {
            account_id: self.account_id.clone(),
            pending_claim,
            lease,
            locks: Arc::clone(&self.locks),
            claims: Arc::clone(&self.claims),
        })
    }

    fn degrade(&mut self, reason: &str) {
        if self.mode == GuardMode::Guaranteed {
            warn!(
                account_id = %self.account_id,
                degraded = true,
                reason,
                "submission guard degraded; proceeding without lock or dedup"
            );
        }
        self.mode = GuardMode::Degraded;
    }
}

impl Drop for GuardSession {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    account_id = %cleanup.account_id,
                    "guard session dropped before exit; releasing lock and claim"
                );
                drop(handle.spawn(cleanup.run()));
            }
            Err(_) => warn!(
                account_id = %cleanup.account_id,
                "guard session dropped outside a runtime; lock and claim will expire"
            ),
        }
    }
}

/// Lease and claim taken out of a finished session.
struct SessionCleanup {
    account_id: AccountId,
    pending_claim: Option<SubmissionFingerprint>,
    lease: Option<AccountLockLease>,
    locks: Arc<dyn AccountLockService>,
    claims: Arc<dyn SubmissionClaimStore>,
}

impl SessionCleanup {
    async fn run(self) {
        if let Some(fingerprint) = self.pending_claim
            && let Err(err) = self.claims.forget(&fingerprint).await
        {
            warn!(account_id = %self.account_id, error = %err, "failed to drop submission claim");
        }
        let Some(lease) = self.lease else {
            return;
        };
        match self.locks.release(&lease).await {
            Ok(()) => debug!(account_id = %lease.account_id, "account lock released"),
            Err(err) => warn!(
                account_id = %lease.account_id,
                error = %err,
                "failed to release account lock; lease will expire"
            ),
        }
    }
}

/// Lock and dedup guard around the submission critical section.
#[derive(Clone)]
pub struct SubmissionGuard {
    locks: Arc<dyn AccountLockService>,
    claims: Arc<dyn SubmissionClaimStore>,
    lock_service_available: bool,
    dedup_window: Duration,
    lock_wait_timeout: Duration,
    lock_lease_ttl: Duration,
}

impl SubmissionGuard {
    /// Build a guard over the given lock and claim backends.
    pub fn new(
        locks: Arc<dyn AccountLockService>,
        claims: Arc<dyn SubmissionClaimStore>,
        config: &super::SubmissionConfig,
    ) -> Self {
        Self {
            locks,
            claims,
            lock_service_available: true,
            dedup_window: config.dedup_window,
            lock_wait_timeout: config.lock_wait_timeout,
            lock_lease_ttl: config.lock_lease_ttl,
        }
    }

    /// Declare whether the lock/claim backend is known to be reachable.
    ///
    /// `false` forces every session into degraded mode without touching the
    /// backend.
    #[must_use]
    pub fn with_lock_service_available(mut self, available: bool) -> Self {
        self.lock_service_available = available;
        self
    }

    /// Whether the backend is declared reachable.
    pub fn lock_service_available(&self) -> bool {
        self.lock_service_available
    }

    /// Acquire the account lock and open a session.
    pub async fn enter(&self, account_id: &AccountId) -> Result<GuardSession, GuardError> {
        let mut session = GuardSession {
            account_id: account_id.clone(),
            mode: GuardMode::Guaranteed,
            lease: None,
            pending_claim: None,
            locks: Arc::clone(&self.locks),
            claims: Arc::clone(&self.claims),
        };
        if !self.lock_service_available {
            session.degrade("lock service declared unavailable");
            return Ok(session);
        }

        match self
            .locks
            .acquire(account_id, self.lock_lease_ttl, self.lock_wait_timeout)
            .await
        {
            Ok(LockAcquisition::Acquired(lease)) => {
                debug!(%account_id, "account lock acquired");
                session.lease = Some(lease);
                Ok(session)
            }
            Ok(LockAcquisition::TimedOut) => {
                debug!(%account_id, "account lock wait timed out");
                Err(GuardError::LockTimeout {
                    retry_after: self.lock_wait_timeout,
                })
            }
            Err(err) => {
                session.degrade(&err.to_string());
                Ok(session)
            }
        }
    }

    /// Claim the fingerprint for the dedup window.
    ///
    /// A fresh claim stays pending until [`GuardSession::keep_claim`]; the
    /// session drops it otherwise. Degraded sessions never dedup and always
    /// report [`ClaimOutcome::Fresh`].
    pub async fn claim(
        &self,
        session: &mut GuardSession,
        fingerprint: &SubmissionFingerprint,
    ) -> ClaimOutcome {
        if session.is_degraded() {
            return ClaimOutcome::Fresh;
        }
        match self.claims.claim(fingerprint, self.dedup_window).await {
            Ok(ClaimOutcome::Fresh) => {
                session.pending_claim = Some(*fingerprint);
                ClaimOutcome::Fresh
            }
            Ok(ClaimOutcome::Duplicate) => ClaimOutcome::Duplicate,
            Err(err) => {
                session.degrade(&err.to_string());
                ClaimOutcome::Fresh
            }
        }
    }

    /// Close the session: drop a claim that was not kept, then release the
    /// lease.
    pub async fn exit(&self, mut session: GuardSession) {
        if let Some(cleanup) = session.cleanup() {
            cleanup.run().await;
        }
    }
}
