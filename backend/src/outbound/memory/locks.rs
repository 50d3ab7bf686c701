//! Process-local account leases and submission claims.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::ports::{
    AccountLockError, AccountLockService, LockAcquisition, SubmissionClaimError,
    SubmissionClaimStore,
};
use crate::domain::{AccountId, AccountLockLease, ClaimOutcome, SubmissionFingerprint};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

struct HeldLease {
    token: String,
    expires_at: Instant,
}

/// Lease-based account locks for a single process.
pub struct InMemoryAccountLockService {
    held: Mutex<HashMap<AccountId, HeldLease>>,
    available: AtomicBool,
}

impl Default for InMemoryAccountLockService {
    fn default() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryAccountLockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether `account_id` is currently locked.
    pub fn is_locked(&self, account_id: &AccountId) -> bool {
        self.lock_held()
            .get(account_id)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }

    fn try_acquire(&self, account_id: &AccountId, lease_ttl: Duration) -> Option<AccountLockLease> {
        let now = Instant::now();
        let mut held = self.lock_held();
        if held
            .get(account_id)
            .is_some_and(|lease| lease.expires_at > now)
        {
            return None;
        }
        let token = Uuid::new_v4().to_string();
        held.insert(
            account_id.clone(),
            HeldLease {
                token: token.clone(),
                expires_at: now + lease_ttl,
            },
        );
        Some(AccountLockLease {
            account_id: account_id.clone(),
            token,
        })
    }

    fn ensure_available(&self) -> Result<(), AccountLockError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AccountLockError::unavailable("in-memory lock service disabled"))
        }
    }

    fn lock_held(&self) -> MutexGuard<'_, HashMap<AccountId, HeldLease>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountLockService for InMemoryAccountLockService {
    async fn acquire(
        &self,
        account_id: &AccountId,
        lease_ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<LockAcquisition, AccountLockError> {
        self.ensure_available()?;
        let deadline = Instant::now() + wait_timeout;
        loop {
            if let Some(lease) = self.try_acquire(account_id, lease_ttl) {
                return Ok(LockAcquisition::Acquired(lease));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(LockAcquisition::TimedOut);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: &AccountLockLease) -> Result<(), AccountLockError> {
        self.ensure_available()?;
        let mut held = self.lock_held();
        if held
            .get(&lease.account_id)
            .is_some_and(|current| current.token == lease.token)
        {
            held.remove(&lease.account_id);
        }
        Ok(())
    }
}

/// Fingerprint claims expiring after their window.
pub struct InMemorySubmissionClaimStore {
    claims: Mutex<HashMap<SubmissionFingerprint, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
}

impl InMemorySubmissionClaimStore {
    /// Store reading expiry times from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            claims: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock_claims(&self) -> MutexGuard<'_, HashMap<SubmissionFingerprint, DateTime<Utc>>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), SubmissionClaimError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SubmissionClaimError::unavailable("in-memory claim store disabled"))
        }
    }
}

#[async_trait]
impl SubmissionClaimStore for InMemorySubmissionClaimStore {
    async fn claim(
        &self,
        fingerprint: &SubmissionFingerprint,
        window: Duration,
    ) -> Result<ClaimOutcome, SubmissionClaimError> {
        self.ensure_available()?;
        let now = self.clock.utc();
        let mut claims = self.lock_claims();
        claims.retain(|_, expires_at| *expires_at > now);
        if claims.contains_key(fingerprint) {
            return Ok(ClaimOutcome::Duplicate);
        }
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        claims.insert(*fingerprint, now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC));
        Ok(ClaimOutcome::Fresh)
    }

    async fn forget(&self, fingerprint: &SubmissionFingerprint) -> Result<(), SubmissionClaimError> {
        self.ensure_available()?;
        self.lock_claims().remove(fingerprint);
        Ok(())
    }
}
