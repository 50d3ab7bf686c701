//! Redis lease locks.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, Script};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::{RedisPool, lock_key, millis, redis_message};
use crate::domain::ports::{AccountLockError, AccountLockService, LockAcquisition};
use crate::domain::{AccountId, AccountLockLease};

const POLL_INTERVAL_MS: u64 = 50;
const POLL_JITTER_MS: u64 = 25;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Account locks stored as expiring Redis keys.
#[derive(Clone)]
pub struct RedisAccountLockService {
    pool: RedisPool,
}

impl RedisAccountLockService {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease_ttl: Duration,
    ) -> Result<bool, AccountLockError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| AccountLockError::unavailable(err.to_string()))?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(millis(lease_ttl))
            .query_async(&mut *conn)
            .await
            .map_err(|err| AccountLockError::unavailable(redis_message(&err)))?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl AccountLockService for RedisAccountLockService {
    async fn acquire(
        &self,
        account_id: &AccountId,
        lease_ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<LockAcquisition, AccountLockError> {
        let key = lock_key(account_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait_timeout;
        let mut rng = SmallRng::from_entropy();
        loop {
            if self.try_acquire(&key, &token, lease_ttl).await? {
                debug!(%account_id, "redis account lock acquired");
                return Ok(LockAcquisition::Acquired(AccountLockLease {
                    account_id: account_id.clone(),
                    token,
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(LockAcquisition::TimedOut);
            }
            let nap = Duration::from_millis(POLL_INTERVAL_MS + rng.gen_range(0..=POLL_JITTER_MS));
            tokio::time::sleep(nap.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: &AccountLockLease) -> Result<(), AccountLockError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| AccountLockError::unavailable(err.to_string()))?;
        let removed: i64 = Script::new(RELEASE_SCRIPT)
            .key(lock_key(&lease.account_id))
            .arg(&lease.token)
            .invoke_async(&mut *conn)
            .await
            .map_err(|err| AccountLockError::unavailable(redis_message(&err)))?;
        if removed == 0 {
            debug!(account_id = %lease.account_id, "lease already expired or taken over");
        }
        Ok(())
    }
}
