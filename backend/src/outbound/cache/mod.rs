//! Redis-backed account locks and submission claims.
//!
//! Both adapters share one `bb8` pool of multiplexed connections:
//!
//! - [`RedisAccountLockService`] stores a random owner token under
//!   `pantry:lock:<account>` with `SET NX PX`, polling with jitter until the
//!   wait timeout. Release runs a compare-and-delete script so an expired
//!   holder can never drop a lease taken over by someone else.
//! - [`RedisSubmissionClaimStore`] records `pantry:claim:<fingerprint>` with
//!   `SET NX EX`; the key's TTL is the dedup window.
//!
//! Every Redis or pool failure maps to the port's `Unavailable` error, which
//! the guard turns into degraded mode.

mod claims;
mod lock;

use std::time::Duration;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection, RunError};
use bb8_redis::redis::RedisError;

pub use self::claims::RedisSubmissionClaimStore;
pub use self::lock::RedisAccountLockService;

const KEY_PREFIX: &str = "pantry";

/// Errors raised while building or using the Redis pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedisPoolError {
    #[error("invalid redis url: {message}")]
    Url { message: String },
    #[error("failed to get redis connection: {message}")]
    Checkout { message: String },
}

/// Shared pool of Redis connections.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Pool for `url` keeping at most `max_size` connections.
    ///
    /// Connections are opened on first use, so a Redis outage at startup only
    /// degrades the submissions that run while it lasts. Only a malformed URL
    /// fails here.
    pub fn lazy(
        url: &str,
        max_size: u32,
        connection_timeout: Duration,
    ) -> Result<Self, RedisPoolError> {
        let manager = RedisConnectionManager::new(url).map_err(|err| RedisPoolError::Url {
            message: err.to_string(),
        })?;
        let inner = Pool::builder()
            .max_size(max_size)
            .connection_timeout(connection_timeout)
            .build_unchecked(manager);
        Ok(Self { inner })
    }

    pub(crate) async fn get(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, RedisPoolError> {
        self.inner.get().await.map_err(|err| match err {
            RunError::User(err) => RedisPoolError::Checkout {
                message: err.to_string(),
            },
            RunError::TimedOut => RedisPoolError::Checkout {
                message: "timed out".to_owned(),
            },
        })
    }
}

fn lock_key(account_id: &crate::domain::AccountId) -> String {
    format!("{KEY_PREFIX}:lock:{account_id}")
}

fn claim_key(fingerprint: &crate::domain::SubmissionFingerprint) -> String {
    format!("{KEY_PREFIX}:claim:{}", fingerprint.to_hex())
}

/// Whole milliseconds, at least one.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Whole seconds rounded up, at least one.
fn seconds(duration: Duration) -> u64 {
    crate::domain::retry_after_secs(duration)
}

fn redis_message(err: &RedisError) -> String {
    format!("redis command failed: {err}")
}
