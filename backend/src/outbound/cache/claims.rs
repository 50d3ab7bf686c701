//! Redis submission claims.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis;

use super::{RedisPool, claim_key, redis_message, seconds};
use crate::domain::ports::{SubmissionClaimError, SubmissionClaimStore};
use crate::domain::{ClaimOutcome, SubmissionFingerprint};

/// Fingerprint claims stored as keys expiring with the dedup window.
#[derive(Clone)]
pub struct RedisSubmissionClaimStore {
    pool: RedisPool,
}

impl RedisSubmissionClaimStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionClaimStore for RedisSubmissionClaimStore {
    async fn claim(
        &self,
        fingerprint: &SubmissionFingerprint,
        window: Duration,
    ) -> Result<ClaimOutcome, SubmissionClaimError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| SubmissionClaimError::unavailable(err.to_string()))?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(claim_key(fingerprint))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(seconds(window))
            .query_async(&mut *conn)
            .await
            .map_err(|err| SubmissionClaimError::unavailable(redis_message(&err)))?;
        Ok(if reply.is_some() {
            ClaimOutcome::Fresh
        } else {
            ClaimOutcome::Duplicate
        })
    }

    async fn forget(&self, fingerprint: &SubmissionFingerprint) -> Result<(), SubmissionClaimError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| SubmissionClaimError::unavailable(err.to_string()))?;
        let _removed: i64 = redis::cmd("DEL")
            .arg(claim_key(fingerprint))
            .query_async(&mut *conn)
            .await
            .map_err(|err| SubmissionClaimError::unavailable(redis_message(&err)))?;
        Ok(())
    }
}
