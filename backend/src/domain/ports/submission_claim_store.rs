//! Port for short-lived submission fingerprint claims.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ClaimOutcome, SubmissionFingerprint};

use super::define_port_error;

define_port_error! {
    /// Errors raised by claim stores.
    pub enum SubmissionClaimError {
        /// The claim backend cannot be reached.
        Unavailable { message: String } => "submission claim store unavailable: {message}",
    }
}

/// Port recording which fingerprints were already submitted.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionClaimStore: Send + Sync {
    /// Claim `fingerprint` for `window`. The first caller gets
    /// [`ClaimOutcome::Fresh`]; later callers inside the window get
    /// [`ClaimOutcome::Duplicate`].
    async fn claim(
        &self,
        fingerprint: &SubmissionFingerprint,
        window: Duration,
    ) -> Result<ClaimOutcome, SubmissionClaimError>;

    /// Drop a claim so the same cart may be retried, used when the submission
    /// failed for reasons the participant cannot fix.
    async fn forget(&self, fingerprint: &SubmissionFingerprint) -> Result<(), SubmissionClaimError>;
}
