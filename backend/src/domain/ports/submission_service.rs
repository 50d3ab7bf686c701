//! Driving port for cart validation and order submission.
//!
//! Inbound adapters call this port with a cart whose product attributes were
//! resolved upstream. Validation never mutates anything; submission runs the
//! full throttle, guard, validate, reserve, commit pipeline.

use async_trait::async_trait;

use crate::domain::{
    CartValidationReport, Error, OrderReceipt, RuleVersion, SubmissionError, SubmitOrderRequest,
    ValidateCartRequest,
};

/// Domain use-case port for order submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubmissionService: Send + Sync {
    /// Check a cart against current rules and balances without side effects.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown accounts and `ServiceUnavailable` when
    /// rules or balances cannot be read.
    async fn validate_cart(&self, request: ValidateCartRequest)
    -> Result<CartValidationReport, Error>;

    /// Validate and atomically commit an order.
    ///
    /// # Errors
    ///
    /// Returns the [`SubmissionError`] rejection terminal the submission
    /// reached.
    async fn submit_order(&self, request: SubmitOrderRequest)
    -> Result<OrderReceipt, SubmissionError>;

    /// Current rule version for client cache invalidation.
    ///
    /// # Errors
    ///
    /// Returns `ServiceUnavailable` when the rule store cannot be read.
    async fn rule_version(&self) -> Result<RuleVersion, Error>;
}
