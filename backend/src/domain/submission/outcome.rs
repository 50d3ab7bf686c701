//! Requests, receipts, validation reports, and the submission error taxonomy.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{
    AccountId, Cart, ClientMeta, Error, FailureKind, Money, OrderId, ThrottleReason, VoucherId,
};

/// Order submission input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOrderRequest {
    pub account_id: AccountId,
    pub cart: Cart,
    pub client: ClientMeta,
}

/// Pre-checkout validation input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateCartRequest {
    pub account_id: AccountId,
    pub cart: Cart,
    pub client: ClientMeta,
}

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Budget,
    Limit,
    Availability,
    System,
}

/// One error or warning reported to the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<Uuid>,
}

impl ValidationIssue {
    /// Issue not tied to a product.
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            product_id: None,
        }
    }

    /// Issue about one product.
    pub fn for_product(kind: IssueKind, message: impl Into<String>, product_id: Uuid) -> Self {
        Self {
            kind,
            message: message.into(),
            product_id: Some(product_id),
        }
    }
}

/// Result of a non-mutating cart check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Money movements of a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub total: Money,
    pub budget_portion: Money,
    pub voucher_portion: Money,
    pub forfeited_voucher_value: Money,
    pub consumed_vouchers: Vec<VoucherId>,
}

/// Successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: OrderId,
    pub totals: OrderTotals,
    /// Whether the order went through without lock or dedup protection.
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// Position of a submission in its lifecycle.
///
/// `Received → Admitted → LockAcquired → Validated → Reserved → Committed`,
/// with `RolledBack` after a failed commit and one rejection terminal per
/// failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Received,
    Admitted,
    LockAcquired,
    Validated,
    Reserved,
    Committed,
    RolledBack,
    Throttled,
    LockTimeout,
    Duplicate,
    AvailabilityViolation,
    LimitViolation,
    BudgetViolation,
    SystemError,
}

impl SubmissionStage {
    /// Stable lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Admitted => "admitted",
            Self::LockAcquired => "lock_acquired",
            Self::Validated => "validated",
            Self::Reserved => "reserved",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Throttled => "throttled",
            Self::LockTimeout => "lock_timeout",
            Self::Duplicate => "duplicate",
            Self::AvailabilityViolation => "availability_violation",
            Self::LimitViolation => "limit_violation",
            Self::BudgetViolation => "budget_violation",
            Self::SystemError => "system_error",
        }
    }

    /// Whether no further transition follows.
    pub const fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::Received
                | Self::Admitted
                | Self::LockAcquired
                | Self::Validated
                | Self::Reserved
                | Self::RolledBack
        )
    }
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("too many order attempts")]
    RateLimited {
        reason: ThrottleReason,
        retry_after: Duration,
    },
    #[error("another submission for this account is in progress")]
    LockTimeout { retry_after: Duration },
    #[error("this order was already submitted")]
    DuplicateSubmission,
    #[error("account {account_id} has no ledger")]
    UnknownAccount { account_id: String },
    #[error("some items are unavailable")]
    AvailabilityViolation { issues: Vec<ValidationIssue> },
    #[error("purchase limits exceeded")]
    LimitViolation { issues: Vec<ValidationIssue> },
    #[error("insufficient budget")]
    BudgetViolation { issues: Vec<ValidationIssue> },
    #[error("order could not be persisted: {message}")]
    PersistenceFailure { message: String },
}

impl SubmissionError {
    /// Rejection terminal reached by this error.
    pub const fn stage(&self) -> SubmissionStage {
        match self {
            Self::RateLimited { .. } => SubmissionStage::Throttled,
            Self::LockTimeout { .. } => SubmissionStage::LockTimeout,
            Self::DuplicateSubmission => SubmissionStage::Duplicate,
            Self::AvailabilityViolation { .. } => SubmissionStage::AvailabilityViolation,
            Self::LimitViolation { .. } => SubmissionStage::LimitViolation,
            Self::BudgetViolation { .. } => SubmissionStage::BudgetViolation,
            Self::UnknownAccount { .. } | Self::PersistenceFailure { .. } => {
                SubmissionStage::SystemError
            }
        }
    }

    /// Audit kind, or `None` when the rejection is not recorded.
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::RateLimited { .. } => Some(FailureKind::RateLimited),
            Self::LockTimeout { .. } => Some(FailureKind::LockTimeout),
            Self::AvailabilityViolation { .. } => Some(FailureKind::Availability),
            Self::LimitViolation { .. } => Some(FailureKind::LimitViolation),
            Self::BudgetViolation { .. } => Some(FailureKind::BudgetViolation),
            Self::PersistenceFailure { .. } => Some(FailureKind::PersistenceFailure),
            Self::DuplicateSubmission | Self::UnknownAccount { .. } => None,
        }
    }

    /// Whether the rejection adds a failure strike to the throttle.
    pub const fn counts_as_strike(&self) -> bool {
        matches!(
            self,
            Self::AvailabilityViolation { .. }
                | Self::LimitViolation { .. }
                | Self::BudgetViolation { .. }
                | Self::PersistenceFailure { .. }
        )
    }

    /// Suggested client wait, for retryable rejections.
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::LockTimeout { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Structured issues carried by user-fixable rejections.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::AvailabilityViolation { issues }
            | Self::LimitViolation { issues }
            | Self::BudgetViolation { issues } => issues,
            _ => &[],
        }
    }
}

/// Whole seconds to wait, rounded up and never zero.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pantry_backend::domain::retry_after_secs;
///
/// assert_eq!(retry_after_secs(Duration::from_millis(7_200)), 8);
/// assert_eq!(retry_after_secs(Duration::ZERO), 1);
/// ```
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// Single `system` entry for rejections without per-line issues.
fn system_errors(message: &str) -> Vec<ValidationIssue> {
    vec![ValidationIssue::new(IssueKind::System, message)]
}

impl From<SubmissionError> for Error {
    fn from(value: SubmissionError) -> Self {
        let reason = value.stage().as_str();
        match value {
            SubmissionError::RateLimited {
                reason: throttle,
                retry_after,
            } => {
                let message = "Too many order attempts; please wait before retrying";
                Self::too_many_requests(message).with_details(json!({
                    "reason": reason,
                    "throttle": throttle,
                    "retryAfter": retry_after_secs(retry_after),
                    "errors": system_errors(message),
                }))
            }
            SubmissionError::LockTimeout { retry_after } => {
                let message = "Another submission for this account is in progress";
                Self::conflict(message).with_details(json!({
                    "reason": reason,
                    "retryAfter": retry_after_secs(retry_after),
                    "errors": system_errors(message),
                }))
            }
            SubmissionError::DuplicateSubmission => {
                let message = "This order was already submitted";
                Self::conflict(message)
                    .with_details(json!({ "reason": reason, "errors": system_errors(message) }))
            }
            SubmissionError::UnknownAccount { account_id } => {
                let message = format!("account {account_id} not found");
                let errors = system_errors(&message);
                Self::not_found(message).with_details(json!({ "reason": reason, "errors": errors }))
            }
            SubmissionError::AvailabilityViolation { issues }
            | SubmissionError::LimitViolation { issues }
            | SubmissionError::BudgetViolation { issues } => {
                Self::unprocessable("The order could not be placed")
                    .with_details(json!({ "reason": reason, "errors": issues }))
            }
            SubmissionError::PersistenceFailure { .. } => {
                let message = "The order could not be placed; please try again";
                Self::internal(message)
                    .with_details(json!({ "reason": reason, "errors": system_errors(message) }))
            }
        }
    }
}
