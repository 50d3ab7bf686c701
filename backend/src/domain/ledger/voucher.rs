//! Voucher entity and lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{BasisPoints, Cart, LedgerBucket, Money};

/// Voucher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherId(Uuid);

impl VoucherId {
    /// Generate a fresh identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a voucher may be spent on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoucherKind {
    /// Usable for any order.
    General,
    /// Usable only for orders made entirely of products in `bucket`.
    Restricted { bucket: LedgerBucket },
}

impl VoucherKind {
    /// Whether the voucher may be used for this cart.
    pub fn matches(&self, cart: &Cart) -> bool {
        match self {
            Self::General => true,
            Self::Restricted { bucket } => cart.is_exclusively(bucket),
        }
    }
}

/// Lifecycle state.
///
/// `pending → applied → consumed`, or `pending | applied → expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherState {
    Pending,
    Applied,
    Consumed,
    Expired,
}

impl VoucherState {
    /// Stable storage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }

    /// Whether `self → next` is a legal transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Applied)
                | (Self::Applied, Self::Consumed)
                | (Self::Pending | Self::Applied, Self::Expired)
        )
    }
}

impl fmt::Display for VoucherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoucherState {
    type Err = VoucherTransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "consumed" => Ok(Self::Consumed),
            "expired" => Ok(Self::Expired),
            other => Err(VoucherTransitionError::UnknownState(other.to_owned())),
        }
    }
}

/// Errors raised by voucher lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherTransitionError {
    #[error("voucher {id} cannot move from {from} to {to}")]
    Illegal {
        id: VoucherId,
        from: VoucherState,
        to: VoucherState,
    },
    #[error("unknown voucher state `{0}`")]
    UnknownState(String),
}

/// Supplemental spending credit owned by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub id: VoucherId,
    pub kind: VoucherKind,
    pub amount: Money,
    pub multiplier: BasisPoints,
    pub state: VoucherState,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    /// Spendable value: `amount × multiplier`, with a program-pause override
    /// replacing the voucher's own multiplier when present.
    pub fn effective_value(&self, multiplier_override: Option<BasisPoints>) -> Money {
        self.amount
            .scale(multiplier_override.unwrap_or(self.multiplier))
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: VoucherState) -> Result<(), VoucherTransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(VoucherTransitionError::Illegal {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
