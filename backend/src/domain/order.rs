//! Committed orders.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cart, Money, VoucherId};

/// Identifier of a committed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh order identifier.
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

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Persisted line of a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Fully accepted order.
///
/// `total == budget_portion + voucher_portion` whenever vouchers were needed;
/// voucher value beyond the shortfall is forfeited and not recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub budget_portion: Money,
    pub voucher_portion: Money,
    pub consumed_vouchers: Vec<VoucherId>,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Snapshot the active lines of `cart` into order lines.
    pub fn lines_from_cart(cart: &Cart) -> Vec<OrderLine> {
        cart.active_lines()
            .map(|line| OrderLine {
                product_id: line.product.id,
                product_name: line.product.name.clone(),
                quantity: line.effective_quantity(),
                unit_price: line.product.unit_price,
                line_total: line.line_total(),
            })
            .collect()
    }
}
