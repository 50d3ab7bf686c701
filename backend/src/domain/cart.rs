//! In-memory cart representation validated before anything is persisted.
//!
//! Product attributes (category, price, ledger bucket) are resolved upstream by
//! the catalogue and travel with each line, so validation never depends on an
//! entity having been saved first.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;

/// Name of a category sub-ledger such as `hygiene`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerBucket(String);

impl LedgerBucket {
    /// Construct a bucket name, normalising to trimmed lowercase.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    /// Bucket name.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for LedgerBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a category or subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
}

/// Catalogue attributes of one product as seen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
    pub category: CategoryRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<CategoryRef>,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_bucket: Option<LedgerBucket>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

/// One `(product, quantity)` line.
///
/// Quantities arrive signed from clients; negative quantities are reported as
/// availability errors and contribute nothing to totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product: ProductRef,
    pub quantity: i32,
}

impl CartLine {
    /// Effective quantity; zero for zero or negative lines.
    pub fn effective_quantity(&self) -> u32 {
        u32::try_from(self.quantity).unwrap_or(0)
    }

    /// Price of the whole line.
    pub fn line_total(&self) -> Money {
        self.product.unit_price.times(self.effective_quantity())
    }
}

/// Ordered list of lines submitted atomically.
///
/// Zero-quantity lines are kept for display but ignored by every total and
/// rule; they are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Build a cart from lines in submission order.
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// All lines, including zero-quantity ones.
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Lines with a positive quantity.
    pub fn active_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| line.quantity > 0)
    }

    /// Whether the cart has no effective lines.
    pub fn is_empty(&self) -> bool {
        self.active_lines().next().is_none()
    }

    /// Sum of all active line totals.
    pub fn total(&self) -> Money {
        self.active_lines().map(CartLine::line_total).sum()
    }

    /// Totals per ledger bucket for lines that declare one.
    pub fn bucket_totals(&self) -> BTreeMap<LedgerBucket, Money> {
        let mut totals = BTreeMap::new();
        for line in self.active_lines() {
            if let Some(bucket) = &line.product.ledger_bucket {
                let entry = totals.entry(bucket.clone()).or_insert(Money::ZERO);
                *entry = *entry + line.line_total();
            }
        }
        totals
    }

    /// Whether every active line belongs to `bucket`.
    pub fn is_exclusively(&self, bucket: &LedgerBucket) -> bool {
        !self.is_empty()
            && self
                .active_lines()
                .all(|line| line.product.ledger_bucket.as_ref() == Some(bucket))
    }

    /// Product quantities merged per product and sorted by product id.
    ///
    /// This is the normalised form used for fingerprints: line order, zero
    /// quantities and split lines for the same product do not matter.
    pub fn normalized_quantities(&self) -> Vec<(Uuid, u32)> {
        let mut merged: BTreeMap<Uuid, u32> = BTreeMap::new();
        for line in self.active_lines() {
            let entry = merged.entry(line.product.id).or_insert(0);
            *entry = entry.saturating_add(line.effective_quantity());
        }
        merged.into_iter().collect()
    }
}
