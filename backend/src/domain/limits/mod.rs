//! Category and subcategory quantity limits.
//!
//! [`evaluate`] aggregates cart quantities per category id and, separately,
//! per subcategory id, then compares each aggregate against every configured
//! limit for that target. Category and subcategory limits are independent: a
//! subcategory limit neither inherits from nor overrides its parent, and a
//! product may be constrained by both at once.
//!
//! The engine never short-circuits. Every violated limit is reported so the
//! client can fix the whole cart in one round trip.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cart, Household};

/// Household attribute that multiplies a base limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    PerAdult,
    PerChild,
    PerInfant,
    PerHousehold,
    PerOrder,
}

impl LimitScope {
    /// Multiplier for this scope given a household.
    ///
    /// `per_infant` with zero infants yields zero: the limit is closed, not
    /// unlimited. `per_household` is one when the household has any member.
    ///
    /// # Examples
    /// ```
    /// use pantry_backend::domain::{Household, LimitScope};
    ///
    /// let household = Household::new(2, 1, 0);
    /// assert_eq!(LimitScope::PerAdult.multiplier(&household), 2);
    /// assert_eq!(LimitScope::PerInfant.multiplier(&household), 0);
    /// assert_eq!(LimitScope::PerOrder.multiplier(&Household::default()), 1);
    /// ```
    pub fn multiplier(self, household: &Household) -> u32 {
        match self {
            Self::PerAdult => household.adults,
            Self::PerChild => household.children,
            Self::PerInfant => household.infants,
            Self::PerHousehold => u32::from(household.members() > 0),
            Self::PerOrder => 1,
        }
    }

    /// Stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerAdult => "per_adult",
            Self::PerChild => "per_child",
            Self::PerInfant => "per_infant",
            Self::PerHousehold => "per_household",
            Self::PerOrder => "per_order",
        }
    }

    fn phrase(self) -> &'static str {
        match self {
            Self::PerAdult => "per adult",
            Self::PerChild => "per child",
            Self::PerInfant => "per infant",
            Self::PerHousehold => "per household",
            Self::PerOrder => "per order",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a limit binds a category or a subcategory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitTargetKind {
    Category,
    Subcategory,
}

/// Category or subcategory a limit is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitTarget {
    pub kind: LimitTargetKind,
    pub id: Uuid,
    pub name: String,
}

/// Configured quantity limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLimit {
    pub target: LimitTarget,
    pub allowed: u32,
    pub scope: LimitScope,
}

impl ProductLimit {
    /// Allowance after applying the scope multiplier.
    pub fn effective_allowance(&self, household: &Household) -> u32 {
        self.allowed
            .saturating_mul(self.scope.multiplier(household))
    }
}

/// One exceeded quantity limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitViolation {
    pub target_kind: LimitTargetKind,
    pub target_id: Uuid,
    pub name: String,
    pub scope: LimitScope,
    pub observed: u32,
    pub allowed: u32,
    /// Contributing product names in cart order, without duplicates.
    pub products: Vec<String>,
}

impl LimitViolation {
    /// Human-readable message for clients and audit records.
    pub fn message(&self) -> String {
        format!(
            "{}: {} selected but only {} allowed {} ({})",
            self.name,
            self.observed,
            self.allowed,
            self.scope.phrase(),
            self.products.join(", ")
        )
    }
}

#[derive(Default)]
struct Aggregate<'a> {
    quantity: u32,
    products: Vec<&'a str>,
}

impl<'a> Aggregate<'a> {
    fn add(&mut self, quantity: u32, product: &'a str) {
        self.quantity = self.quantity.saturating_add(quantity);
        if !self.products.contains(&product) {
            self.products.push(product);
        }
    }
}

/// Evaluate every limit against the cart and return the complete violation
/// set, sorted by target kind then name.
///
/// Zero and negative quantity lines are ignored. Products whose category and
/// subcategory carry no limit are unrestricted.
pub fn evaluate(cart: &Cart, household: &Household, limits: &[ProductLimit]) -> Vec<LimitViolation> {
    let mut aggregates: HashMap<(LimitTargetKind, Uuid), Aggregate<'_>> = HashMap::new();
    for line in cart.active_lines() {
        let quantity = line.effective_quantity();
        let name = line.product.name.as_str();
        aggregates
            .entry((LimitTargetKind::Category, line.product.category.id))
            .or_default()
            .add(quantity, name);
        if let Some(subcategory) = &line.product.subcategory {
            aggregates
                .entry((LimitTargetKind::Subcategory, subcategory.id))
                .or_default()
                .add(quantity, name);
        }
    }

    let mut violations: Vec<LimitViolation> = limits
        .iter()
        .filter_map(|limit| {
            let aggregate = aggregates.get(&(limit.target.kind, limit.target.id))?;
            let allowed = limit.effective_allowance(household);
            (aggregate.quantity > allowed).then(|| LimitViolation {
                target_kind: limit.target.kind,
                target_id: limit.target.id,
                name: limit.target.name.clone(),
                scope: limit.scope,
                observed: aggregate.quantity,
                allowed,
                products: aggregate.products.iter().map(|p| (*p).to_owned()).collect(),
            })
        })
        .collect();

    violations.sort_by(|a, b| {
        a.target_kind
            .cmp(&b.target_kind)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.target_id.cmp(&b.target_id))
    });
    violations
}

#[cfg(test)]
mod tests;
