//! Monetary amounts and voucher multipliers.
//!
//! Amounts are stored as integer minor units (cents) so ledger arithmetic is
//! exact. Multipliers are expressed in basis points where `10_000` means ×1.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Amount of money in minor units (cents).
///
/// Arithmetic saturates instead of wrapping; ledger code never relies on
/// overflow behaviour.
///
/// # Examples
/// ```
/// use pantry_backend::domain::Money;
///
/// let total = Money::from_cents(1_250) + Money::from_cents(250);
/// assert_eq!(total.cents(), 1_500);
/// assert_eq!(total.to_string(), "15.00");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Construct an amount from minor units.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Multiply by an integer quantity, saturating on overflow.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Scale by a multiplier in basis points, rounding towards zero.
    #[must_use]
    pub fn scale(self, multiplier: BasisPoints) -> Self {
        let scaled = i128::from(self.0) * i128::from(multiplier.get()) / 10_000;
        Self(i64::try_from(scaled).unwrap_or(if scaled > 0 { i64::MAX } else { i64::MIN }))
    }

    /// Subtract, clamping the result at zero.
    #[must_use]
    pub fn saturating_sub_floor(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).max(0))
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Multiplier expressed in basis points (`10_000` = ×1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// The identity multiplier (×1).
    pub const ONE: Self = Self(10_000);

    /// Construct a multiplier from raw basis points.
    #[must_use]
    pub const fn new(points: u32) -> Self {
        Self(points)
    }

    /// Raw basis points.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for BasisPoints {
    fn default() -> Self {
        Self::ONE
    }
}
