//! Versioned purchase rule configuration.
//!
//! Rules are read once per request into an immutable [`RuleSnapshot`] and
//! passed explicitly to the engines that need them; nothing reads a global
//! "active settings" row behind the caller's back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::BasisPoints;
use super::limits::ProductLimit;

/// Monotonically increasing configuration version.
///
/// Bumped whenever limits, budgets or program-pause configuration change.
/// Clients poll it to know when to refresh cached validation assumptions; the
/// server never gates validation on it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RuleVersion(i64);

impl RuleVersion {
    /// Wrap a raw version number.
    pub const fn new(version: i64) -> Self {
        Self(version)
    }

    /// Raw version number.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The next version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for RuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Program-wide pause that rescales voucher value.
///
/// While active, `voucher_multiplier` replaces each voucher's own multiplier.
/// Stored voucher amounts are never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramPause {
    pub voucher_multiplier: BasisPoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Immutable configuration snapshot used by one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSnapshot {
    pub version: RuleVersion,
    #[serde(default)]
    pub limits: Vec<ProductLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_pause: Option<ProgramPause>,
}

impl RuleSnapshot {
    /// Multiplier overriding voucher multipliers, if a pause is active.
    pub fn voucher_multiplier_override(&self) -> Option<BasisPoints> {
        self.program_pause.map(|pause| pause.voucher_multiplier)
    }

    /// Whether a client-declared version lags behind this snapshot.
    pub fn is_newer_than(&self, client_version: Option<RuleVersion>) -> bool {
        client_version.is_some_and(|client| client < self.version)
    }
}
