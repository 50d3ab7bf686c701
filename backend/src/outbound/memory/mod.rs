//! In-process adapters for every submission port.
//!
//! These back the server when no database or Redis URL is configured and give
//! integration tests a complete, deterministic stack. They honour the same
//! contracts as the durable adapters: ledger commits are atomic and
//! version-checked, locks are leases with owner tokens, claims expire after
//! their window.

mod failed_attempts;
mod ledger;
mod locks;
mod rules;

pub use self::failed_attempts::InMemoryFailedAttemptRepository;
pub use self::ledger::InMemoryLedgerRepository;
pub use self::locks::{InMemoryAccountLockService, InMemorySubmissionClaimStore};
pub use self::rules::InMemoryRuleConfigRepository;
