//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL ledger, rule and audit repositories (Diesel)
//! - **cache**: Redis account locks and submission claims
//! - **memory**: process-local adapters used when no database or Redis URL
//!   is configured, and by the test suites
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod memory;
pub mod persistence;
