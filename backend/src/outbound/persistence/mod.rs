//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the ledger, rule configuration and failure
//! audit ports, backed by PostgreSQL through `diesel-async` and `bb8`.
//!
//! - **Thin adapters**: repositories only translate between Diesel rows and
//!   domain types. Budget and limit decisions stay in the domain.
//! - **Internal models**: row structs (`models.rs`) and the schema
//!   (`schema.rs`) never leave this module.
//! - **Atomic commits**: an order, its voucher consumption and its budget
//!   charge are written in one transaction guarded by a balance version.
//!
//! ```ignore
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/pantry")).await?;
//! let ledger = DieselLedgerRepository::new(pool.clone());
//! ```

mod diesel_basic_error_mapping;
mod diesel_failed_attempt_repository;
mod diesel_ledger_repository;
mod diesel_rule_config_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_failed_attempt_repository::DieselFailedAttemptRepository;
pub use diesel_ledger_repository::DieselLedgerRepository;
pub use diesel_rule_config_repository::DieselRuleConfigRepository;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
