//! Port for the versioned rule configuration.

use async_trait::async_trait;

use crate::domain::{RuleSnapshot, RuleVersion};

use super::define_port_error;

define_port_error! {
    /// Errors raised by rule configuration repositories.
    pub enum RuleConfigRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "rule repository connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "rule repository query failed: {message}",
    }
}

/// Port exposing the current rule configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleConfigRepository: Send + Sync {
    /// Load the complete current configuration as an immutable snapshot.
    async fn load_rules(&self) -> Result<RuleSnapshot, RuleConfigRepositoryError>;

    /// Current rule version without loading the full configuration.
    async fn current_version(&self) -> Result<RuleVersion, RuleConfigRepositoryError>;
}

/// Fixture returning an empty rule set at version 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRuleConfigRepository;

#[async_trait]
impl RuleConfigRepository for FixtureRuleConfigRepository {
    async fn load_rules(&self) -> Result<RuleSnapshot, RuleConfigRepositoryError> {
        Ok(RuleSnapshot {
            version: RuleVersion::new(1),
            ..RuleSnapshot::default()
        })
    }

    async fn current_version(&self) -> Result<RuleVersion, RuleConfigRepositoryError> {
        Ok(RuleVersion::new(1))
    }
}
