//! Rule configuration held in memory.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{RuleConfigRepository, RuleConfigRepositoryError};
use crate::domain::{RuleSnapshot, RuleVersion};

/// Rule repository serving one replaceable snapshot.
pub struct InMemoryRuleConfigRepository {
    current: RwLock<RuleSnapshot>,
}

impl InMemoryRuleConfigRepository {
    /// Serve `rules` as the current configuration.
    pub fn new(rules: RuleSnapshot) -> Self {
        Self {
            current: RwLock::new(rules),
        }
    }

    /// Replace the configuration, bumping the version past the current one.
    ///
    /// Returns the version the new configuration was published under.
    pub fn publish(&self, mut rules: RuleSnapshot) -> RuleVersion {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        rules.version = current.version.next();
        let version = rules.version;
        *current = rules;
        info!(%version, "rule configuration published");
        version
    }

    fn snapshot(&self) -> RuleSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for InMemoryRuleConfigRepository {
    fn default() -> Self {
        Self::new(RuleSnapshot {
            version: RuleVersion::new(1),
            ..RuleSnapshot::default()
        })
    }
}

#[async_trait]
impl RuleConfigRepository for InMemoryRuleConfigRepository {
    async fn load_rules(&self) -> Result<RuleSnapshot, RuleConfigRepositoryError> {
        Ok(self.snapshot())
    }

    async fn current_version(&self) -> Result<RuleVersion, RuleConfigRepositoryError> {
        Ok(self.snapshot().version)
    }
}
