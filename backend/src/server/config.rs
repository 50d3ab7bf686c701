//! HTTP server settings loaded via OrthoConfig.
//!
//! Every value can come from the command line, a configuration file, or a
//! `PANTRY_`-prefixed environment variable. Without a database URL the
//! server runs on in-memory adapters; without a Redis URL account locks and
//! submission claims stay in-process.

use std::net::SocketAddr;

use ortho_config::OrthoConfig;
use serde::Deserialize;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE_POOL_SIZE: u32 = 10;
const DEFAULT_REDIS_POOL_SIZE: u32 = 8;

/// Deployment settings for the order submission server.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "PANTRY")]
pub struct ServerSettings {
    /// Socket address to listen on.
    pub bind_addr: Option<String>,
    /// PostgreSQL connection URL for ledgers, rules, and the failure audit.
    pub database_url: Option<String>,
    /// Maximum database connections.
    pub database_pool_size: Option<u32>,
    /// Apply embedded migrations before serving.
    #[ortho_config(default = true)]
    pub run_migrations: bool,
    /// Redis connection URL for account locks and submission claims.
    pub redis_url: Option<String>,
    /// Maximum Redis connections.
    pub redis_pool_size: Option<u32>,
    /// Operator switch for the lock service; when false every submission
    /// runs degraded.
    #[ortho_config(default = true)]
    pub lock_service_enabled: bool,
}

/// Errors raised while interpreting settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid bind address `{value}`: {source}")]
    BindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

impl ServerSettings {
    /// Parsed listen address, defaulting to `0.0.0.0:8080`.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let value = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        value.parse().map_err(|source| SettingsError::BindAddr {
            value: value.to_owned(),
            source,
        })
    }

    /// Database URL with blank values treated as absent.
    pub fn database_url(&self) -> Option<&str> {
        non_blank(self.database_url.as_deref())
    }

    /// Redis URL with blank values treated as absent.
    pub fn redis_url(&self) -> Option<&str> {
        non_blank(self.redis_url.as_deref())
    }

    /// Maximum database connections.
    pub fn database_pool_size(&self) -> u32 {
        self.database_pool_size
            .unwrap_or(DEFAULT_DATABASE_POOL_SIZE)
            .max(1)
    }

    /// Maximum Redis connections.
    pub fn redis_pool_size(&self) -> u32 {
        self.redis_pool_size.unwrap_or(DEFAULT_REDIS_POOL_SIZE).max(1)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    //! Unit tests for server settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const KEYS: [&str; 7] = [
        "PANTRY_BIND_ADDR",
        "PANTRY_DATABASE_URL",
        "PANTRY_DATABASE_POOL_SIZE",
        "PANTRY_RUN_MIGRATIONS",
        "PANTRY_REDIS_URL",
        "PANTRY_REDIS_POOL_SIZE",
        "PANTRY_LOCK_SERVICE_ENABLED",
    ];

    fn load_from_empty_args() -> ServerSettings {
        ServerSettings::load_from_iter([OsString::from("pantry-backend")])
            .expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(KEYS.map(|key| (key, None::<String>)));

        let settings = load_from_empty_args();

        assert_eq!(
            settings.bind_addr().expect("default bind address"),
            "0.0.0.0:8080".parse::<SocketAddr>().expect("socket address")
        );
        assert!(settings.database_url().is_none());
        assert!(settings.redis_url().is_none());
        assert!(settings.run_migrations);
        assert!(settings.lock_service_enabled);
        assert_eq!(settings.database_pool_size(), DEFAULT_DATABASE_POOL_SIZE);
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("PANTRY_BIND_ADDR", Some("127.0.0.1:9090".to_owned())),
            (
                "PANTRY_DATABASE_URL",
                Some("postgres://localhost/pantry".to_owned()),
            ),
            ("PANTRY_DATABASE_POOL_SIZE", Some("4".to_owned())),
            ("PANTRY_RUN_MIGRATIONS", Some("false".to_owned())),
            ("PANTRY_REDIS_URL", Some("redis://localhost".to_owned())),
            ("PANTRY_REDIS_POOL_SIZE", None),
            ("PANTRY_LOCK_SERVICE_ENABLED", Some("false".to_owned())),
        ]);

        let settings = load_from_empty_args();

        assert_eq!(
            settings.bind_addr().expect("bind address").port(),
            9090
        );
        assert_eq!(settings.database_url(), Some("postgres://localhost/pantry"));
        assert_eq!(settings.database_pool_size(), 4);
        assert!(!settings.run_migrations);
        assert_eq!(settings.redis_url(), Some("redis://localhost"));
        assert!(!settings.lock_service_enabled);
    }

    #[rstest]
    fn blank_urls_mean_in_memory_adapters() {
        let _guard = lock_env(KEYS.map(|key| {
            let value = match key {
                "PANTRY_DATABASE_URL" | "PANTRY_REDIS_URL" => Some("  ".to_owned()),
                _ => None,
            };
            (key, value)
        }));

        let settings = load_from_empty_args();

        assert!(settings.database_url().is_none());
        assert!(settings.redis_url().is_none());
    }

    #[rstest]
    fn malformed_bind_address_is_reported() {
        let _guard = lock_env(KEYS.map(|key| {
            let value = (key == "PANTRY_BIND_ADDR").then(|| "not-an-address".to_owned());
            (key, value)
        }));

        let settings = load_from_empty_args();

        assert!(matches!(
            settings.bind_addr(),
            Err(SettingsError::BindAddr { .. })
        ));
    }
}
