//! Builders wiring domain services to the configured adapters.
//!
//! Storage uses Diesel repositories when a database URL is configured and
//! in-memory adapters otherwise. Account locks and submission claims use
//! Redis when a Redis URL is configured; the pool connects on demand, so a
//! Redis outage degrades only the submissions that hit it. A malformed Redis
//! URL or an operator-disabled lock service leaves every submission running
//! in degraded mode.

use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use tracing::{info, warn};

use pantry_backend::domain::ports::{
    AccountLockService, FailedAttemptRepository, LedgerRepository, RuleConfigRepository,
    SubmissionClaimStore,
};
use pantry_backend::domain::{
    FailureAnalyticsService, FailureRecorder, SubmissionConfig, SubmissionCoordinator,
    SubmissionDependencies, SubmissionGuard, ThrottleController, ThrottlePolicy,
};
use pantry_backend::inbound::http::health::ReadinessProbe;
use pantry_backend::inbound::http::state::HttpState;
use pantry_backend::outbound::cache::{
    RedisAccountLockService, RedisPool, RedisSubmissionClaimStore,
};
use pantry_backend::outbound::memory::{
    InMemoryAccountLockService, InMemoryFailedAttemptRepository, InMemoryLedgerRepository,
    InMemoryRuleConfigRepository, InMemorySubmissionClaimStore,
};
use pantry_backend::outbound::persistence::{
    DbPool, DieselFailedAttemptRepository, DieselLedgerRepository, DieselRuleConfigRepository,
    PoolConfig, run_migrations,
};

use super::ServerSettings;

const DATABASE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Readiness probe checking a database connection can be checked out.
struct PoolProbe(DbPool);

#[async_trait]
impl ReadinessProbe for PoolProbe {
    async fn is_ready(&self) -> bool {
        self.0.is_ready().await
    }
}

/// Ledger, rule, and audit repositories.
struct Storage {
    ledger: Arc<dyn LedgerRepository>,
    rules: Arc<dyn RuleConfigRepository>,
    failed_attempts: Arc<dyn FailedAttemptRepository>,
    probe: Option<Arc<dyn ReadinessProbe>>,
}

/// Lock and claim backends for the submission guard.
struct GuardBackends {
    locks: Arc<dyn AccountLockService>,
    claims: Arc<dyn SubmissionClaimStore>,
    available: bool,
}

/// Everything the HTTP server needs from the domain.
pub(crate) struct AppServices {
    pub(crate) http_state: web::Data<HttpState>,
    pub(crate) readiness: Option<Arc<dyn ReadinessProbe>>,
}

async fn build_storage(settings: &ServerSettings) -> std::io::Result<Storage> {
    let Some(url) = settings.database_url() else {
        warn!("no database configured; ledgers and failure records are kept in memory");
        return Ok(Storage {
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            rules: Arc::new(InMemoryRuleConfigRepository::default()),
            failed_attempts: Arc::new(InMemoryFailedAttemptRepository::new()),
            probe: None,
        });
    };

    if settings.run_migrations {
        run_migrations(url)
            .await
            .map_err(|err| std::io::Error::other(format!("database migrations failed: {err}")))?;
    }

    let config = PoolConfig::new(url)
        .with_max_size(settings.database_pool_size())
        .with_connection_timeout(DATABASE_CONNECT_TIMEOUT);
    let pool = DbPool::new(config)
        .await
        .map_err(|err| std::io::Error::other(format!("database pool setup failed: {err}")))?;
    info!(pool_size = settings.database_pool_size(), "database pool ready");

    Ok(Storage {
        ledger: Arc::new(DieselLedgerRepository::new(pool.clone())),
        rules: Arc::new(DieselRuleConfigRepository::new(pool.clone())),
        failed_attempts: Arc::new(DieselFailedAttemptRepository::new(pool.clone())),
        probe: Some(Arc::new(PoolProbe(pool))),
    })
}

fn in_memory_guard_backends(clock: &Arc<dyn Clock>, available: bool) -> GuardBackends {
    GuardBackends {
        locks: Arc::new(InMemoryAccountLockService::new()),
        claims: Arc::new(InMemorySubmissionClaimStore::new(clock.clone())),
        available,
    }
}

fn build_guard_backends(settings: &ServerSettings, clock: &Arc<dyn Clock>) -> GuardBackends {
    if !settings.lock_service_enabled {
        warn!("lock service disabled by configuration; submissions run degraded");
        return in_memory_guard_backends(clock, false);
    }
    let Some(url) = settings.redis_url() else {
        info!("no redis configured; account locks are process-local");
        return in_memory_guard_backends(clock, true);
    };

    match RedisPool::lazy(url, settings.redis_pool_size(), REDIS_CONNECT_TIMEOUT) {
        Ok(pool) => {
            info!(
                pool_size = settings.redis_pool_size(),
                "redis pool configured; connections open on demand"
            );
            GuardBackends {
                locks: Arc::new(RedisAccountLockService::new(pool.clone())),
                claims: Arc::new(RedisSubmissionClaimStore::new(pool)),
                available: true,
            }
        }
        Err(err) => {
            warn!(error = %err, "redis url rejected; submissions run degraded");
            in_memory_guard_backends(clock, false)
        }
    }
}

/// Build the submission coordinator and analytics services from settings.
///
/// # Errors
/// Returns an I/O error when the database is configured but migrations or
/// pool construction fail.
pub(crate) async fn build_services(settings: &ServerSettings) -> std::io::Result<AppServices> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let submission_config = SubmissionConfig::from_env();
    let storage = build_storage(settings).await?;
    let backends = build_guard_backends(settings, &clock);

    let guard = SubmissionGuard::new(backends.locks, backends.claims, &submission_config)
        .with_lock_service_available(backends.available);
    let throttle = Arc::new(ThrottleController::new(
        ThrottlePolicy::from_config(&submission_config),
        clock.clone(),
    ));
    let recorder = FailureRecorder::new(storage.failed_attempts.clone(), clock.clone());

    let coordinator = SubmissionCoordinator::new(SubmissionDependencies {
        ledger: storage.ledger,
        rules: storage.rules,
        guard,
        throttle,
        recorder,
        clock: clock.clone(),
    });
    let analytics = FailureAnalyticsService::new(storage.failed_attempts, clock);

    Ok(AppServices {
        http_state: web::Data::new(HttpState::new(Arc::new(coordinator), Arc::new(analytics))),
        readiness: storage.probe,
    })
}
