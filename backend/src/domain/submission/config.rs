//! Environment-driven configuration for submission guarding and throttling.

use std::time::Duration;

/// Dedup window in seconds.
pub const DEDUP_WINDOW_SECS_ENV: &str = "PANTRY_DEDUP_WINDOW_SECS";
/// Lock wait timeout in milliseconds.
pub const LOCK_WAIT_MS_ENV: &str = "PANTRY_LOCK_WAIT_MS";
/// Lock lease TTL in seconds.
pub const LOCK_LEASE_SECS_ENV: &str = "PANTRY_LOCK_LEASE_SECS";
/// Admitted attempts per minute per account.
pub const RATE_LIMIT_PER_MINUTE_ENV: &str = "PANTRY_RATE_LIMIT_PER_MINUTE";
/// Backoff cap in seconds.
pub const BACKOFF_CAP_SECS_ENV: &str = "PANTRY_BACKOFF_CAP_SECS";
/// Quiet period after which a failure streak resets, in seconds.
pub const STREAK_RESET_SECS_ENV: &str = "PANTRY_STREAK_RESET_SECS";

/// Environment abstraction for submission configuration lookups.
///
/// This trait allows testing with fake environments without mutating process
/// environment variables.
pub trait SubmissionEnv {
    /// Fetch a string value by name.
    fn string(&self, name: &str) -> Option<String>;
}

/// Environment access backed by the real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSubmissionEnv;

impl SubmissionEnv for DefaultSubmissionEnv {
    fn string(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Timing configuration for the submission pipeline.
///
/// # Example
///
/// ```
/// # use pantry_backend::domain::SubmissionConfig;
/// # use std::time::Duration;
/// let config = SubmissionConfig::default();
/// assert_eq!(config.dedup_window, Duration::from_secs(300));
/// assert_eq!(config.lock_wait_timeout, Duration::from_secs(3));
/// assert_eq!(config.rate_limit_per_minute, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionConfig {
    pub dedup_window: Duration,
    pub lock_wait_timeout: Duration,
    pub lock_lease_ttl: Duration,
    pub rate_limit_per_minute: u32,
    pub backoff_cap: Duration,
    pub streak_reset_after: Duration,
}

impl SubmissionConfig {
    const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;
    const DEFAULT_LOCK_WAIT_MS: u64 = 3_000;
    const DEFAULT_LOCK_LEASE_SECS: u64 = 30;
    const DEFAULT_RATE_LIMIT: u32 = 3;
    const DEFAULT_BACKOFF_CAP_SECS: u64 = 60;
    const DEFAULT_STREAK_RESET_SECS: u64 = 3_600;

    /// Load configuration from the real process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(&DefaultSubmissionEnv)
    }

    /// Load configuration from a custom environment source.
    ///
    /// Unparseable values fall back to defaults; values are clamped to sane
    /// ranges so a typo cannot disable locking or throttling outright.
    pub fn from_env_with(env: &impl SubmissionEnv) -> Self {
        let read = |name: &str, default: u64, min: u64, max: u64| {
            env.string(name)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or(default)
                .clamp(min, max)
        };
        let rate_limit = read(
            RATE_LIMIT_PER_MINUTE_ENV,
            u64::from(Self::DEFAULT_RATE_LIMIT),
            1,
            1_000,
        );
        Self {
            dedup_window: Duration::from_secs(read(
                DEDUP_WINDOW_SECS_ENV,
                Self::DEFAULT_DEDUP_WINDOW_SECS,
                1,
                3_600,
            )),
            lock_wait_timeout: Duration::from_millis(read(
                LOCK_WAIT_MS_ENV,
                Self::DEFAULT_LOCK_WAIT_MS,
                10,
                60_000,
            )),
            lock_lease_ttl: Duration::from_secs(read(
                LOCK_LEASE_SECS_ENV,
                Self::DEFAULT_LOCK_LEASE_SECS,
                1,
                600,
            )),
            rate_limit_per_minute: u32::try_from(rate_limit).unwrap_or(Self::DEFAULT_RATE_LIMIT),
            backoff_cap: Duration::from_secs(read(
                BACKOFF_CAP_SECS_ENV,
                Self::DEFAULT_BACKOFF_CAP_SECS,
                2,
                3_600,
            )),
            streak_reset_after: Duration::from_secs(read(
                STREAK_RESET_SECS_ENV,
                Self::DEFAULT_STREAK_RESET_SECS,
                60,
                86_400,
            )),
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(Self::DEFAULT_DEDUP_WINDOW_SECS),
            lock_wait_timeout: Duration::from_millis(Self::DEFAULT_LOCK_WAIT_MS),
            lock_lease_ttl: Duration::from_secs(Self::DEFAULT_LOCK_LEASE_SECS),
            rate_limit_per_minute: Self::DEFAULT_RATE_LIMIT,
            backoff_cap: Duration::from_secs(Self::DEFAULT_BACKOFF_CAP_SECS),
            streak_reset_after: Duration::from_secs(Self::DEFAULT_STREAK_RESET_SECS),
        }
    }
}
