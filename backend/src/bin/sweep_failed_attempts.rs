//! Delete failed-order records older than the retention window.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::io;
use std::sync::Arc;

use clap::Parser;
use mockable::DefaultClock;
use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use pantry_backend::domain::{DEFAULT_RETENTION_DAYS, RetentionSweepService};
use pantry_backend::outbound::persistence::{DbPool, DieselFailedAttemptRepository, PoolConfig};

const DATABASE_URL_VARS: [&str; 2] = ["PANTRY_DATABASE_URL", "DATABASE_URL"];

/// `sweep-failed-attempts` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sweep-failed-attempts",
    about = "Delete failed-order audit records older than the retention window",
    version
)]
struct CliArgs {
    /// Records created more than this many days ago are removed.
    #[arg(long = "older-than-days", value_name = "days", default_value_t = DEFAULT_RETENTION_DAYS)]
    older_than_days: u32,
    /// Report what would be deleted without deleting anything.
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Database connection URL. Falls back to `PANTRY_DATABASE_URL`, then
    /// `DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
}

fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let database_url = resolve_database_url(args.database_url, |key| env::var(key).ok())?;

    let pool = DbPool::new(PoolConfig::new(&database_url))
        .await
        .map_err(|error| io::Error::other(format!("create database pool: {error}")))?;
    let sweeper = RetentionSweepService::new(
        Arc::new(DieselFailedAttemptRepository::new(pool)),
        Arc::new(DefaultClock),
    );

    let report = sweeper
        .sweep(args.older_than_days, args.dry_run)
        .await
        .map_err(|error| io::Error::other(format!("retention sweep failed: {error}")))?;

    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|error| io::Error::other(format!("render report: {error}")))?;
    println!("{rendered}");
    Ok(())
}

fn resolve_database_url(
    explicit: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> io::Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "--database-url must not be empty when provided",
            ));
        }
        return Ok(value);
    }

    DATABASE_URL_VARS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "database URL missing: set --database-url, PANTRY_DATABASE_URL, or DATABASE_URL",
            )
        })
}
