//! Worker configuration from environment variables.

use std::env;
use std::time::Duration;

use lodge_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// Everything the worker binary reads from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL connection URL (`DATABASE_URL`).
    pub database_url: String,
    /// Database pool ceiling (`DATABASE_MAX_CONN`).
    pub database_max_conn: u32,
    /// Redis connection URL (`REDIS_URL`).
    pub redis_url: String,
    /// Blob storage root directory (`STORAGE_ROOT`).
    pub storage_root: String,
    /// Purge sweep interval (`PURGE_INTERVAL`).
    pub purge_interval: Duration,
    /// Audit-row retention (`LOGIN_ATTEMPT_RETENTION`).
    pub login_attempt_retention: chrono::Duration,
    /// Tombstone retention; zero disables purging
    /// (`DELETION_TOMBSTONE_RETENTION`).
    pub tombstone_retention: chrono::Duration,
    /// Orphaned-attachment TTL (`ATTACHMENT_ORPHAN_TTL`).
    pub attachment_orphan_ttl: chrono::Duration,
    /// Blocklist source URL (`DISPOSABLE_EMAIL_URL`).
    pub disposable_email_url: Option<String>,
    /// Whether the blocklist refresh runs (`DISPOSABLE_EMAIL_ENABLED`).
    pub disposable_email_enabled: bool,
    /// Blocklist refresh interval (`DISPOSABLE_EMAIL_REFRESH_INTERVAL`).
    pub blocklist_refresh_interval: Duration,
}

fn required(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Validation(format!("{name} is malformed"))),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    /// Loads and validates the configuration.
    pub fn load() -> AppResult<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_conn: parse("DATABASE_MAX_CONN", 4)?,
            redis_url: required("REDIS_URL")?,
            storage_root: parse("STORAGE_ROOT", "./data/blobs".to_owned())?,
            purge_interval: Duration::from_secs(parse("PURGE_INTERVAL", 3600u64)?),
            login_attempt_retention: chrono::Duration::seconds(parse(
                "LOGIN_ATTEMPT_RETENTION",
                30 * 24 * 3600i64,
            )?),
            tombstone_retention: chrono::Duration::seconds(parse(
                "DELETION_TOMBSTONE_RETENTION",
                90 * 24 * 3600i64,
            )?),
            attachment_orphan_ttl: chrono::Duration::seconds(parse(
                "ATTACHMENT_ORPHAN_TTL",
                24 * 3600i64,
            )?),
            disposable_email_url: env::var("DISPOSABLE_EMAIL_URL")
                .ok()
                .filter(|value| !value.is_empty()),
            disposable_email_enabled: parse("DISPOSABLE_EMAIL_ENABLED", false)?,
            blocklist_refresh_interval: Duration::from_secs(parse(
                "DISPOSABLE_EMAIL_REFRESH_INTERVAL",
                6 * 3600u64,
            )?),
        })
    }
}

/// Initialises the tracing subscriber once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
