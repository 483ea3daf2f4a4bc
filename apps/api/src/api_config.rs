//! API configuration from environment variables.

use std::env;
use std::net::SocketAddr;

use chrono::Duration;
use lodge_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// Everything the API binary reads from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Human-readable server name (`SERVER_NAME`).
    pub server_name: String,
    /// Public base URL, also the JWT issuer (`SERVER_URL`).
    pub server_url: String,
    /// Listen port (`SERVER_PORT`).
    pub port: u16,
    /// Deployment environment label (`SERVER_ENV`).
    pub environment: String,
    /// PostgreSQL connection URL (`DATABASE_URL`).
    pub database_url: String,
    /// Database pool ceiling (`DATABASE_MAX_CONN`).
    pub database_max_conn: u32,
    /// Database pool floor (`DATABASE_MIN_CONN`).
    pub database_min_conn: u32,
    /// Redis connection URL (`REDIS_URL`).
    pub redis_url: String,
    /// HS256 signing secret (`JWT_SECRET`).
    pub jwt_secret: String,
    /// Access token lifetime in seconds (`ACCESS_TOKEN_TTL`).
    pub access_token_ttl_seconds: i64,
    /// Refresh token lifetime (`REFRESH_TOKEN_TTL`).
    pub refresh_token_ttl: Duration,
    /// AES key for TOTP secrets, 64 hex chars (`MFA_ENCRYPTION_KEY`).
    pub mfa_encryption_key: String,
    /// HMAC key for tombstones, 64 hex chars (`SERVER_SECRET`).
    pub server_secret: String,
    /// Argon2 memory cost in KiB (`ARGON2_MEMORY_KIB`).
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (`ARGON2_ITERATIONS`).
    pub argon2_iterations: u32,
    /// Argon2 parallelism (`ARGON2_PARALLELISM`).
    pub argon2_parallelism: u32,
    /// Verification token lifetime (`VERIFICATION_TOKEN_TTL`).
    pub verification_token_ttl: Duration,
    /// Verification resend cooldown (`VERIFICATION_COOLDOWN`).
    pub verification_cooldown: Duration,
    /// MFA ticket lifetime (`MFA_TICKET_TTL`).
    pub mfa_ticket_ttl: Duration,
    /// Pending MFA secret lifetime (`MFA_PENDING_TTL`).
    pub pending_mfa_ttl: Duration,
    /// Failed MFA confirmations before lockout (`MFA_CONFIRM_ATTEMPT_CAP`).
    pub mfa_confirm_attempt_cap: u32,
    /// Whether deleted usernames are tombstoned (`DELETION_TOMBSTONE_USERNAMES`).
    pub tombstone_usernames: bool,
    /// Permission cache TTL (`PERMISSION_CACHE_TTL`).
    pub permission_cache_ttl: Duration,
    /// Gateway heartbeat interval in milliseconds (`GATEWAY_HEARTBEAT_MS`).
    pub gateway_heartbeat_ms: u64,
    /// Window for the identify frame in milliseconds (`GATEWAY_IDENTIFY_MS`).
    pub gateway_identify_ms: u64,
    /// Replay buffer entries per session (`GATEWAY_REPLAY_BUFFER`).
    pub gateway_replay_buffer: usize,
    /// Gateway session TTL (`GATEWAY_SESSION_TTL`).
    pub gateway_session_ttl: Duration,
    /// Outbound frame queue depth per connection (`GATEWAY_SEND_QUEUE`).
    pub gateway_send_queue: usize,
    /// Upload size cap in bytes (`UPLOAD_MAX_BYTES`).
    pub upload_max_bytes: usize,
    /// Blob storage root directory (`STORAGE_ROOT`).
    pub storage_root: String,
    /// Search engine base URL (`SEARCH_URL`), empty to disable.
    pub search_url: Option<String>,
    /// Search engine API key (`SEARCH_API_KEY`).
    pub search_api_key: Option<String>,
    /// Disposable email blocklist source (`DISPOSABLE_EMAIL_URL`).
    pub disposable_email_url: Option<String>,
    /// Whether the blocklist check is on (`DISPOSABLE_EMAIL_ENABLED`).
    pub disposable_email_enabled: bool,
    /// SMTP settings; `None` routes mail to the console service.
    pub smtp: Option<SmtpSettings>,
    /// Allowed CORS origins, comma separated (`CORS_ORIGINS`).
    pub cors_origins: Vec<String>,
}

/// SMTP connection settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Server host (`SMTP_HOST`).
    pub host: String,
    /// Server port (`SMTP_PORT`).
    pub port: u16,
    /// Username (`SMTP_USERNAME`).
    pub username: String,
    /// Password (`SMTP_PASSWORD`).
    pub password: String,
    /// Sender address (`SMTP_FROM`).
    pub from_address: String,
}

fn required(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Validation(format!("{name} is malformed"))),
        Err(_) => Ok(default),
    }
}

fn parse_seconds(name: &str, default_seconds: i64) -> AppResult<Duration> {
    Ok(Duration::seconds(parse(name, default_seconds)?))
}

impl ApiConfig {
    /// Loads and validates the configuration.
    pub fn load() -> AppResult<Self> {
        let smtp = match optional("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse("SMTP_PORT", 587)?,
                username: required("SMTP_USERNAME")?,
                password: required("SMTP_PASSWORD")?,
                from_address: required("SMTP_FROM")?,
            }),
            None => None,
        };

        let config = Self {
            server_name: parse("SERVER_NAME", "Lodge".to_owned())?,
            server_url: required("SERVER_URL")?,
            port: parse("SERVER_PORT", 8080)?,
            environment: parse("SERVER_ENV", "development".to_owned())?,
            database_url: required("DATABASE_URL")?,
            database_max_conn: parse("DATABASE_MAX_CONN", 10)?,
            database_min_conn: parse("DATABASE_MIN_CONN", 1)?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl_seconds: parse("ACCESS_TOKEN_TTL", 900)?,
            refresh_token_ttl: parse_seconds("REFRESH_TOKEN_TTL", 14 * 24 * 3600)?,
            mfa_encryption_key: required("MFA_ENCRYPTION_KEY")?,
            server_secret: required("SERVER_SECRET")?,
            argon2_memory_kib: parse("ARGON2_MEMORY_KIB", 19_456)?,
            argon2_iterations: parse("ARGON2_ITERATIONS", 2)?,
            argon2_parallelism: parse("ARGON2_PARALLELISM", 1)?,
            verification_token_ttl: parse_seconds("VERIFICATION_TOKEN_TTL", 24 * 3600)?,
            verification_cooldown: parse_seconds("VERIFICATION_COOLDOWN", 300)?,
            mfa_ticket_ttl: parse_seconds("MFA_TICKET_TTL", 300)?,
            pending_mfa_ttl: parse_seconds("MFA_PENDING_TTL", 600)?,
            mfa_confirm_attempt_cap: parse("MFA_CONFIRM_ATTEMPT_CAP", 5)?,
            tombstone_usernames: parse("DELETION_TOMBSTONE_USERNAMES", false)?,
            permission_cache_ttl: parse_seconds("PERMISSION_CACHE_TTL", 300)?,
            gateway_heartbeat_ms: parse("GATEWAY_HEARTBEAT_MS", 30_000)?,
            gateway_identify_ms: parse("GATEWAY_IDENTIFY_MS", 10_000)?,
            gateway_replay_buffer: parse("GATEWAY_REPLAY_BUFFER", 256)?,
            gateway_session_ttl: parse_seconds("GATEWAY_SESSION_TTL", 600)?,
            gateway_send_queue: parse("GATEWAY_SEND_QUEUE", 64)?,
            upload_max_bytes: parse("UPLOAD_MAX_BYTES", 25 * 1024 * 1024)?,
            storage_root: parse("STORAGE_ROOT", "./data/blobs".to_owned())?,
            search_url: optional("SEARCH_URL"),
            search_api_key: optional("SEARCH_API_KEY"),
            disposable_email_url: optional("DISPOSABLE_EMAIL_URL"),
            disposable_email_enabled: parse("DISPOSABLE_EMAIL_ENABLED", false)?,
            smtp,
            cors_origins: optional("CORS_ORIGINS")
                .map(|raw| raw.split(',').map(|origin| origin.trim().to_owned()).collect())
                .unwrap_or_default(),
        };

        if config.database_min_conn > config.database_max_conn {
            return Err(AppError::Validation(
                "DATABASE_MIN_CONN must not exceed DATABASE_MAX_CONN".to_owned(),
            ));
        }
        if config.disposable_email_enabled && config.disposable_email_url.is_none() {
            return Err(AppError::Validation(
                "DISPOSABLE_EMAIL_URL is required when the blocklist is enabled".to_owned(),
            ));
        }

        Ok(config)
    }

    /// Returns the socket address to bind.
    pub fn socket_address(&self) -> AppResult<SocketAddr> {
        format!("0.0.0.0:{}", self.port)
            .parse()
            .map_err(|error| AppError::Validation(format!("invalid listen address: {error}")))
    }
}

/// Initialises the tracing subscriber once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
