//! Infrastructure adapters for the Lodge chat server: PostgreSQL
//! repositories, Redis coordination stores, crypto providers, SMTP, and
//! HTTP clients for search and the disposable-email blocklist.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod argon2_password_hasher;
mod console_email_service;
mod fs_storage_provider;
mod hmac_identity_hasher;
mod http_blocklist_fetcher;
mod jwt_access_tokens;
mod meili_message_searcher;
mod postgres_attachment_repository;
mod postgres_auth_support_repositories;
mod postgres_channel_repository;
mod postgres_invite_repository;
mod postgres_member_repository;
mod postgres_message_repository;
mod postgres_permission_repository;
mod postgres_role_repository;
mod postgres_server_repository;
mod postgres_user_repository;
mod postgres_verification_repository;
mod redis_event_bus;
mod redis_gateway_session_store;
mod redis_mfa_store;
mod redis_permission_bus;
mod redis_permission_cache;
mod redis_refresh_token_store;
mod redis_thumbnail_queue;
mod smtp_email_service;
mod totp_provider;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use argon2_password_hasher::{Argon2Config, Argon2PasswordHasher};
pub use console_email_service::ConsoleEmailService;
pub use fs_storage_provider::FsStorageProvider;
pub use hmac_identity_hasher::HmacIdentityHasher;
pub use http_blocklist_fetcher::HttpBlocklistFetcher;
pub use jwt_access_tokens::JwtAccessTokens;
pub use meili_message_searcher::MeiliMessageSearcher;
pub use postgres_attachment_repository::PostgresAttachmentRepository;
pub use postgres_auth_support_repositories::{
    PostgresLoginAttemptRepository, PostgresRecoveryCodeRepository, PostgresTombstoneRepository,
};
pub use postgres_channel_repository::PostgresChannelRepository;
pub use postgres_invite_repository::PostgresInviteRepository;
pub use postgres_member_repository::PostgresMemberRepository;
pub use postgres_message_repository::PostgresMessageRepository;
pub use postgres_permission_repository::PostgresPermissionRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use postgres_server_repository::PostgresServerRepository;
pub use postgres_user_repository::PostgresUserRepository;
pub use postgres_verification_repository::PostgresVerificationRepository;
pub use redis_event_bus::{GATEWAY_EVENTS_CHANNEL, RedisEventBus};
pub use redis_gateway_session_store::RedisGatewaySessionStore;
pub use redis_mfa_store::RedisMfaStore;
pub use redis_permission_bus::{PERMISSION_INVALIDATE_CHANNEL, RedisPermissionBus};
pub use redis_permission_cache::RedisPermissionCache;
pub use redis_refresh_token_store::RedisRefreshTokenStore;
pub use redis_thumbnail_queue::{RedisThumbnailQueue, THUMBNAIL_JOBS_KEY};
pub use smtp_email_service::{SmtpEmailConfig, SmtpEmailService};
pub use totp_provider::TotpRsProvider;

use lodge_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connects to PostgreSQL with bounded pool sizes and applies migrations.
pub async fn connect_and_migrate(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

/// Builds a Redis client from a connection URL.
pub fn build_redis_client(redis_url: &str) -> Result<redis::Client, AppError> {
    redis::Client::open(redis_url)
        .map_err(|error| AppError::Internal(format!("failed to build redis client: {error}")))
}
