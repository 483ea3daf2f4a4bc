//! Composition: wires adapters into application services.

use std::sync::Arc;

use lodge_application::{
    AttachmentService, AuthConfig, AuthService, AuthServiceDeps, BlocklistService,
    ChannelService, EmailService, EventPublisher, InviteService, MemberService, MessageSearcher,
    MessageService, PermissionService, RoleService, SearchHit, SearchRequest,
};
use lodge_core::{AppError, AppResult};
use lodge_domain::{Message, MessageId};
use lodge_infrastructure::{
    AesSecretEncryptor, Argon2Config, Argon2PasswordHasher, ConsoleEmailService,
    FsStorageProvider, HmacIdentityHasher, HttpBlocklistFetcher, JwtAccessTokens,
    MeiliMessageSearcher, PostgresAttachmentRepository, PostgresChannelRepository,
    PostgresInviteRepository, PostgresLoginAttemptRepository, PostgresMemberRepository,
    PostgresMessageRepository, PostgresPermissionRepository, PostgresRecoveryCodeRepository,
    PostgresRoleRepository, PostgresServerRepository, PostgresTombstoneRepository,
    PostgresUserRepository, PostgresVerificationRepository, RedisEventBus,
    RedisGatewaySessionStore, RedisMfaStore, RedisPermissionBus, RedisPermissionCache,
    RedisRefreshTokenStore, RedisThumbnailQueue, SmtpEmailConfig, SmtpEmailService,
    TotpRsProvider,
};
use sqlx::PgPool;

use crate::api_config::ApiConfig;
use crate::gateway::{GatewayConfig, GatewayRegistry};
use crate::state::AppState;

/// Search adapter used when no engine is configured: indexing is a no-op
/// and queries return nothing.
struct DisabledSearcher;

#[async_trait::async_trait]
impl MessageSearcher for DisabledSearcher {
    async fn index(&self, _message: &Message) -> AppResult<()> {
        Ok(())
    }

    async fn remove(&self, _message_id: MessageId) -> AppResult<()> {
        Ok(())
    }

    async fn search(&self, _request: &SearchRequest) -> AppResult<Vec<SearchHit>> {
        Err(AppError::ServiceUnavailable(
            "message search is not configured".to_owned(),
        ))
    }
}

/// Fetcher used when the blocklist is disabled.
struct DisabledBlocklistFetcher;

#[async_trait::async_trait]
impl lodge_application::BlocklistFetcher for DisabledBlocklistFetcher {
    async fn fetch(&self) -> AppResult<String> {
        Ok(String::new())
    }
}

/// Builds the full application state from configuration and connections.
pub fn build_app_state(pool: PgPool, config: &ApiConfig) -> AppResult<AppState> {
    let redis_client = lodge_infrastructure::build_redis_client(&config.redis_url)?;

    // Repositories.
    let users = Arc::new(PostgresUserRepository::new(pool.clone()));
    let verifications = Arc::new(PostgresVerificationRepository::new(pool.clone()));
    let recovery_codes = Arc::new(PostgresRecoveryCodeRepository::new(pool.clone()));
    let tombstones = Arc::new(PostgresTombstoneRepository::new(pool.clone()));
    let login_attempts = Arc::new(PostgresLoginAttemptRepository::new(pool.clone()));
    let channels = Arc::new(PostgresChannelRepository::new(pool.clone()));
    let roles = Arc::new(PostgresRoleRepository::new(pool.clone()));
    let members = Arc::new(PostgresMemberRepository::new(pool.clone()));
    let invites = Arc::new(PostgresInviteRepository::new(pool.clone()));
    let message_repo = Arc::new(PostgresMessageRepository::new(pool.clone()));
    let attachments = Arc::new(PostgresAttachmentRepository::new(pool.clone()));
    let permission_queries = Arc::new(PostgresPermissionRepository::new(pool.clone()));
    let server = Arc::new(PostgresServerRepository::new(pool));

    // Coordination stores.
    let refresh_tokens = Arc::new(RedisRefreshTokenStore::new(redis_client.clone()));
    let mfa_store = Arc::new(RedisMfaStore::new(redis_client.clone()));
    let permission_cache = Arc::new(RedisPermissionCache::new(redis_client.clone()));
    let permission_bus = Arc::new(RedisPermissionBus::new(redis_client.clone()));
    let event_bus = Arc::new(RedisEventBus::new(redis_client.clone()));
    let gateway_sessions = Arc::new(RedisGatewaySessionStore::new(
        redis_client.clone(),
        config.gateway_replay_buffer,
    ));
    let thumbnail_queue = Arc::new(RedisThumbnailQueue::new(redis_client));

    // Crypto and delivery.
    let password_hasher = Arc::new(Argon2PasswordHasher::new(Argon2Config {
        memory_kib: config.argon2_memory_kib,
        iterations: config.argon2_iterations,
        parallelism: config.argon2_parallelism,
        output_length: 32,
    })?);
    let access_tokens = Arc::new(JwtAccessTokens::new(
        &config.jwt_secret,
        config.server_url.clone(),
        config.access_token_ttl_seconds,
    )?);
    let totp = Arc::new(TotpRsProvider::new(config.server_name.clone()));
    let secret_encryptor = Arc::new(AesSecretEncryptor::from_hex(&config.mfa_encryption_key)?);
    let identity_hasher = Arc::new(HmacIdentityHasher::from_hex(&config.server_secret)?);

    let email: Arc<dyn EmailService> = match config.smtp {
        Some(ref smtp) => Arc::new(SmtpEmailService::new(SmtpEmailConfig {
            host: smtp.host.clone(),
            port: smtp.port,
            username: smtp.username.clone(),
            password: smtp.password.clone(),
            from_address: smtp.from_address.clone(),
        })),
        None => Arc::new(ConsoleEmailService),
    };

    let blocklist_fetcher: Arc<dyn lodge_application::BlocklistFetcher> =
        match config.disposable_email_url {
            Some(ref url) => Arc::new(HttpBlocklistFetcher::new(url.clone())?),
            None => Arc::new(DisabledBlocklistFetcher),
        };
    let blocklist_service =
        BlocklistService::new(blocklist_fetcher, config.disposable_email_enabled);

    let searcher: Arc<dyn MessageSearcher> = match config.search_url {
        Some(ref url) => Arc::new(MeiliMessageSearcher::new(
            url.clone(),
            config.search_api_key.clone(),
            "messages",
        )?),
        None => Arc::new(DisabledSearcher),
    };

    let storage = Arc::new(FsStorageProvider::new(config.storage_root.clone()));

    // Services, leaves first.
    let permission_service = PermissionService::new(
        permission_queries,
        permission_cache.clone(),
        permission_bus.clone(),
        config.permission_cache_ttl,
    );

    let event_publisher = EventPublisher::new(
        members.clone(),
        permission_service.clone(),
        event_bus.clone(),
    );

    let auth_service = AuthService::new(
        AuthServiceDeps {
            users,
            verifications,
            recovery_codes,
            tombstones,
            login_attempts,
            refresh_tokens,
            mfa_tickets: mfa_store.clone(),
            pending_mfa: mfa_store,
            password_hasher,
            access_tokens,
            totp,
            secret_encryptor,
            identity_hasher,
            email,
            disposable_emails: Arc::new(blocklist_service.clone()),
            server_owner: server.clone(),
            permission_invalidator: Arc::new(permission_service.clone()),
        },
        AuthConfig {
            refresh_token_ttl: config.refresh_token_ttl,
            verification_token_ttl: config.verification_token_ttl,
            verification_cooldown: config.verification_cooldown,
            mfa_ticket_ttl: config.mfa_ticket_ttl,
            pending_mfa_ttl: config.pending_mfa_ttl,
            mfa_confirm_attempt_cap: config.mfa_confirm_attempt_cap,
            tombstone_usernames: config.tombstone_usernames,
            server_url: config.server_url.clone(),
            server_name: config.server_name.clone(),
        },
    );

    let member_service = MemberService::new(
        members.clone(),
        permission_service.clone(),
        event_publisher.clone(),
    );
    let channel_service = ChannelService::new(
        channels,
        permission_service.clone(),
        event_publisher.clone(),
    );
    let role_service = RoleService::new(
        roles,
        permission_service.clone(),
        event_publisher.clone(),
    );
    let invite_service = InviteService::new(
        invites,
        members.clone(),
        permission_service.clone(),
        event_publisher.clone(),
    );
    let message_service = MessageService::new(
        message_repo,
        searcher,
        member_service.clone(),
        permission_service.clone(),
        event_publisher.clone(),
    );
    let attachment_service = AttachmentService::new(
        attachments,
        storage,
        thumbnail_queue,
        member_service.clone(),
        config.upload_max_bytes,
    );

    Ok(AppState {
        auth_service,
        permission_service,
        channel_service,
        role_service,
        member_service,
        invite_service,
        message_service,
        attachment_service,
        blocklist_service,
        server_repository: server,
        member_repository: members,
        permission_cache,
        permission_bus,
        event_bus,
        gateway_sessions,
        gateway: GatewayRegistry::new(),
        gateway_config: GatewayConfig {
            heartbeat_interval: std::time::Duration::from_millis(config.gateway_heartbeat_ms),
            identify_window: std::time::Duration::from_millis(config.gateway_identify_ms),
            session_ttl: config.gateway_session_ttl,
            send_queue: config.gateway_send_queue,
        },
        server_name: config.server_name.clone(),
        server_url: config.server_url.clone(),
    })
}
