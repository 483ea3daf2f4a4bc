//! Application services and ports for the Lodge chat server.
//!
//! Each service owns its repository/store ports as traits; infrastructure
//! provides Postgres, Redis, SMTP, and HTTP implementations, and tests
//! substitute in-memory fakes.

#![forbid(unsafe_code)]

mod attachment_service;
mod auth_service;
mod blocklist_service;
mod channel_service;
mod event_service;
mod gateway_sessions;
mod invite_service;
mod member_service;
mod message_service;
mod permission_service;
mod purge_service;
mod role_service;
mod supervisor;

pub use attachment_service::{
    AttachmentRepository, AttachmentService, StorageProvider, ThumbnailJob, ThumbnailQueue,
};
pub use auth_service::{
    AccessTokenIssuer, AuthConfig, AuthService, AuthServiceDeps, DisposableEmailPolicy,
    EmailService, IdentityHasher, LoginAttemptRepository, LoginOutcome, MfaEnrollment,
    MfaTicketStore, NewUser, PasswordHasher, PendingMfaStore, RECOVERY_CODE_COUNT,
    RecoveryCodeRecord, RecoveryCodeRepository, RefreshTokenStore, RegisterOutcome,
    RegisterParams, RotateStatus, SecretEncryptor, ServerOwnerSource, TokenPair,
    TombstoneEntry, TombstoneKind, TombstoneRepository, TotpProvider, UserRecord, UserRepository,
    VerificationTokenRepository,
};
pub use blocklist_service::{BlocklistFetcher, BlocklistService};
pub use channel_service::{ChannelRepository, ChannelService, ChannelUpdate, NewChannel};
pub use event_service::{EventBus, EventPublisher, EventReceiver};
pub use gateway_sessions::{GatewaySessionStore, SessionRecord, mint_session_id};
pub use invite_service::{InviteRepository, InviteService, RedeemOutcome};
pub use member_service::{MemberRepository, MemberService};
pub use message_service::{
    HistoryPage, MessageRepository, MessageSearcher, MessageService, NewMessage, SearchHit,
    SearchRequest,
};
pub use permission_service::{
    InvalidationReceiver, InvalidationScope, PermissionCache, PermissionInvalidationBus,
    PermissionInvalidator, PermissionQueryRepository, PermissionService,
    run_invalidation_subscriber,
};
pub use purge_service::{PurgeConfig, PurgeService};
pub use role_service::{RoleRepository, RoleService, RoleUpdate};
pub use supervisor::{run_interval, run_supervised};

#[cfg(test)]
pub(crate) mod test_support;
