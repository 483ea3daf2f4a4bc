//! Shared application state.

use std::sync::Arc;

use lodge_application::{
    AttachmentService, AuthService, BlocklistService, ChannelService, EventBus,
    GatewaySessionStore, InviteService, MemberRepository, MemberService, MessageService,
    PermissionCache, PermissionInvalidationBus, PermissionService, RoleService,
};
use lodge_infrastructure::PostgresServerRepository;

use crate::gateway::GatewayConfig;

/// Everything the handlers and the gateway need, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub permission_service: PermissionService,
    pub channel_service: ChannelService,
    pub role_service: RoleService,
    pub member_service: MemberService,
    pub invite_service: InviteService,
    pub message_service: MessageService,
    pub attachment_service: AttachmentService,
    pub blocklist_service: BlocklistService,
    pub server_repository: Arc<PostgresServerRepository>,
    pub member_repository: Arc<dyn MemberRepository>,
    pub permission_cache: Arc<dyn PermissionCache>,
    pub permission_bus: Arc<dyn PermissionInvalidationBus>,
    pub event_bus: Arc<dyn EventBus>,
    pub gateway_sessions: Arc<dyn GatewaySessionStore>,
    pub gateway: Arc<crate::gateway::GatewayRegistry>,
    pub gateway_config: GatewayConfig,
    pub server_name: String,
    pub server_url: String,
}
