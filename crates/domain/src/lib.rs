//! Domain types for the Lodge chat server.
//!
//! Pure data and logic only: validated value types, identifier newtypes,
//! the permission bitfield and its resolution algorithm, and the gateway
//! wire protocol shapes. Nothing in this crate performs I/O.

#![forbid(unsafe_code)]

mod attachment;
mod channel;
mod gateway;
mod ids;
mod invite;
mod member;
mod message;
mod permissions;
mod resolution;
mod role;
mod server;
mod user;

pub use attachment::Attachment;
pub use channel::{
    CHANNEL_NAME_MAX_LENGTH, CHANNEL_TOPIC_MAX_LENGTH, Category, Channel, validate_channel_name,
    validate_channel_topic,
};
pub use gateway::{
    EventEnvelope, GatewayFrame, Opcode, OutboundEvent, RecipientSelector, event_names,
};
pub use ids::{AttachmentId, CategoryId, ChannelId, InviteId, MessageId, RoleId, SessionId, UserId};
pub use invite::{INVITE_CODE_LENGTH, Invite, validate_invite_code};
pub use member::{Member, MemberStatus, NICKNAME_MAX_LENGTH, validate_nickname};
pub use message::{MESSAGE_CONTENT_MAX_LENGTH, Message, validate_message_content};
pub use permissions::Permissions;
pub use resolution::{
    OverrideTarget, PermissionOverride, ResolutionInput, ResolvedRole, resolve_permissions,
};
pub use role::{ROLE_NAME_MAX_LENGTH, Role, validate_role_name};
pub use server::ServerConfig;
pub use user::{
    EMAIL_MAX_LENGTH, EmailAddress, PASSWORD_MAX_LENGTH, PASSWORD_MIN_LENGTH,
    USERNAME_MAX_LENGTH, USERNAME_MIN_LENGTH, User, UserProfile, Username, validate_password,
};
