//! Membership ports and moderation operations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    Member, MemberStatus, OutboundEvent, Permissions, RecipientSelector, UserId, event_names,
    validate_nickname,
};

use crate::event_service::EventPublisher;
use crate::permission_service::{PermissionInvalidator, PermissionService};

/// Repository port for server membership.
#[async_trait]
pub trait MemberRepository: Send + Sync {
    /// Loads one member.
    async fn get(&self, user_id: UserId) -> AppResult<Option<Member>>;

    /// Lists every member.
    async fn list(&self) -> AppResult<Vec<Member>>;

    /// Lists member user ids; pending members are included only on request.
    async fn list_user_ids(&self, include_pending: bool) -> AppResult<Vec<UserId>>;

    /// Inserts a membership row.
    async fn add(&self, user_id: UserId, status: MemberStatus) -> AppResult<Member>;

    /// Sets or clears the nickname.
    async fn update_nickname(&self, user_id: UserId, nickname: Option<&str>) -> AppResult<()>;

    /// Applies or lifts a timeout; `None` restores active status.
    async fn set_timeout(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> AppResult<()>;

    /// Removes the membership row and its role links.
    async fn remove(&self, user_id: UserId) -> AppResult<()>;

    /// Records a ban for the user.
    async fn ban(&self, user_id: UserId) -> AppResult<()>;

    /// Lifts a ban.
    async fn unban(&self, user_id: UserId) -> AppResult<()>;

    /// True when the user is banned.
    async fn is_banned(&self, user_id: UserId) -> AppResult<bool>;
}

/// Application service for membership and moderation.
#[derive(Clone)]
pub struct MemberService {
    members: Arc<dyn MemberRepository>,
    permissions: PermissionService,
    publisher: EventPublisher,
}

impl MemberService {
    /// Creates a new member service.
    #[must_use]
    pub fn new(
        members: Arc<dyn MemberRepository>,
        permissions: PermissionService,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            members,
            permissions,
            publisher,
        }
    }

    /// Loads a member, failing with `not_found` when absent.
    pub async fn require_member(&self, user_id: UserId) -> AppResult<Member> {
        self.members
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("member not found".to_owned()))
    }

    /// True when the user is an active (or timed-out) member.
    pub async fn is_active_member(&self, user_id: UserId) -> AppResult<bool> {
        Ok(matches!(
            self.members.get(user_id).await?.map(|member| member.status),
            Some(MemberStatus::Active | MemberStatus::TimedOut)
        ))
    }

    /// Lists every member for the roster view.
    pub async fn list(&self) -> AppResult<Vec<Member>> {
        self.members.list().await
    }

    /// Sets or clears the caller's own nickname.
    pub async fn update_own_nickname(
        &self,
        user_id: UserId,
        nickname: Option<&str>,
    ) -> AppResult<()> {
        if let Some(nickname) = nickname {
            validate_nickname(nickname)?;
        }
        self.members.update_nickname(user_id, nickname).await?;
        self.publish_member_update(user_id).await
    }

    /// Removes a member from the server.
    pub async fn kick(&self, actor: UserId, target: UserId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::KICK_MEMBERS)
            .await?;
        self.require_member(target).await?;

        self.members.remove(target).await?;
        self.permissions.invalidate_user(target).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_LEAVE,
                json!({ "user_id": target }),
                RecipientSelector::Server,
            ))
            .await
    }

    /// Bans a user, removing any membership they hold.
    pub async fn ban(&self, actor: UserId, target: UserId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::BAN_MEMBERS)
            .await?;

        self.members.ban(target).await?;
        if self.members.get(target).await?.is_some() {
            self.members.remove(target).await?;
            self.permissions.invalidate_user(target).await?;
            self.publisher
                .publish(OutboundEvent::new(
                    event_names::MEMBER_LEAVE,
                    json!({ "user_id": target }),
                    RecipientSelector::Server,
                ))
                .await?;
        }
        self.publisher
            .publish(OutboundEvent::new(
                event_names::BAN_ADD,
                json!({ "user_id": target }),
                RecipientSelector::Server,
            ))
            .await
    }

    /// Lifts a ban.
    pub async fn unban(&self, actor: UserId, target: UserId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::BAN_MEMBERS)
            .await?;
        self.members.unban(target).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::BAN_REMOVE,
                json!({ "user_id": target }),
                RecipientSelector::Server,
            ))
            .await
    }

    /// Places a member in timeout until the given instant.
    pub async fn timeout(
        &self,
        actor: UserId,
        target: UserId,
        until: DateTime<Utc>,
    ) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::TIMEOUT_MEMBERS)
            .await?;
        if until <= Utc::now() {
            return Err(AppError::Validation(
                "timeout must end in the future".to_owned(),
            ));
        }
        self.require_member(target).await?;

        self.members.set_timeout(target, Some(until)).await?;
        self.permissions.invalidate_user(target).await?;
        self.publish_member_update(target).await
    }

    /// Lifts a timeout early.
    pub async fn clear_timeout(&self, actor: UserId, target: UserId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::TIMEOUT_MEMBERS)
            .await?;
        self.require_member(target).await?;

        self.members.set_timeout(target, None).await?;
        self.permissions.invalidate_user(target).await?;
        self.publish_member_update(target).await
    }

    /// Removes the caller's own membership.
    pub async fn leave(&self, user_id: UserId) -> AppResult<()> {
        self.require_member(user_id).await?;
        self.members.remove(user_id).await?;
        self.permissions.invalidate_user(user_id).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_LEAVE,
                json!({ "user_id": user_id }),
                RecipientSelector::Server,
            ))
            .await
    }

    async fn publish_member_update(&self, user_id: UserId) -> AppResult<()> {
        let member = self.require_member(user_id).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_UPDATE,
                serde_json::to_value(&member).map_err(|error| {
                    AppError::Internal(format!("failed to serialise member: {error}"))
                })?,
                RecipientSelector::Server,
            ))
            .await
    }
}
