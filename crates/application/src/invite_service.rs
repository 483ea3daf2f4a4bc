//! Invite creation and redemption.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    ChannelId, INVITE_CODE_LENGTH, Invite, InviteId, Member, MemberStatus, OutboundEvent,
    Permissions, RecipientSelector, UserId, event_names, validate_invite_code,
};

use crate::event_service::EventPublisher;
use crate::member_service::MemberRepository;
use crate::permission_service::PermissionService;

/// Outcome of an atomic redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The use-count was incremented under the guards.
    Redeemed(Box<Invite>),
    /// No such code.
    NotFound,
    /// The invite is past its expiry or use cap.
    NotRedeemable,
}

/// Repository port for invites.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    /// Inserts an invite.
    async fn create(
        &self,
        code: &str,
        channel_id: ChannelId,
        creator_id: UserId,
        max_uses: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Invite>;

    /// Loads an invite by code.
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Invite>>;

    /// Lists every invite.
    async fn list(&self) -> AppResult<Vec<Invite>>;

    /// Deletes an invite.
    async fn delete(&self, invite_id: InviteId) -> AppResult<()>;

    /// Atomically increments the use count, guarded by the expiry and
    /// use-cap columns so concurrent redemptions cannot overshoot.
    async fn redeem(&self, code: &str, now: DateTime<Utc>) -> AppResult<RedeemOutcome>;
}

/// Application service for invites.
#[derive(Clone)]
pub struct InviteService {
    invites: Arc<dyn InviteRepository>,
    members: Arc<dyn MemberRepository>,
    permissions: PermissionService,
    publisher: EventPublisher,
}

impl InviteService {
    /// Creates a new invite service.
    #[must_use]
    pub fn new(
        invites: Arc<dyn InviteRepository>,
        members: Arc<dyn MemberRepository>,
        permissions: PermissionService,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            invites,
            members,
            permissions,
            publisher,
        }
    }

    /// Creates an invite into a channel.
    pub async fn create(
        &self,
        actor: UserId,
        channel_id: ChannelId,
        max_uses: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<Invite> {
        self.permissions
            .check(actor, Some(channel_id), Permissions::CREATE_INVITES)
            .await?;
        if let Some(max_uses) = max_uses
            && max_uses <= 0
        {
            return Err(AppError::Validation(
                "max_uses must be positive".to_owned(),
            ));
        }

        let code = generate_invite_code()?;
        self.invites
            .create(&code, channel_id, actor, max_uses, expires_at)
            .await
    }

    /// Lists invites for management views.
    pub async fn list(&self, actor: UserId) -> AppResult<Vec<Invite>> {
        self.permissions
            .check(actor, None, Permissions::CREATE_INVITES)
            .await?;
        self.invites.list().await
    }

    /// Deletes an invite; allowed for its creator or channel managers.
    pub async fn delete(&self, actor: UserId, invite_id: InviteId) -> AppResult<()> {
        let invite = self
            .invites
            .list()
            .await?
            .into_iter()
            .find(|invite| invite.id == invite_id)
            .ok_or_else(|| AppError::NotFound("invite not found".to_owned()))?;

        if invite.creator_id != actor {
            self.permissions
                .check(actor, Some(invite.channel_id), Permissions::MANAGE_CHANNELS)
                .await?;
        }

        self.invites.delete(invite_id).await
    }

    /// Redeems an invite code, joining the caller as an active member.
    pub async fn join(&self, user_id: UserId, code: &str) -> AppResult<Member> {
        validate_invite_code(code)?;

        if self.members.is_banned(user_id).await? {
            return Err(AppError::Forbidden("you are banned from this server".to_owned()));
        }
        if self.members.get(user_id).await?.is_some() {
            return Err(AppError::Conflict("already a member".to_owned()));
        }

        let invite = match self.invites.redeem(code, Utc::now()).await? {
            RedeemOutcome::Redeemed(invite) => invite,
            RedeemOutcome::NotFound => {
                return Err(AppError::NotFound("invite not found".to_owned()));
            }
            RedeemOutcome::NotRedeemable => {
                return Err(AppError::Validation(
                    "invite is expired or exhausted".to_owned(),
                ));
            }
        };

        let member = self.members.add(user_id, MemberStatus::Active).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_JOIN,
                json!({ "member": member, "channel_id": invite.channel_id }),
                RecipientSelector::Server,
            ))
            .await?;
        Ok(member)
    }
}

/// Generates a random URL-safe invite code.
fn generate_invite_code() -> AppResult<String> {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    let mut bytes = [0u8; INVITE_CODE_LENGTH];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate invite code: {error}")))?;

    Ok(bytes
        .iter()
        .map(|byte| ALPHABET[*byte as usize % ALPHABET.len()] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::generate_invite_code;
    use lodge_domain::validate_invite_code;

    #[test]
    fn generated_codes_validate() {
        for _ in 0..32 {
            let code = generate_invite_code().unwrap_or_default();
            assert!(validate_invite_code(&code).is_ok(), "bad code: {code}");
        }
    }
}
