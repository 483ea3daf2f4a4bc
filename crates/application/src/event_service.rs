//! Event publication: selector evaluation and the cross-process bus.

use std::sync::Arc;

use async_trait::async_trait;

use lodge_core::AppResult;
use lodge_domain::{EventEnvelope, OutboundEvent, Permissions, RecipientSelector};

use crate::member_service::MemberRepository;
use crate::permission_service::PermissionService;

/// Blocking receiver half of an event subscription.
#[async_trait]
pub trait EventReceiver: Send {
    /// Waits for the next published envelope.
    async fn recv(&mut self) -> AppResult<EventEnvelope>;
}

/// Cross-process channel carrying resolved event envelopes to every
/// gateway process.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an envelope.
    async fn publish(&self, envelope: &EventEnvelope) -> AppResult<()>;

    /// Opens a fresh subscription. Called again after transport failures.
    async fn subscribe(&self) -> AppResult<Box<dyn EventReceiver>>;
}

/// Turns domain events into envelopes with concrete recipient sets.
///
/// Selector evaluation happens here, at publish time; the gateway
/// processes only map recipient ids onto their local sessions.
#[derive(Clone)]
pub struct EventPublisher {
    members: Arc<dyn MemberRepository>,
    permissions: PermissionService,
    bus: Arc<dyn EventBus>,
}

impl EventPublisher {
    /// Creates a new publisher.
    #[must_use]
    pub fn new(
        members: Arc<dyn MemberRepository>,
        permissions: PermissionService,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            members,
            permissions,
            bus,
        }
    }

    /// Resolves the event's audience and publishes the envelope.
    pub async fn publish(&self, event: OutboundEvent) -> AppResult<()> {
        let recipients = match &event.selector {
            RecipientSelector::Server => self.members.list_user_ids(false).await?,
            RecipientSelector::User { user_id } => vec![*user_id],
            RecipientSelector::Channel { channel_id } => {
                self.channel_audience(*channel_id, Permissions::VIEW_CHANNELS)
                    .await?
            }
            RecipientSelector::ChannelWithPermission {
                channel_id,
                required,
            } => self.channel_audience(*channel_id, *required).await?,
        };

        self.bus
            .publish(&EventEnvelope {
                name: event.name,
                payload: event.payload,
                recipients,
            })
            .await
    }

    async fn channel_audience(
        &self,
        channel_id: lodge_domain::ChannelId,
        required: Permissions,
    ) -> AppResult<Vec<lodge_domain::UserId>> {
        let member_ids = self.members.list_user_ids(false).await?;
        let mut audience = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            let permitted = self
                .permissions
                .filter_permitted(user_id, &[channel_id], required)
                .await?;
            if permitted.first().copied().unwrap_or(false) {
                audience.push(user_id);
            }
        }
        Ok(audience)
    }
}

#[cfg(test)]
mod tests {
    use lodge_domain::{
        ChannelId, MemberStatus, OverrideTarget, PermissionOverride, UserId, event_names,
    };
    use serde_json::json;

    use crate::test_support::{
        FakeMemberRepository, PermissionWorld, RecordingEventBus, permission_service,
    };

    use super::*;

    struct World {
        publisher: EventPublisher,
        bus: std::sync::Arc<RecordingEventBus>,
        members: Vec<UserId>,
        channel: ChannelId,
    }

    /// Three active members; the third is denied VIEW_CHANNELS in the
    /// test channel by a user override.
    async fn world() -> World {
        let members: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
        let channel = ChannelId::new();

        let mut permission_world = PermissionWorld::default();
        permission_world.owner = Some(members[0]);
        for user_id in &members {
            permission_world
                .members
                .insert(*user_id, MemberStatus::Active);
        }
        permission_world.everyone(Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES);
        permission_world.overrides.insert(
            channel,
            vec![PermissionOverride {
                channel_id: channel,
                target: OverrideTarget::User(members[2]),
                allow: Permissions::NONE,
                deny: Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES,
            }],
        );

        let (permissions, _, _, _) = permission_service(permission_world);
        let member_repo = FakeMemberRepository::with_members(&members);
        let bus = RecordingEventBus::new();
        let publisher = EventPublisher::new(member_repo, permissions, bus.clone());

        World {
            publisher,
            bus,
            members,
            channel,
        }
    }

    #[tokio::test]
    async fn server_selector_reaches_every_member() {
        let world = world().await;
        let published = world
            .publisher
            .publish(OutboundEvent::new(
                event_names::ROLE_CREATE,
                json!({}),
                RecipientSelector::Server,
            ))
            .await;
        assert!(published.is_ok());

        let envelopes = world.bus.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].recipients.len(), 3);
    }

    #[tokio::test]
    async fn channel_selector_filters_by_view_permission() {
        let world = world().await;
        let published = world
            .publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_CREATE,
                json!({"id": "m1"}),
                RecipientSelector::Channel {
                    channel_id: world.channel,
                },
            ))
            .await;
        assert!(published.is_ok());

        let envelopes = world.bus.envelopes();
        assert_eq!(envelopes.len(), 1);
        let recipients = &envelopes[0].recipients;
        assert!(recipients.contains(&world.members[0]));
        assert!(recipients.contains(&world.members[1]));
        assert!(!recipients.contains(&world.members[2]));
    }

    #[tokio::test]
    async fn user_selector_targets_exactly_one_user() {
        let world = world().await;
        let published = world
            .publisher
            .publish(OutboundEvent::new(
                event_names::MEMBER_UPDATE,
                json!({}),
                RecipientSelector::User {
                    user_id: world.members[1],
                },
            ))
            .await;
        assert!(published.is_ok());
        assert_eq!(world.bus.envelopes()[0].recipients, vec![world.members[1]]);
    }

    #[tokio::test]
    async fn channel_with_permission_selector_uses_the_given_bits() {
        let world = world().await;
        // The owner short-circuits; member[1] holds SEND_MESSAGES via
        // @everyone; member[2] is denied by the override.
        let published = world
            .publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_CREATE,
                json!({}),
                RecipientSelector::ChannelWithPermission {
                    channel_id: world.channel,
                    required: Permissions::SEND_MESSAGES,
                },
            ))
            .await;
        assert!(published.is_ok());
        let recipients = &world.bus.envelopes()[0].recipients;
        assert_eq!(recipients.len(), 2);
        assert!(!recipients.contains(&world.members[2]));
    }
}
