//! Category, channel, and permission-override management.

use std::sync::Arc;

use async_trait::async_trait;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    Category, CategoryId, Channel, ChannelId, OutboundEvent, OverrideTarget, PermissionOverride,
    Permissions, RecipientSelector, UserId, event_names, validate_channel_name,
    validate_channel_topic,
};
use serde_json::json;

use crate::event_service::EventPublisher;
use crate::permission_service::{PermissionInvalidator, PermissionService};

/// Inputs for channel creation.
#[derive(Debug, Clone)]
pub struct NewChannel {
    /// Owning category, if any.
    pub category_id: Option<CategoryId>,
    /// Display name.
    pub name: String,
    /// Channel topic, if any.
    pub topic: Option<String>,
    /// Sort position within the category.
    pub position: i32,
    /// True for voice channels.
    pub voice: bool,
}

/// Partial update for a channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    /// New name, if changing.
    pub name: Option<String>,
    /// New topic; `Some(None)` clears it.
    pub topic: Option<Option<String>>,
    /// New position, if changing.
    pub position: Option<i32>,
    /// New category; `Some(None)` detaches.
    pub category_id: Option<Option<CategoryId>>,
}

/// Repository port for categories, channels, and overrides.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Inserts a category.
    async fn create_category(&self, name: &str, position: i32) -> AppResult<Category>;

    /// Updates a category's name and/or position.
    async fn update_category(
        &self,
        category_id: CategoryId,
        name: Option<&str>,
        position: Option<i32>,
    ) -> AppResult<Category>;

    /// Deletes a category, detaching its channels.
    async fn delete_category(&self, category_id: CategoryId) -> AppResult<()>;

    /// Lists categories ordered by position.
    async fn list_categories(&self) -> AppResult<Vec<Category>>;

    /// Inserts a channel.
    async fn create_channel(&self, new_channel: &NewChannel) -> AppResult<Channel>;

    /// Loads one channel.
    async fn get_channel(&self, channel_id: ChannelId) -> AppResult<Option<Channel>>;

    /// Applies a partial update.
    async fn update_channel(
        &self,
        channel_id: ChannelId,
        update: &ChannelUpdate,
    ) -> AppResult<Channel>;

    /// Deletes a channel and its overrides and messages.
    async fn delete_channel(&self, channel_id: ChannelId) -> AppResult<()>;

    /// Lists channels ordered by category and position.
    async fn list_channels(&self) -> AppResult<Vec<Channel>>;

    /// Upserts an override for a role or user in a channel.
    async fn set_override(&self, entry: &PermissionOverride) -> AppResult<()>;

    /// Removes an override.
    async fn remove_override(
        &self,
        channel_id: ChannelId,
        target: OverrideTarget,
    ) -> AppResult<()>;

    /// Lists a channel's overrides.
    async fn list_overrides(&self, channel_id: ChannelId) -> AppResult<Vec<PermissionOverride>>;
}

/// Application service for channel structure.
#[derive(Clone)]
pub struct ChannelService {
    channels: Arc<dyn ChannelRepository>,
    permissions: PermissionService,
    publisher: EventPublisher,
}

impl ChannelService {
    /// Creates a new channel service.
    #[must_use]
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        permissions: PermissionService,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            channels,
            permissions,
            publisher,
        }
    }

    /// Loads a channel, failing with `not_found` when absent.
    pub async fn require_channel(&self, channel_id: ChannelId) -> AppResult<Channel> {
        self.channels
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound("channel not found".to_owned()))
    }

    /// Lists channels the user can see.
    pub async fn list_visible(&self, user_id: UserId) -> AppResult<Vec<Channel>> {
        let channels = self.channels.list_channels().await?;
        let ids: Vec<ChannelId> = channels.iter().map(|channel| channel.id).collect();
        let visible = self
            .permissions
            .filter_permitted(user_id, &ids, Permissions::VIEW_CHANNELS)
            .await?;
        Ok(channels
            .into_iter()
            .zip(visible)
            .filter_map(|(channel, keep)| keep.then_some(channel))
            .collect())
    }

    /// Lists categories.
    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.channels.list_categories().await
    }

    /// Creates a category.
    pub async fn create_category(
        &self,
        actor: UserId,
        name: &str,
        position: i32,
    ) -> AppResult<Category> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_CHANNELS)
            .await?;
        validate_channel_name(name)?;

        let category = self.channels.create_category(name, position).await?;
        self.publish_structure_event(event_names::CATEGORY_CREATE, json!(category))
            .await?;
        Ok(category)
    }

    /// Renames or repositions a category.
    pub async fn update_category(
        &self,
        actor: UserId,
        category_id: CategoryId,
        name: Option<&str>,
        position: Option<i32>,
    ) -> AppResult<Category> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_CHANNELS)
            .await?;
        if let Some(name) = name {
            validate_channel_name(name)?;
        }

        let category = self
            .channels
            .update_category(category_id, name, position)
            .await?;
        self.publish_structure_event(event_names::CATEGORY_UPDATE, json!(category))
            .await?;
        Ok(category)
    }

    /// Deletes a category; its channels become top-level.
    pub async fn delete_category(&self, actor: UserId, category_id: CategoryId) -> AppResult<()> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_CHANNELS)
            .await?;

        self.channels.delete_category(category_id).await?;
        self.publish_structure_event(
            event_names::CATEGORY_DELETE,
            json!({ "id": category_id }),
        )
        .await
    }

    /// Creates a channel.
    pub async fn create_channel(&self, actor: UserId, new_channel: NewChannel) -> AppResult<Channel> {
        self.permissions
            .check(actor, None, Permissions::MANAGE_CHANNELS)
            .await?;
        validate_channel_name(&new_channel.name)?;
        if let Some(ref topic) = new_channel.topic {
            validate_channel_topic(topic)?;
        }

        let channel = self.channels.create_channel(&new_channel).await?;
        self.publish_structure_event(event_names::CHANNEL_CREATE, json!(channel))
            .await?;
        Ok(channel)
    }

    /// Applies a partial channel update.
    pub async fn update_channel(
        &self,
        actor: UserId,
        channel_id: ChannelId,
        update: ChannelUpdate,
    ) -> AppResult<Channel> {
        self.permissions
            .check(actor, Some(channel_id), Permissions::MANAGE_CHANNELS)
            .await?;
        if let Some(ref name) = update.name {
            validate_channel_name(name)?;
        }
        if let Some(Some(ref topic)) = update.topic {
            validate_channel_topic(topic)?;
        }

        let channel = self.channels.update_channel(channel_id, &update).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::CHANNEL_UPDATE,
                json!(channel),
                RecipientSelector::Channel { channel_id },
            ))
            .await?;
        Ok(channel)
    }

    /// Deletes a channel.
    pub async fn delete_channel(&self, actor: UserId, channel_id: ChannelId) -> AppResult<()> {
        self.permissions
            .check(actor, Some(channel_id), Permissions::MANAGE_CHANNELS)
            .await?;
        self.require_channel(channel_id).await?;

        self.channels.delete_channel(channel_id).await?;
        self.permissions.invalidate_channel(channel_id).await?;
        self.publish_structure_event(event_names::CHANNEL_DELETE, json!({ "id": channel_id }))
            .await
    }

    /// Lists a channel's permission overrides.
    pub async fn list_overrides(
        &self,
        actor: UserId,
        channel_id: ChannelId,
    ) -> AppResult<Vec<PermissionOverride>> {
        self.permissions
            .check(actor, Some(channel_id), Permissions::MANAGE_ROLES)
            .await?;
        self.channels.list_overrides(channel_id).await
    }

    /// Creates or replaces an override. Invalidation is published before
    /// returning so other processes cannot serve stale grants.
    pub async fn set_override(
        &self,
        actor: UserId,
        entry: PermissionOverride,
    ) -> AppResult<()> {
        self.permissions
            .check(actor, Some(entry.channel_id), Permissions::MANAGE_ROLES)
            .await?;
        self.require_channel(entry.channel_id).await?;

        self.channels.set_override(&entry).await?;
        self.permissions.invalidate_channel(entry.channel_id).await?;
        self.publish_override_event(entry.channel_id).await
    }

    /// Removes an override.
    pub async fn remove_override(
        &self,
        actor: UserId,
        channel_id: ChannelId,
        target: OverrideTarget,
    ) -> AppResult<()> {
        self.permissions
            .check(actor, Some(channel_id), Permissions::MANAGE_ROLES)
            .await?;

        self.channels.remove_override(channel_id, target).await?;
        self.permissions.invalidate_channel(channel_id).await?;
        self.publish_override_event(channel_id).await
    }

    async fn publish_override_event(&self, channel_id: ChannelId) -> AppResult<()> {
        let overrides = self.channels.list_overrides(channel_id).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::PERMISSION_OVERRIDE_UPDATE,
                json!({ "channel_id": channel_id, "overrides": overrides }),
                RecipientSelector::Channel { channel_id },
            ))
            .await
    }

    async fn publish_structure_event(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> AppResult<()> {
        self.publisher
            .publish(OutboundEvent::new(name, payload, RecipientSelector::Server))
            .await
    }
}
