//! Message persistence, events, and search.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    AttachmentId, ChannelId, Message, MessageId, OutboundEvent, Permissions, RecipientSelector,
    UserId, event_names, validate_message_content,
};

use crate::event_service::EventPublisher;
use crate::member_service::MemberService;
use crate::permission_service::PermissionService;

/// Inputs for message creation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Author.
    pub author_id: UserId,
    /// Message body.
    pub content: String,
    /// Message being replied to, if any.
    pub reply_to: Option<MessageId>,
    /// Previously uploaded attachments to claim.
    pub attachment_ids: Vec<AttachmentId>,
}

/// Page request for channel history.
#[derive(Debug, Clone, Copy)]
pub struct HistoryPage {
    /// Return messages created before this one, if set.
    pub before: Option<MessageId>,
    /// Page size, clamped by the repository.
    pub limit: u32,
}

/// One hit from the external search engine.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Matching message.
    pub message_id: MessageId,
    /// Channel the message lives in.
    pub channel_id: ChannelId,
    /// Matching content (as indexed).
    pub content: String,
}

/// A message-search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict to one channel, if set.
    pub channel_id: Option<ChannelId>,
    /// Maximum hits to return after permission filtering.
    pub limit: u32,
}

/// Repository port for messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Inserts the message and claims its attachments in one transaction.
    async fn create(&self, new_message: &NewMessage) -> AppResult<Message>;

    /// Loads one message (including soft-deleted rows).
    async fn get(&self, message_id: MessageId) -> AppResult<Option<Message>>;

    /// Lists non-deleted channel history, newest first.
    async fn list_channel(
        &self,
        channel_id: ChannelId,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>>;

    /// Rewrites the content and stamps `edited_at`.
    async fn update_content(&self, message_id: MessageId, content: &str) -> AppResult<Message>;

    /// Soft-deletes the message.
    async fn soft_delete(&self, message_id: MessageId) -> AppResult<()>;

    /// Pins or unpins the message.
    async fn set_pinned(&self, message_id: MessageId, pinned: bool) -> AppResult<()>;

    /// Lists pinned messages of a channel.
    async fn list_pinned(&self, channel_id: ChannelId) -> AppResult<Vec<Message>>;
}

/// Port for the external search engine.
#[async_trait]
pub trait MessageSearcher: Send + Sync {
    /// Indexes (or re-indexes) a message.
    async fn index(&self, message: &Message) -> AppResult<()>;

    /// Removes a message from the index.
    async fn remove(&self, message_id: MessageId) -> AppResult<()>;

    /// Runs a free-text query. Results are unscoped; the caller applies
    /// permission filtering.
    async fn search(&self, request: &SearchRequest) -> AppResult<Vec<SearchHit>>;
}

/// Application service for messages.
#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    searcher: Arc<dyn MessageSearcher>,
    members: MemberService,
    permissions: PermissionService,
    publisher: EventPublisher,
}

impl MessageService {
    /// Creates a new message service.
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        searcher: Arc<dyn MessageSearcher>,
        members: MemberService,
        permissions: PermissionService,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            messages,
            searcher,
            members,
            permissions,
            publisher,
        }
    }

    /// Posts a message.
    ///
    /// Persistence commits first; the `MESSAGE_CREATE` publication follows
    /// in the same handler with no cross-store transaction. Indexing is
    /// best-effort: a search outage never loses a message.
    pub async fn send(&self, new_message: NewMessage) -> AppResult<Message> {
        validate_message_content(&new_message.content, !new_message.attachment_ids.is_empty())?;

        let mut required = Permissions::SEND_MESSAGES;
        if !new_message.attachment_ids.is_empty() {
            required = required | Permissions::ATTACH_FILES;
        }
        self.permissions
            .check(new_message.author_id, Some(new_message.channel_id), required)
            .await?;

        if let Some(reply_to) = new_message.reply_to {
            let parent = self
                .messages
                .get(reply_to)
                .await?
                .ok_or_else(|| AppError::NotFound("replied-to message not found".to_owned()))?;
            if parent.channel_id != new_message.channel_id {
                return Err(AppError::Validation(
                    "replies must stay in the same channel".to_owned(),
                ));
            }
        }

        let message = self.messages.create(&new_message).await?;

        self.publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_CREATE,
                json!(message),
                RecipientSelector::Channel {
                    channel_id: message.channel_id,
                },
            ))
            .await?;

        if let Err(error) = self.searcher.index(&message).await {
            warn!(message_id = %message.id, %error, "failed to index message");
        }

        Ok(message)
    }

    /// Reads a page of channel history.
    pub async fn history(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>> {
        self.permissions
            .check(user_id, Some(channel_id), Permissions::VIEW_CHANNELS)
            .await?;
        self.messages.list_channel(channel_id, page).await
    }

    /// Edits a message. Only the author may edit.
    pub async fn edit(
        &self,
        actor: UserId,
        message_id: MessageId,
        content: &str,
    ) -> AppResult<Message> {
        validate_message_content(content, false)?;
        let message = self.require_message(message_id).await?;
        if message.author_id != actor {
            return Err(AppError::Forbidden(
                "only the author can edit a message".to_owned(),
            ));
        }

        let updated = self.messages.update_content(message_id, content).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_UPDATE,
                json!(updated),
                RecipientSelector::Channel {
                    channel_id: updated.channel_id,
                },
            ))
            .await?;

        if let Err(error) = self.searcher.index(&updated).await {
            warn!(message_id = %updated.id, %error, "failed to re-index message");
        }

        Ok(updated)
    }

    /// Deletes a message: the author may always, others need
    /// `MANAGE_MESSAGES` in the channel.
    pub async fn delete(&self, actor: UserId, message_id: MessageId) -> AppResult<()> {
        let message = self.require_message(message_id).await?;
        if message.author_id != actor {
            self.permissions
                .check(actor, Some(message.channel_id), Permissions::MANAGE_MESSAGES)
                .await?;
        }

        self.messages.soft_delete(message_id).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_DELETE,
                json!({ "id": message_id, "channel_id": message.channel_id }),
                RecipientSelector::Channel {
                    channel_id: message.channel_id,
                },
            ))
            .await?;

        if let Err(error) = self.searcher.remove(message_id).await {
            warn!(%message_id, %error, "failed to remove message from index");
        }

        Ok(())
    }

    /// Pins or unpins a message.
    pub async fn set_pinned(
        &self,
        actor: UserId,
        message_id: MessageId,
        pinned: bool,
    ) -> AppResult<()> {
        let message = self.require_message(message_id).await?;
        self.permissions
            .check(actor, Some(message.channel_id), Permissions::PIN_MESSAGES)
            .await?;

        self.messages.set_pinned(message_id, pinned).await?;
        self.publisher
            .publish(OutboundEvent::new(
                event_names::MESSAGE_UPDATE,
                json!({ "id": message_id, "channel_id": message.channel_id, "pinned": pinned }),
                RecipientSelector::Channel {
                    channel_id: message.channel_id,
                },
            ))
            .await
    }

    /// Lists a channel's pinned messages.
    pub async fn pinned(&self, user_id: UserId, channel_id: ChannelId) -> AppResult<Vec<Message>> {
        self.permissions
            .check(user_id, Some(channel_id), Permissions::VIEW_CHANNELS)
            .await?;
        self.messages.list_pinned(channel_id).await
    }

    /// Searches message history, scoped to channels the caller can see.
    pub async fn search(
        &self,
        user_id: UserId,
        request: SearchRequest,
    ) -> AppResult<Vec<SearchHit>> {
        if request.query.trim().is_empty() {
            return Err(AppError::Validation("search query must not be empty".to_owned()));
        }
        if !self.members.is_active_member(user_id).await? {
            return Err(AppError::MembershipRequired);
        }

        let hits = self.searcher.search(&request).await?;
        if hits.is_empty() {
            return Ok(hits);
        }

        let channel_ids: Vec<ChannelId> = hits.iter().map(|hit| hit.channel_id).collect();
        let visible = self
            .permissions
            .filter_permitted(user_id, &channel_ids, Permissions::VIEW_CHANNELS)
            .await?;

        Ok(hits
            .into_iter()
            .zip(visible)
            .filter_map(|(hit, keep)| keep.then_some(hit))
            .collect())
    }

    async fn require_message(&self, message_id: MessageId) -> AppResult<Message> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("message not found".to_owned()))?;
        if message.deleted {
            return Err(AppError::NotFound("message not found".to_owned()));
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests;
