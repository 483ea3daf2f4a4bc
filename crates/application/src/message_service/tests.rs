use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    ChannelId, MemberStatus, Message, MessageId, OverrideTarget, PermissionOverride, Permissions,
    UserId, event_names,
};

use crate::member_service::MemberService;
use crate::test_support::{
    FakeMemberRepository, PermissionWorld, RecordingEventBus, permission_service,
};

use super::*;

fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|error| AppError::Internal(format!("failed to lock test state: {error}")))
}

#[derive(Default)]
struct FakeMessages {
    rows: Mutex<HashMap<MessageId, Message>>,
}

#[async_trait]
impl MessageRepository for FakeMessages {
    async fn create(&self, new_message: &NewMessage) -> AppResult<Message> {
        let message = Message {
            id: MessageId::new(),
            channel_id: new_message.channel_id,
            author_id: new_message.author_id,
            content: new_message.content.clone(),
            reply_to: new_message.reply_to,
            pinned: false,
            deleted: false,
            attachment_ids: new_message.attachment_ids.clone(),
            created_at: Utc::now(),
            edited_at: None,
        };
        lock(&self.rows)?.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, message_id: MessageId) -> AppResult<Option<Message>> {
        Ok(lock(&self.rows)?.get(&message_id).cloned())
    }

    async fn list_channel(
        &self,
        channel_id: ChannelId,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>> {
        let mut messages: Vec<Message> = lock(&self.rows)?
            .values()
            .filter(|message| message.channel_id == channel_id && !message.deleted)
            .cloned()
            .collect();
        messages.sort_by_key(|message| std::cmp::Reverse(message.created_at));
        messages.truncate(page.limit as usize);
        Ok(messages)
    }

    async fn update_content(&self, message_id: MessageId, content: &str) -> AppResult<Message> {
        let mut rows = lock(&self.rows)?;
        let message = rows
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message not found".to_owned()))?;
        message.content = content.to_owned();
        message.edited_at = Some(Utc::now());
        Ok(message.clone())
    }

    async fn soft_delete(&self, message_id: MessageId) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let message = rows
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message not found".to_owned()))?;
        message.deleted = true;
        Ok(())
    }

    async fn set_pinned(&self, message_id: MessageId, pinned: bool) -> AppResult<()> {
        let mut rows = lock(&self.rows)?;
        let message = rows
            .get_mut(&message_id)
            .ok_or_else(|| AppError::NotFound("message not found".to_owned()))?;
        message.pinned = pinned;
        Ok(())
    }

    async fn list_pinned(&self, channel_id: ChannelId) -> AppResult<Vec<Message>> {
        Ok(lock(&self.rows)?
            .values()
            .filter(|message| {
                message.channel_id == channel_id && message.pinned && !message.deleted
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeSearcher {
    hits: Mutex<Vec<SearchHit>>,
    indexed: Mutex<Vec<MessageId>>,
    fail_indexing: bool,
}

#[async_trait]
impl MessageSearcher for FakeSearcher {
    async fn index(&self, message: &Message) -> AppResult<()> {
        if self.fail_indexing {
            return Err(AppError::ServiceUnavailable("search down".to_owned()));
        }
        lock(&self.indexed)?.push(message.id);
        Ok(())
    }

    async fn remove(&self, _message_id: MessageId) -> AppResult<()> {
        Ok(())
    }

    async fn search(&self, _request: &SearchRequest) -> AppResult<Vec<SearchHit>> {
        Ok(lock(&self.hits)?.clone())
    }
}

struct World {
    service: MessageService,
    bus: Arc<RecordingEventBus>,
    searcher: Arc<FakeSearcher>,
    author: UserId,
    muted: UserId,
    channel: ChannelId,
    hidden_channel: ChannelId,
}

/// Two channels; `muted` is denied SEND_MESSAGES everywhere and denied
/// VIEW_CHANNELS in the hidden channel.
fn world_with(fail_indexing: bool) -> World {
    let author = UserId::new();
    let muted = UserId::new();
    let channel = ChannelId::new();
    let hidden_channel = ChannelId::new();

    let mut permission_world = PermissionWorld::default();
    permission_world.owner = Some(UserId::new());
    permission_world.members.insert(author, MemberStatus::Active);
    permission_world.members.insert(muted, MemberStatus::Active);
    permission_world.everyone(
        Permissions::VIEW_CHANNELS | Permissions::SEND_MESSAGES | Permissions::ATTACH_FILES,
    );
    permission_world.overrides.insert(
        channel,
        vec![PermissionOverride {
            channel_id: channel,
            target: OverrideTarget::User(muted),
            allow: Permissions::NONE,
            deny: Permissions::SEND_MESSAGES,
        }],
    );
    permission_world.overrides.insert(
        hidden_channel,
        vec![PermissionOverride {
            channel_id: hidden_channel,
            target: OverrideTarget::User(muted),
            allow: Permissions::NONE,
            deny: Permissions::VIEW_CHANNELS,
        }],
    );

    let (permissions, _, _, _) = permission_service(permission_world);
    let members = FakeMemberRepository::with_members(&[author, muted]);
    let bus = RecordingEventBus::new();
    let publisher = EventPublisher::new(members.clone(), permissions.clone(), bus.clone());
    let member_service = MemberService::new(members, permissions.clone(), publisher.clone());
    let searcher = Arc::new(FakeSearcher {
        fail_indexing,
        ..FakeSearcher::default()
    });

    let service = MessageService::new(
        Arc::new(FakeMessages::default()),
        searcher.clone(),
        member_service,
        permissions,
        publisher,
    );

    World {
        service,
        bus,
        searcher,
        author,
        muted,
        channel,
        hidden_channel,
    }
}

fn new_message(world: &World, author: UserId, content: &str) -> NewMessage {
    NewMessage {
        channel_id: world.channel,
        author_id: author,
        content: content.to_owned(),
        reply_to: None,
        attachment_ids: Vec::new(),
    }
}

#[tokio::test]
async fn send_publishes_message_create_to_the_channel_audience() {
    let world = world_with(false);
    let sent = world
        .service
        .send(new_message(&world, world.author, "hello"))
        .await;
    let sent = match sent {
        Ok(message) => message,
        Err(error) => panic!("send should succeed: {error}"),
    };

    let envelopes = world.bus.envelopes();
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].name, event_names::MESSAGE_CREATE);
    assert!(envelopes[0].recipients.contains(&world.author));

    let indexed = world.searcher.indexed.lock().map(|i| i.clone()).unwrap_or_default();
    assert_eq!(indexed, vec![sent.id]);
}

#[tokio::test]
async fn denied_sender_cannot_post() {
    let world = world_with(false);
    let denied = world
        .service
        .send(new_message(&world, world.muted, "hello"))
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
    assert!(world.bus.envelopes().is_empty());
}

#[tokio::test]
async fn search_outage_does_not_lose_the_message() {
    let world = world_with(true);
    let sent = world
        .service
        .send(new_message(&world, world.author, "hello"))
        .await;
    assert!(sent.is_ok(), "indexing failures are best-effort");
    assert_eq!(world.bus.envelopes().len(), 1);
}

#[tokio::test]
async fn replies_must_stay_in_the_same_channel() {
    let world = world_with(false);
    let parent = world
        .service
        .send(new_message(&world, world.author, "parent"))
        .await;
    let parent = match parent {
        Ok(message) => message,
        Err(error) => panic!("send should succeed: {error}"),
    };

    let mut cross_channel = new_message(&world, world.author, "reply");
    cross_channel.channel_id = world.hidden_channel;
    cross_channel.reply_to = Some(parent.id);
    let rejected = world.service.send(cross_channel).await;
    assert!(matches!(rejected, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn only_the_author_can_edit() {
    let world = world_with(false);
    let sent = world
        .service
        .send(new_message(&world, world.author, "original"))
        .await;
    let sent = match sent {
        Ok(message) => message,
        Err(error) => panic!("send should succeed: {error}"),
    };

    let forbidden = world.service.edit(world.muted, sent.id, "hijacked").await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let edited = world.service.edit(world.author, sent.id, "fixed").await;
    assert!(matches!(edited, Ok(ref message) if message.content == "fixed"));
}

#[tokio::test]
async fn delete_needs_authorship_or_manage_messages() {
    let world = world_with(false);
    let sent = world
        .service
        .send(new_message(&world, world.author, "target"))
        .await;
    let sent = match sent {
        Ok(message) => message,
        Err(error) => panic!("send should succeed: {error}"),
    };

    let forbidden = world.service.delete(world.muted, sent.id).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let deleted = world.service.delete(world.author, sent.id).await;
    assert!(deleted.is_ok());

    // Deleted messages disappear from history and from edit targets.
    let history = world
        .service
        .history(
            world.author,
            world.channel,
            HistoryPage {
                before: None,
                limit: 50,
            },
        )
        .await;
    assert!(matches!(history, Ok(ref messages) if messages.is_empty()));
    let gone = world.service.edit(world.author, sent.id, "zombie").await;
    assert!(matches!(gone, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn search_results_are_scoped_to_visible_channels() {
    let world = world_with(false);
    if let Ok(mut hits) = world.searcher.hits.lock() {
        hits.push(SearchHit {
            message_id: MessageId::new(),
            channel_id: world.channel,
            content: "visible".to_owned(),
        });
        hits.push(SearchHit {
            message_id: MessageId::new(),
            channel_id: world.hidden_channel,
            content: "hidden".to_owned(),
        });
    }

    let results = world
        .service
        .search(
            world.muted,
            SearchRequest {
                query: "anything".to_owned(),
                channel_id: None,
                limit: 25,
            },
        )
        .await;
    let results = match results {
        Ok(results) => results,
        Err(error) => panic!("search should succeed: {error}"),
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "visible");
}

#[tokio::test]
async fn non_members_cannot_search() {
    let world = world_with(false);
    let stranger = UserId::new();
    let denied = world
        .service
        .search(
            stranger,
            SearchRequest {
                query: "anything".to_owned(),
                channel_id: None,
                limit: 25,
            },
        )
        .await;
    assert!(matches!(denied, Err(AppError::MembershipRequired)));
}
