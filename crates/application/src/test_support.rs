//! Shared in-memory fakes for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    ChannelId, Member, MemberStatus, PermissionOverride, Permissions, ResolvedRole, RoleId,
    UserId,
};

use crate::event_service::{EventBus, EventReceiver};
use crate::member_service::MemberRepository;
use crate::permission_service::{
    InvalidationReceiver, InvalidationScope, PermissionCache, PermissionInvalidationBus,
    PermissionQueryRepository, PermissionService,
};

fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|error| AppError::Internal(format!("failed to lock test state: {error}")))
}

// ---------------------------------------------------------------------------
// Permission fakes
// ---------------------------------------------------------------------------

/// Mutable world state backing [`FakePermissionQueries`].
#[derive(Default)]
pub(crate) struct PermissionWorld {
    pub owner: Option<UserId>,
    pub members: HashMap<UserId, MemberStatus>,
    pub everyone_role: Option<ResolvedRole>,
    pub assigned: HashMap<UserId, Vec<ResolvedRole>>,
    pub overrides: HashMap<ChannelId, Vec<PermissionOverride>>,
}

impl PermissionWorld {
    pub fn everyone(&mut self, permissions: Permissions) -> RoleId {
        let role = ResolvedRole {
            id: RoleId::new(),
            position: 0,
            permissions,
            is_everyone: true,
        };
        let id = role.id;
        self.everyone_role = Some(role);
        id
    }
}

pub(crate) struct FakePermissionQueries {
    pub world: Mutex<PermissionWorld>,
    pub query_count: Mutex<u32>,
}

impl FakePermissionQueries {
    pub fn new(world: PermissionWorld) -> Arc<Self> {
        Arc::new(Self {
            world: Mutex::new(world),
            query_count: Mutex::new(0),
        })
    }

    pub fn queries_made(&self) -> u32 {
        self.query_count.lock().map(|guard| *guard).unwrap_or(0)
    }
}

#[async_trait]
impl PermissionQueryRepository for FakePermissionQueries {
    async fn owner_id(&self) -> AppResult<UserId> {
        lock(&self.world)?
            .owner
            .ok_or_else(|| AppError::Internal("no owner configured".to_owned()))
    }

    async fn member_status(&self, user_id: UserId) -> AppResult<Option<MemberStatus>> {
        *lock(&self.query_count)? += 1;
        Ok(lock(&self.world)?.members.get(&user_id).copied())
    }

    async fn roles_for_user(&self, user_id: UserId) -> AppResult<Vec<ResolvedRole>> {
        let world = lock(&self.world)?;
        let mut roles = Vec::new();
        if let Some(ref everyone) = world.everyone_role {
            roles.push(everyone.clone());
        }
        if let Some(assigned) = world.assigned.get(&user_id) {
            roles.extend(assigned.iter().cloned());
        }
        Ok(roles)
    }

    async fn overrides_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> AppResult<Vec<PermissionOverride>> {
        Ok(lock(&self.world)?
            .overrides
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryPermissionCache {
    entries: Mutex<HashMap<(UserId, Option<ChannelId>), Permissions>>,
}

impl InMemoryPermissionCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> AppResult<Option<Permissions>> {
        Ok(lock(&self.entries)?.get(&(user_id, channel_id)).copied())
    }

    async fn get_many(
        &self,
        user_id: UserId,
        channel_ids: &[ChannelId],
    ) -> AppResult<Vec<Option<Permissions>>> {
        let entries = lock(&self.entries)?;
        Ok(channel_ids
            .iter()
            .map(|channel_id| entries.get(&(user_id, Some(*channel_id))).copied())
            .collect())
    }

    async fn put(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
        permissions: Permissions,
        _ttl: Duration,
    ) -> AppResult<()> {
        lock(&self.entries)?.insert((user_id, channel_id), permissions);
        Ok(())
    }

    async fn evict_user(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.entries)?.retain(|(user, _), _| *user != user_id);
        Ok(())
    }

    async fn evict_channel(&self, channel_id: ChannelId) -> AppResult<()> {
        lock(&self.entries)?.retain(|(_, channel), _| *channel != Some(channel_id));
        Ok(())
    }

    async fn evict_all(&self) -> AppResult<()> {
        lock(&self.entries)?.clear();
        Ok(())
    }
}

pub(crate) struct RecordingInvalidationBus {
    pub published: Mutex<Vec<InvalidationScope>>,
    sender: tokio::sync::broadcast::Sender<InvalidationScope>,
}

impl RecordingInvalidationBus {
    pub fn new() -> Arc<Self> {
        let (sender, _) = tokio::sync::broadcast::channel(64);
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            sender,
        })
    }

    pub fn published_scopes(&self) -> Vec<InvalidationScope> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

struct BroadcastInvalidationReceiver {
    receiver: tokio::sync::broadcast::Receiver<InvalidationScope>,
}

#[async_trait]
impl InvalidationReceiver for BroadcastInvalidationReceiver {
    async fn recv(&mut self) -> AppResult<InvalidationScope> {
        self.receiver
            .recv()
            .await
            .map_err(|error| AppError::ServiceUnavailable(format!("bus closed: {error}")))
    }
}

#[async_trait]
impl PermissionInvalidationBus for RecordingInvalidationBus {
    async fn publish(&self, scope: &InvalidationScope) -> AppResult<()> {
        lock(&self.published)?.push(scope.clone());
        let _ = self.sender.send(scope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationReceiver>> {
        Ok(Box::new(BroadcastInvalidationReceiver {
            receiver: self.sender.subscribe(),
        }))
    }
}

/// Builds a permission service over the given world with fresh fakes.
pub(crate) fn permission_service(
    world: PermissionWorld,
) -> (
    PermissionService,
    Arc<FakePermissionQueries>,
    Arc<InMemoryPermissionCache>,
    Arc<RecordingInvalidationBus>,
) {
    let queries = FakePermissionQueries::new(world);
    let cache = InMemoryPermissionCache::new();
    let bus = RecordingInvalidationBus::new();
    let service = PermissionService::new(
        queries.clone(),
        cache.clone(),
        bus.clone(),
        Duration::minutes(5),
    );
    (service, queries, cache, bus)
}

// ---------------------------------------------------------------------------
// Member fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeMemberRepository {
    pub members: Mutex<HashMap<UserId, Member>>,
    pub banned: Mutex<HashSet<UserId>>,
}

impl FakeMemberRepository {
    pub fn with_members(user_ids: &[UserId]) -> Arc<Self> {
        let repo = Self::default();
        if let Ok(mut members) = repo.members.lock() {
            for user_id in user_ids {
                members.insert(*user_id, member(*user_id, MemberStatus::Active));
            }
        }
        Arc::new(repo)
    }
}

pub(crate) fn member(user_id: UserId, status: MemberStatus) -> Member {
    Member {
        user_id,
        status,
        nickname: None,
        timeout_until: None,
        role_ids: Vec::new(),
        joined_at: Utc::now(),
    }
}

#[async_trait]
impl MemberRepository for FakeMemberRepository {
    async fn get(&self, user_id: UserId) -> AppResult<Option<Member>> {
        Ok(lock(&self.members)?.get(&user_id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Member>> {
        Ok(lock(&self.members)?.values().cloned().collect())
    }

    async fn list_user_ids(&self, include_pending: bool) -> AppResult<Vec<UserId>> {
        let mut ids: Vec<UserId> = lock(&self.members)?
            .values()
            .filter(|member| include_pending || member.status != MemberStatus::Pending)
            .map(|member| member.user_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn add(&self, user_id: UserId, status: MemberStatus) -> AppResult<Member> {
        let new_member = member(user_id, status);
        lock(&self.members)?.insert(user_id, new_member.clone());
        Ok(new_member)
    }

    async fn update_nickname(&self, user_id: UserId, nickname: Option<&str>) -> AppResult<()> {
        let mut members = lock(&self.members)?;
        let entry = members
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("member not found".to_owned()))?;
        entry.nickname = nickname.map(str::to_owned);
        Ok(())
    }

    async fn set_timeout(&self, user_id: UserId, until: Option<DateTime<Utc>>) -> AppResult<()> {
        let mut members = lock(&self.members)?;
        let entry = members
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound("member not found".to_owned()))?;
        entry.timeout_until = until;
        entry.status = if until.is_some() {
            MemberStatus::TimedOut
        } else {
            MemberStatus::Active
        };
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.members)?.remove(&user_id);
        Ok(())
    }

    async fn ban(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.banned)?.insert(user_id);
        Ok(())
    }

    async fn unban(&self, user_id: UserId) -> AppResult<()> {
        lock(&self.banned)?.remove(&user_id);
        Ok(())
    }

    async fn is_banned(&self, user_id: UserId) -> AppResult<bool> {
        Ok(lock(&self.banned)?.contains(&user_id))
    }
}

// ---------------------------------------------------------------------------
// Event bus fake
// ---------------------------------------------------------------------------

pub(crate) struct RecordingEventBus {
    pub published: Mutex<Vec<lodge_domain::EventEnvelope>>,
    sender: tokio::sync::broadcast::Sender<lodge_domain::EventEnvelope>,
}

impl RecordingEventBus {
    pub fn new() -> Arc<Self> {
        let (sender, _) = tokio::sync::broadcast::channel(64);
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            sender,
        })
    }

    pub fn envelopes(&self) -> Vec<lodge_domain::EventEnvelope> {
        self.published
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

struct BroadcastEventReceiver {
    receiver: tokio::sync::broadcast::Receiver<lodge_domain::EventEnvelope>,
}

#[async_trait]
impl EventReceiver for BroadcastEventReceiver {
    async fn recv(&mut self) -> AppResult<lodge_domain::EventEnvelope> {
        self.receiver
            .recv()
            .await
            .map_err(|error| AppError::ServiceUnavailable(format!("bus closed: {error}")))
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, envelope: &lodge_domain::EventEnvelope) -> AppResult<()> {
        lock(&self.published)?.push(envelope.clone());
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> AppResult<Box<dyn EventReceiver>> {
        Ok(Box::new(BroadcastEventReceiver {
            receiver: self.sender.subscribe(),
        }))
    }
}
