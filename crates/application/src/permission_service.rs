//! Permission resolution: ports, cache-aside service, and cross-process
//! invalidation.
//!
//! The resolver is the hottest read path in the server. Resolved bitfields
//! are cached per `(user, channel-or-global)` in the shared coordination
//! store with a TTL; every mutation that can change an outcome publishes
//! an invalidation message that all processes consume.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use lodge_core::{AppError, AppResult};
use lodge_domain::{
    ChannelId, MemberStatus, PermissionOverride, Permissions, ResolutionInput, ResolvedRole,
    UserId, resolve_permissions,
};

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Read-side repository feeding the resolver.
#[async_trait]
pub trait PermissionQueryRepository: Send + Sync {
    /// The designated server owner.
    async fn owner_id(&self) -> AppResult<UserId>;

    /// The user's membership status, or `None` for non-members.
    async fn member_status(&self, user_id: UserId) -> AppResult<Option<MemberStatus>>;

    /// The `@everyone` role plus every role assigned to the user.
    async fn roles_for_user(&self, user_id: UserId) -> AppResult<Vec<ResolvedRole>>;

    /// Every override scoped to the channel.
    async fn overrides_for_channel(
        &self,
        channel_id: ChannelId,
    ) -> AppResult<Vec<PermissionOverride>>;
}

/// Shared cache of resolved bitfields.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Reads one entry.
    async fn get(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> AppResult<Option<Permissions>>;

    /// Reads one entry per channel in a single round trip where possible.
    async fn get_many(
        &self,
        user_id: UserId,
        channel_ids: &[ChannelId],
    ) -> AppResult<Vec<Option<Permissions>>>;

    /// Writes one entry with a TTL.
    async fn put(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
        permissions: Permissions,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Evicts every entry of the user.
    async fn evict_user(&self, user_id: UserId) -> AppResult<()>;

    /// Evicts every entry scoped to the channel.
    async fn evict_channel(&self, channel_id: ChannelId) -> AppResult<()>;

    /// Evicts everything.
    async fn evict_all(&self) -> AppResult<()>;
}

/// What an invalidation message names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum InvalidationScope {
    /// Evict every entry of one user.
    User(UserId),
    /// Evict every entry of one channel.
    Channel(ChannelId),
    /// Evict everything.
    All,
}

/// Blocking receiver half of an invalidation subscription.
#[async_trait]
pub trait InvalidationReceiver: Send {
    /// Waits for the next invalidation message.
    async fn recv(&mut self) -> AppResult<InvalidationScope>;
}

/// Cross-process invalidation channel.
#[async_trait]
pub trait PermissionInvalidationBus: Send + Sync {
    /// Publishes an invalidation to every process.
    async fn publish(&self, scope: &InvalidationScope) -> AppResult<()>;

    /// Opens a fresh subscription. Called again after transport failures,
    /// so implementations reconnect by construction.
    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationReceiver>>;
}

/// Narrow port for components that only need to invalidate (e.g. account
/// deletion), keeping them decoupled from the full service.
#[async_trait]
pub trait PermissionInvalidator: Send + Sync {
    /// Evicts and broadcasts for one user.
    async fn invalidate_user(&self, user_id: UserId) -> AppResult<()>;

    /// Evicts and broadcasts for one channel.
    async fn invalidate_channel(&self, channel_id: ChannelId) -> AppResult<()>;

    /// Evicts and broadcasts everything.
    async fn invalidate_all(&self) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Cache-aside permission resolver.
#[derive(Clone)]
pub struct PermissionService {
    queries: Arc<dyn PermissionQueryRepository>,
    cache: Arc<dyn PermissionCache>,
    bus: Arc<dyn PermissionInvalidationBus>,
    cache_ttl: Duration,
}

impl PermissionService {
    /// Creates a new permission service.
    #[must_use]
    pub fn new(
        queries: Arc<dyn PermissionQueryRepository>,
        cache: Arc<dyn PermissionCache>,
        bus: Arc<dyn PermissionInvalidationBus>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            queries,
            cache,
            bus,
            cache_ttl,
        }
    }

    /// Resolves the user's effective permissions globally or in a channel.
    ///
    /// Non-members resolve to the empty set.
    pub async fn resolve(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> AppResult<Permissions> {
        if let Some(cached) = self.cache.get(user_id, channel_id).await? {
            return Ok(cached);
        }

        let resolved = self.compute(user_id, channel_id).await?;
        self.cache
            .put(user_id, channel_id, resolved, self.cache_ttl)
            .await?;
        Ok(resolved)
    }

    /// Fails with [`AppError::Forbidden`] unless every required bit is held.
    pub async fn check(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
        required: Permissions,
    ) -> AppResult<()> {
        let resolved = self.resolve(user_id, channel_id).await?;
        if !resolved.contains(required) {
            return Err(AppError::Forbidden(
                "missing required permissions".to_owned(),
            ));
        }
        Ok(())
    }

    /// Resolves the required permission across many channels at once,
    /// returning a parallel boolean array.
    pub async fn filter_permitted(
        &self,
        user_id: UserId,
        channel_ids: &[ChannelId],
        required: Permissions,
    ) -> AppResult<Vec<bool>> {
        let cached = self.cache.get_many(user_id, channel_ids).await?;
        let mut results = Vec::with_capacity(channel_ids.len());

        for (channel_id, entry) in channel_ids.iter().zip(cached) {
            let resolved = match entry {
                Some(hit) => hit,
                None => {
                    let computed = self.compute(user_id, Some(*channel_id)).await?;
                    self.cache
                        .put(user_id, Some(*channel_id), computed, self.cache_ttl)
                        .await?;
                    computed
                }
            };
            results.push(resolved.contains(required));
        }

        Ok(results)
    }

    async fn compute(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> AppResult<Permissions> {
        let owner_id = self.queries.owner_id().await?;
        let Some(member_status) = self.queries.member_status(user_id).await? else {
            // Not a member: the owner still resolves, everyone else gets
            // nothing.
            if owner_id == user_id {
                return Ok(Permissions::from_bits(u64::MAX));
            }
            return Ok(Permissions::NONE);
        };

        let roles = self.queries.roles_for_user(user_id).await?;
        let overrides = match channel_id {
            Some(channel_id) => self.queries.overrides_for_channel(channel_id).await?,
            None => Vec::new(),
        };

        Ok(resolve_permissions(&ResolutionInput {
            is_owner: owner_id == user_id,
            member_status,
            roles,
            overrides,
            user_id,
        }))
    }
}

#[async_trait]
impl PermissionInvalidator for PermissionService {
    async fn invalidate_user(&self, user_id: UserId) -> AppResult<()> {
        self.cache.evict_user(user_id).await?;
        self.bus.publish(&InvalidationScope::User(user_id)).await
    }

    async fn invalidate_channel(&self, channel_id: ChannelId) -> AppResult<()> {
        self.cache.evict_channel(channel_id).await?;
        self.bus
            .publish(&InvalidationScope::Channel(channel_id))
            .await
    }

    async fn invalidate_all(&self) -> AppResult<()> {
        self.cache.evict_all().await?;
        self.bus.publish(&InvalidationScope::All).await
    }
}

/// Consumes invalidation messages and evicts matching local entries.
///
/// Runs under the supervisor; returning an error triggers the backoff
/// restart, which re-subscribes from scratch.
pub async fn run_invalidation_subscriber(
    cache: Arc<dyn PermissionCache>,
    bus: Arc<dyn PermissionInvalidationBus>,
    shutdown: tokio_util::sync::CancellationToken,
) -> AppResult<()> {
    let mut receiver = bus.subscribe().await?;

    loop {
        let scope = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            scope = receiver.recv() => scope?,
        };

        match scope {
            InvalidationScope::User(user_id) => cache.evict_user(user_id).await?,
            InvalidationScope::Channel(channel_id) => cache.evict_channel(channel_id).await?,
            InvalidationScope::All => cache.evict_all().await?,
        }
    }
}
