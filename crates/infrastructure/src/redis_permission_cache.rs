//! Redis-backed permission cache.
//!
//! Entries are `perm:<user>:<channel>` (or `perm:<user>:global`) holding
//! the resolved bitfield as a decimal string with a TTL. Eviction scans
//! by pattern, so it works across every entry a user or channel touches.

use async_trait::async_trait;
use chrono::Duration;
use lodge_application::PermissionCache;
use lodge_core::{AppError, AppResult};
use lodge_domain::{ChannelId, Permissions, UserId};
use redis::AsyncCommands;

const KEY_PREFIX: &str = "perm:";
const GLOBAL_SUFFIX: &str = "global";
const SCAN_BATCH: usize = 200;

/// Redis implementation of the permission cache port.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
}

impl RedisPermissionCache {
    /// Creates a cache with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }

    async fn delete_matching(&self, pattern: &str) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to scan permission cache: {error}"))
                })?;

            if !keys.is_empty() {
                connection.del::<_, ()>(keys).await.map_err(|error| {
                    AppError::Internal(format!("failed to evict permission entries: {error}"))
                })?;
            }

            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

fn key_for(user_id: UserId, channel_id: Option<ChannelId>) -> String {
    match channel_id {
        Some(channel_id) => format!("{KEY_PREFIX}{user_id}:{channel_id}"),
        None => format!("{KEY_PREFIX}{user_id}:{GLOBAL_SUFFIX}"),
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> AppResult<Option<Permissions>> {
        let mut connection = self.connection().await?;
        let raw: Option<u64> = connection
            .get(key_for(user_id, channel_id))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read permission cache: {error}"))
            })?;
        Ok(raw.map(Permissions::from_bits))
    }

    async fn get_many(
        &self,
        user_id: UserId,
        channel_ids: &[ChannelId],
    ) -> AppResult<Vec<Option<Permissions>>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = channel_ids
            .iter()
            .map(|channel_id| key_for(user_id, Some(*channel_id)))
            .collect();

        let mut connection = self.connection().await?;
        let raw: Vec<Option<u64>> = connection.mget(keys).await.map_err(|error| {
            AppError::Internal(format!("failed to read permission cache batch: {error}"))
        })?;
        Ok(raw
            .into_iter()
            .map(|entry| entry.map(Permissions::from_bits))
            .collect())
    }

    async fn put(
        &self,
        user_id: UserId,
        channel_id: Option<ChannelId>,
        permissions: Permissions,
        ttl: Duration,
    ) -> AppResult<()> {
        let seconds = u64::try_from(ttl.num_seconds())
            .ok()
            .filter(|seconds| *seconds > 0)
            .ok_or_else(|| {
                AppError::Validation("permission cache TTL must be positive".to_owned())
            })?;

        let mut connection = self.connection().await?;
        connection
            .set_ex::<_, _, ()>(key_for(user_id, channel_id), permissions.bits(), seconds)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache: {error}"))
            })
    }

    async fn evict_user(&self, user_id: UserId) -> AppResult<()> {
        self.delete_matching(&format!("{KEY_PREFIX}{user_id}:*")).await
    }

    async fn evict_channel(&self, channel_id: ChannelId) -> AppResult<()> {
        self.delete_matching(&format!("{KEY_PREFIX}*:{channel_id}")).await
    }

    async fn evict_all(&self) -> AppResult<()> {
        self.delete_matching(&format!("{KEY_PREFIX}*")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_global_from_channel_scope() {
        let user = UserId::new();
        let channel = ChannelId::new();
        assert_eq!(key_for(user, None), format!("perm:{user}:global"));
        assert_eq!(
            key_for(user, Some(channel)),
            format!("perm:{user}:{channel}")
        );
    }
}
