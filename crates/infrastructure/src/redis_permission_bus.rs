//! Cross-process permission invalidation over Redis pub/sub.

use async_trait::async_trait;
use futures::StreamExt;
use lodge_application::{InvalidationReceiver, InvalidationScope, PermissionInvalidationBus};
use lodge_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Channel carrying invalidation messages to every server process.
pub const PERMISSION_INVALIDATE_CHANNEL: &str = "perm.invalidate";

/// Redis pub/sub implementation of the invalidation bus.
#[derive(Clone)]
pub struct RedisPermissionBus {
    client: redis::Client,
}

impl RedisPermissionBus {
    /// Creates a bus with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

struct RedisInvalidationReceiver {
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl InvalidationReceiver for RedisInvalidationReceiver {
    async fn recv(&mut self) -> AppResult<InvalidationScope> {
        let message = self
            .pubsub
            .on_message()
            .next()
            .await
            .ok_or_else(|| {
                AppError::ServiceUnavailable("invalidation subscription closed".to_owned())
            })?;

        let payload: String = message.get_payload().map_err(|error| {
            AppError::Internal(format!("failed to read invalidation payload: {error}"))
        })?;
        serde_json::from_str(&payload).map_err(|error| {
            AppError::Internal(format!("malformed invalidation message: {error}"))
        })
    }
}

#[async_trait]
impl PermissionInvalidationBus for RedisPermissionBus {
    async fn publish(&self, scope: &InvalidationScope) -> AppResult<()> {
        let payload = serde_json::to_string(scope).map_err(|error| {
            AppError::Internal(format!("failed to encode invalidation message: {error}"))
        })?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;
        connection
            .publish::<_, _, ()>(PERMISSION_INVALIDATE_CHANNEL, payload)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to publish invalidation: {error}"))
            })
    }

    async fn subscribe(&self) -> AppResult<Box<dyn InvalidationReceiver>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|error| {
            AppError::ServiceUnavailable(format!("failed to open pub/sub connection: {error}"))
        })?;
        pubsub
            .subscribe(PERMISSION_INVALIDATE_CHANNEL)
            .await
            .map_err(|error| {
                AppError::ServiceUnavailable(format!(
                    "failed to subscribe to invalidations: {error}"
                ))
            })?;

        Ok(Box::new(RedisInvalidationReceiver { pubsub }))
    }
}
