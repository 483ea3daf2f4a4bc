//! Cross-process gateway event fan-out over Redis pub/sub.

use async_trait::async_trait;
use futures::StreamExt;
use lodge_application::{EventBus, EventReceiver};
use lodge_core::{AppError, AppResult};
use lodge_domain::EventEnvelope;
use redis::AsyncCommands;

/// Channel carrying resolved event envelopes to every gateway process.
pub const GATEWAY_EVENTS_CHANNEL: &str = "gateway.events";

/// Redis pub/sub implementation of the event bus.
#[derive(Clone)]
pub struct RedisEventBus {
    client: redis::Client,
}

impl RedisEventBus {
    /// Creates a bus with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

struct RedisEventReceiver {
    pubsub: redis::aio::PubSub,
}

#[async_trait]
impl EventReceiver for RedisEventReceiver {
    async fn recv(&mut self) -> AppResult<EventEnvelope> {
        let message = self.pubsub.on_message().next().await.ok_or_else(|| {
            AppError::ServiceUnavailable("event subscription closed".to_owned())
        })?;

        let payload: String = message.get_payload().map_err(|error| {
            AppError::Internal(format!("failed to read event payload: {error}"))
        })?;
        serde_json::from_str(&payload)
            .map_err(|error| AppError::Internal(format!("malformed event envelope: {error}")))
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, envelope: &EventEnvelope) -> AppResult<()> {
        let payload = serde_json::to_string(envelope).map_err(|error| {
            AppError::Internal(format!("failed to encode event envelope: {error}"))
        })?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;
        connection
            .publish::<_, _, ()>(GATEWAY_EVENTS_CHANNEL, payload)
            .await
            .map_err(|error| AppError::Internal(format!("failed to publish event: {error}")))
    }

    async fn subscribe(&self) -> AppResult<Box<dyn EventReceiver>> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|error| {
            AppError::ServiceUnavailable(format!("failed to open pub/sub connection: {error}"))
        })?;
        pubsub
            .subscribe(GATEWAY_EVENTS_CHANNEL)
            .await
            .map_err(|error| {
                AppError::ServiceUnavailable(format!("failed to subscribe to events: {error}"))
            })?;

        Ok(Box::new(RedisEventReceiver { pubsub }))
    }
}
