//! Redis list used as the thumbnail job queue.

use async_trait::async_trait;
use lodge_application::{ThumbnailJob, ThumbnailQueue};
use lodge_core::{AppError, AppResult};
use redis::AsyncCommands;

/// Queue key shared by the API (producer) and worker (consumer).
pub const THUMBNAIL_JOBS_KEY: &str = "thumbnail.jobs";

/// Blocking-pop timeout so the worker can observe shutdown.
const POP_TIMEOUT_SECONDS: f64 = 5.0;

/// Redis implementation of the thumbnail queue port.
#[derive(Clone)]
pub struct RedisThumbnailQueue {
    client: redis::Client,
}

impl RedisThumbnailQueue {
    /// Creates a queue with a configured Redis client.
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ThumbnailQueue for RedisThumbnailQueue {
    async fn push(&self, job: &ThumbnailJob) -> AppResult<()> {
        let payload = serde_json::to_string(job).map_err(|error| {
            AppError::Internal(format!("failed to encode thumbnail job: {error}"))
        })?;

        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;
        connection
            .lpush::<_, _, ()>(THUMBNAIL_JOBS_KEY, payload)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to enqueue thumbnail job: {error}"))
            })
    }

    async fn pop(&self) -> AppResult<Option<ThumbnailJob>> {
        let mut connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))?;

        let entry: Option<(String, String)> = connection
            .brpop(THUMBNAIL_JOBS_KEY, POP_TIMEOUT_SECONDS)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to pop thumbnail job: {error}"))
            })?;

        match entry {
            Some((_key, payload)) => {
                let job = serde_json::from_str(&payload).map_err(|error| {
                    AppError::Internal(format!("malformed thumbnail job: {error}"))
                })?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }
}
