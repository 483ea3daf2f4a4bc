//! Message search over a Meilisearch-compatible HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use lodge_application::{MessageSearcher, SearchHit, SearchRequest};
use lodge_core::{AppError, AppResult};
use lodge_domain::{ChannelId, Message, MessageId};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
struct MessageDocument {
    id: String,
    channel_id: String,
    author_id: String,
    content: String,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<HitDocument>,
}

#[derive(Debug, Deserialize)]
struct HitDocument {
    id: String,
    channel_id: String,
    content: String,
}

/// Searcher backed by a Meilisearch-style engine: documents are PUT into
/// one messages index, searched with a filterable `channel_id` field.
#[derive(Clone)]
pub struct MeiliMessageSearcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    index: String,
}

impl MeiliMessageSearcher {
    /// Creates a searcher against `base_url` (no trailing slash).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        index: impl Into<String>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build search HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            index: index.into(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> AppResult<reqwest::Response> {
        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "search engine {what} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl MessageSearcher for MeiliMessageSearcher {
    async fn index(&self, message: &Message) -> AppResult<()> {
        let document = MessageDocument {
            id: message.id.to_string(),
            channel_id: message.channel_id.to_string(),
            author_id: message.author_id.to_string(),
            content: message.content.clone(),
            created_at: message.created_at.timestamp(),
        };

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/indexes/{}/documents", self.index),
            )
            .json(&[document])
            .send()
            .await
            .map_err(|error| {
                AppError::ServiceUnavailable(format!("search indexing failed: {error}"))
            })?;
        Self::expect_success(response, "indexing").await?;
        Ok(())
    }

    async fn remove(&self, message_id: MessageId) -> AppResult<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/indexes/{}/documents/{message_id}", self.index),
            )
            .send()
            .await
            .map_err(|error| {
                AppError::ServiceUnavailable(format!("search deletion failed: {error}"))
            })?;
        Self::expect_success(response, "deletion").await?;
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> AppResult<Vec<SearchHit>> {
        let mut body = json!({
            "q": request.query,
            "limit": request.limit,
        });
        if let Some(channel_id) = request.channel_id {
            body["filter"] = json!(format!("channel_id = \"{channel_id}\""));
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/indexes/{}/search", self.index),
            )
            .json(&body)
            .send()
            .await
            .map_err(|error| AppError::ServiceUnavailable(format!("search failed: {error}")))?;
        let response = Self::expect_success(response, "query").await?;

        let parsed: SearchResponse = response.json().await.map_err(|error| {
            AppError::Internal(format!("failed to parse search response: {error}"))
        })?;

        let mut hits = Vec::with_capacity(parsed.hits.len());
        for hit in parsed.hits {
            let message_id: MessageId = hit.id.parse().map_err(|_| {
                AppError::Internal(format!("search returned malformed message id '{}'", hit.id))
            })?;
            let channel_id: ChannelId = hit.channel_id.parse().map_err(|_| {
                AppError::Internal(format!(
                    "search returned malformed channel id '{}'",
                    hit.channel_id
                ))
            })?;
            hits.push(SearchHit {
                message_id,
                channel_id,
                content: hit.content,
            });
        }
        Ok(hits)
    }
}
