//! HTTP fetcher for the disposable-email domain blocklist.

use std::time::Duration;

use async_trait::async_trait;
use lodge_application::BlocklistFetcher;
use lodge_core::{AppError, AppResult};

/// Downloads the blocklist text file from a configured URL.
#[derive(Clone)]
pub struct HttpBlocklistFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpBlocklistFetcher {
    /// Creates a fetcher with a bounded request timeout.
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build blocklist HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl BlocklistFetcher for HttpBlocklistFetcher {
    async fn fetch(&self) -> AppResult<String> {
        let response = self.client.get(&self.url).send().await.map_err(|error| {
            AppError::ServiceUnavailable(format!("blocklist fetch failed: {error}"))
        })?;

        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "blocklist source returned {}",
                response.status()
            )));
        }

        response.text().await.map_err(|error| {
            AppError::ServiceUnavailable(format!("blocklist body read failed: {error}"))
        })
    }
}
