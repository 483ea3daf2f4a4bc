//! Disposable-email domain blocklist.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use lodge_core::AppResult;

use crate::auth_service::DisposableEmailPolicy;

/// Port for fetching the raw blocklist text.
#[async_trait]
pub trait BlocklistFetcher: Send + Sync {
    /// Fetches the blocklist source (one domain per line).
    async fn fetch(&self) -> AppResult<String>;
}

/// In-memory snapshot of disposable email domains, refreshed on an
/// interval by the worker loop.
///
/// A failed fetch keeps the last good snapshot; a server that has never
/// loaded the list simply blocks nothing.
#[derive(Clone)]
pub struct BlocklistService {
    fetcher: Arc<dyn BlocklistFetcher>,
    domains: Arc<RwLock<HashSet<String>>>,
    enabled: bool,
}

impl BlocklistService {
    /// Creates the service; `enabled = false` turns every check off.
    #[must_use]
    pub fn new(fetcher: Arc<dyn BlocklistFetcher>, enabled: bool) -> Self {
        Self {
            fetcher,
            domains: Arc::new(RwLock::new(HashSet::new())),
            enabled,
        }
    }

    /// Fetches and swaps in a fresh snapshot.
    pub async fn refresh(&self) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let body = match self.fetcher.fetch().await {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "blocklist fetch failed; keeping previous snapshot");
                return Ok(());
            }
        };

        let parsed = parse_blocklist(&body);
        let count = parsed.len();
        match self.domains.write() {
            Ok(mut guard) => *guard = parsed,
            Err(poisoned) => *poisoned.into_inner() = parsed,
        }
        info!(domains = count, "disposable email blocklist refreshed");
        Ok(())
    }

    /// Number of domains currently loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.domains.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// True when no snapshot is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DisposableEmailPolicy for BlocklistService {
    fn is_blocked(&self, domain: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let needle = domain.to_lowercase();
        match self.domains.read() {
            Ok(guard) => guard.contains(&needle),
            Err(poisoned) => poisoned.into_inner().contains(&needle),
        }
    }
}

/// Parses blocklist text: one domain per line, `#` comments, blank lines
/// ignored, everything lowercased.
fn parse_blocklist(body: &str) -> HashSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use lodge_core::{AppError, AppResult};

    use super::*;

    struct FakeFetcher {
        body: String,
        fail: AtomicBool,
    }

    #[async_trait]
    impl BlocklistFetcher for FakeFetcher {
        async fn fetch(&self) -> AppResult<String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AppError::ServiceUnavailable("fetch failed".to_owned()));
            }
            Ok(self.body.clone())
        }
    }

    fn service(body: &str) -> (BlocklistService, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher {
            body: body.to_owned(),
            fail: AtomicBool::new(false),
        });
        (BlocklistService::new(fetcher.clone(), true), fetcher)
    }

    #[test]
    fn parser_skips_comments_and_blanks() {
        let parsed = parse_blocklist("# comment\n\nMailinator.com\n  tempmail.dev  \n");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("mailinator.com"));
        assert!(parsed.contains("tempmail.dev"));
    }

    #[tokio::test]
    async fn unloaded_blocklist_blocks_nothing() {
        let (service, _) = service("mailinator.com\n");
        assert!(!service.is_blocked("mailinator.com"));
    }

    #[tokio::test]
    async fn refresh_loads_domains_case_insensitively() {
        let (service, _) = service("Mailinator.com\n");
        let refreshed = service.refresh().await;
        assert!(refreshed.is_ok());
        assert!(service.is_blocked("MAILINATOR.COM"));
        assert!(!service.is_blocked("example.com"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_snapshot() {
        let (service, fetcher) = service("mailinator.com\n");
        let first = service.refresh().await;
        assert!(first.is_ok());

        fetcher.fail.store(true, Ordering::SeqCst);
        let second = service.refresh().await;
        assert!(second.is_ok(), "fetch failure must not propagate");
        assert!(service.is_blocked("mailinator.com"));
    }

    #[tokio::test]
    async fn disabled_blocklist_never_blocks() {
        let fetcher = Arc::new(FakeFetcher {
            body: "mailinator.com\n".to_owned(),
            fail: AtomicBool::new(false),
        });
        let service = BlocklistService::new(fetcher, false);
        let refreshed = service.refresh().await;
        assert!(refreshed.is_ok());
        assert!(!service.is_blocked("mailinator.com"));
    }
}
