//! Periodic data purge: login attempts, tombstones, orphaned attachments.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use lodge_core::AppResult;

use crate::attachment_service::{AttachmentRepository, StorageProvider};
use crate::auth_service::{LoginAttemptRepository, TombstoneRepository};

/// Retention windows driving the purge loop.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    /// How long login-attempt audit rows are kept.
    pub login_attempt_retention: Duration,
    /// How long deletion tombstones are kept; zero or negative disables
    /// tombstone purging.
    pub tombstone_retention: Duration,
    /// How long an unclaimed attachment may stay before collection.
    pub attachment_orphan_ttl: Duration,
}

/// Runs one purge sweep per tick under the background supervisor.
#[derive(Clone)]
pub struct PurgeService {
    login_attempts: Arc<dyn LoginAttemptRepository>,
    tombstones: Arc<dyn TombstoneRepository>,
    attachments: Arc<dyn AttachmentRepository>,
    storage: Arc<dyn StorageProvider>,
    config: PurgeConfig,
}

impl PurgeService {
    /// Creates a new purge service.
    #[must_use]
    pub fn new(
        login_attempts: Arc<dyn LoginAttemptRepository>,
        tombstones: Arc<dyn TombstoneRepository>,
        attachments: Arc<dyn AttachmentRepository>,
        storage: Arc<dyn StorageProvider>,
        config: PurgeConfig,
    ) -> Self {
        Self {
            login_attempts,
            tombstones,
            attachments,
            storage,
            config,
        }
    }

    /// Runs every sub-step once. A failing step is logged and never stops
    /// the others.
    pub async fn run_once(&self) -> AppResult<()> {
        let now = Utc::now();

        match self
            .login_attempts
            .purge_older_than(now - self.config.login_attempt_retention)
            .await
        {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired login attempts"),
            Err(error) => warn!(%error, "failed to purge login attempts"),
        }

        if self.config.tombstone_retention > Duration::zero() {
            match self
                .tombstones
                .purge_older_than(now - self.config.tombstone_retention)
                .await
            {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged aged tombstones"),
                Err(error) => warn!(%error, "failed to purge tombstones"),
            }
        }

        self.collect_orphaned_attachments().await;

        Ok(())
    }

    async fn collect_orphaned_attachments(&self) {
        let cutoff = Utc::now() - self.config.attachment_orphan_ttl;
        let orphans = match self.attachments.list_orphans(cutoff).await {
            Ok(orphans) => orphans,
            Err(error) => {
                warn!(%error, "failed to list orphaned attachments");
                return;
            }
        };

        let mut collected = 0u64;
        for orphan in orphans {
            if let Err(error) = self.attachments.delete(orphan.id).await {
                warn!(attachment_id = %orphan.id, %error, "failed to delete orphan row");
                continue;
            }
            if let Err(error) = self.storage.delete(&orphan.storage_key).await {
                // Row is gone; the blob leaks until a manual sweep. Logged
                // with the key so an operator can reconcile.
                warn!(
                    attachment_id = %orphan.id,
                    storage_key = %orphan.storage_key,
                    %error,
                    "failed to delete orphan blob"
                );
                continue;
            }
            if let Some(thumbnail_key) = orphan.thumbnail_key {
                if let Err(error) = self.storage.delete(&thumbnail_key).await {
                    warn!(%thumbnail_key, %error, "failed to delete orphan thumbnail");
                }
            }
            collected += 1;
        }

        if collected > 0 {
            info!(collected, "collected orphaned attachments");
        }
    }
}

#[cfg(test)]
mod tests;
