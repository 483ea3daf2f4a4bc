use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use lodge_core::{AppError, AppResult};
use lodge_domain::{Attachment, AttachmentId, UserId};

use crate::attachment_service::{AttachmentRepository, StorageProvider};
use crate::auth_service::{LoginAttemptRepository, TombstoneKind, TombstoneRepository};

use super::*;

fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|error| AppError::Internal(format!("failed to lock test state: {error}")))
}

#[derive(Default)]
struct FakeAttempts {
    purge_calls: Mutex<Vec<DateTime<Utc>>>,
    fail: bool,
}

#[async_trait]
impl LoginAttemptRepository for FakeAttempts {
    async fn record(
        &self,
        _email: &str,
        _user_id: Option<UserId>,
        _success: bool,
        _reason: &str,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        if self.fail {
            return Err(AppError::Internal("attempts purge failed".to_owned()));
        }
        lock(&self.purge_calls)?.push(cutoff);
        Ok(3)
    }
}

#[derive(Default)]
struct FakeTombstones {
    purge_calls: Mutex<u32>,
}

#[async_trait]
impl TombstoneRepository for FakeTombstones {
    async fn exists(&self, _kind: TombstoneKind, _identifier_hmac: &str) -> AppResult<bool> {
        Ok(false)
    }

    async fn purge_older_than(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        *lock(&self.purge_calls)? += 1;
        Ok(1)
    }
}

#[derive(Default)]
struct FakeAttachments {
    orphans: Mutex<Vec<Attachment>>,
    deleted: Mutex<Vec<AttachmentId>>,
}

impl FakeAttachments {
    fn with_orphans(orphans: Vec<Attachment>) -> Arc<Self> {
        Arc::new(Self {
            orphans: Mutex::new(orphans),
            deleted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AttachmentRepository for FakeAttachments {
    async fn create(
        &self,
        _storage_key: &str,
        _uploader_id: UserId,
        _size_bytes: i64,
        _mime_type: &str,
    ) -> AppResult<Attachment> {
        Err(AppError::Internal("not used".to_owned()))
    }

    async fn get(&self, _attachment_id: AttachmentId) -> AppResult<Option<Attachment>> {
        Ok(None)
    }

    async fn set_thumbnail_key(
        &self,
        _attachment_id: AttachmentId,
        _thumbnail_key: &str,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn list_orphans(&self, _cutoff: DateTime<Utc>) -> AppResult<Vec<Attachment>> {
        Ok(lock(&self.orphans)?.clone())
    }

    async fn delete(&self, attachment_id: AttachmentId) -> AppResult<()> {
        lock(&self.deleted)?.push(attachment_id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageProvider for FakeStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        lock(&self.blobs)?.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        lock(&self.blobs)?
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound("blob not found".to_owned()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        lock(&self.blobs)?.remove(key);
        lock(&self.deleted)?.push(key.to_owned());
        Ok(())
    }
}

fn orphan(key: &str) -> Attachment {
    Attachment {
        id: AttachmentId::new(),
        storage_key: key.to_owned(),
        message_id: None,
        uploader_id: UserId::new(),
        size_bytes: 64,
        mime_type: "image/png".to_owned(),
        thumbnail_key: Some(format!("thumb/{key}.jpg")),
        uploaded_at: Utc::now() - Duration::days(2),
    }
}

fn purge_config() -> PurgeConfig {
    PurgeConfig {
        login_attempt_retention: Duration::days(30),
        tombstone_retention: Duration::days(90),
        attachment_orphan_ttl: Duration::hours(24),
    }
}

#[tokio::test]
async fn sweep_purges_attempts_tombstones_and_orphans() {
    let attempts = Arc::new(FakeAttempts::default());
    let tombstones = Arc::new(FakeTombstones::default());
    let attachments = FakeAttachments::with_orphans(vec![orphan("a.png"), orphan("b.png")]);
    let storage = Arc::new(FakeStorage::default());

    let service = PurgeService::new(
        attempts.clone(),
        tombstones.clone(),
        attachments.clone(),
        storage.clone(),
        purge_config(),
    );

    let run = service.run_once().await;
    assert!(run.is_ok());

    assert_eq!(attempts.purge_calls.lock().map(|c| c.len()).unwrap_or(0), 1);
    assert_eq!(tombstones.purge_calls.lock().map(|c| *c).unwrap_or(0), 1);
    assert_eq!(attachments.deleted.lock().map(|d| d.len()).unwrap_or(0), 2);

    let deleted_blobs = storage.deleted.lock().map(|d| d.clone()).unwrap_or_default();
    assert!(deleted_blobs.contains(&"a.png".to_owned()));
    assert!(deleted_blobs.contains(&"thumb/a.png.jpg".to_owned()));
}

#[tokio::test]
async fn tombstone_purge_is_skipped_when_retention_disabled() {
    let tombstones = Arc::new(FakeTombstones::default());
    let mut config = purge_config();
    config.tombstone_retention = Duration::zero();

    let service = PurgeService::new(
        Arc::new(FakeAttempts::default()),
        tombstones.clone(),
        FakeAttachments::with_orphans(Vec::new()),
        Arc::new(FakeStorage::default()),
        config,
    );

    let run = service.run_once().await;
    assert!(run.is_ok());
    assert_eq!(tombstones.purge_calls.lock().map(|c| *c).unwrap_or(9), 0);
}

#[tokio::test]
async fn failing_step_does_not_stop_the_sweep() {
    let attempts = Arc::new(FakeAttempts {
        purge_calls: Mutex::new(Vec::new()),
        fail: true,
    });
    let attachments = FakeAttachments::with_orphans(vec![orphan("c.png")]);
    let storage = Arc::new(FakeStorage::default());

    let service = PurgeService::new(
        attempts,
        Arc::new(FakeTombstones::default()),
        attachments.clone(),
        storage,
        purge_config(),
    );

    let run = service.run_once().await;
    assert!(run.is_ok(), "sub-step failures are contained");
    assert_eq!(attachments.deleted.lock().map(|d| d.len()).unwrap_or(0), 1);
}
