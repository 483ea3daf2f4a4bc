//! Attachment upload, blob storage, and thumbnail job dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use lodge_core::{AppError, AppResult};
use lodge_domain::{Attachment, AttachmentId, UserId};

use crate::member_service::MemberService;

/// Repository port for attachment rows.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// Inserts an attachment row (unclaimed until a message references it).
    async fn create(
        &self,
        storage_key: &str,
        uploader_id: UserId,
        size_bytes: i64,
        mime_type: &str,
    ) -> AppResult<Attachment>;

    /// Loads one attachment.
    async fn get(&self, attachment_id: AttachmentId) -> AppResult<Option<Attachment>>;

    /// Records the generated thumbnail key.
    async fn set_thumbnail_key(
        &self,
        attachment_id: AttachmentId,
        thumbnail_key: &str,
    ) -> AppResult<()>;

    /// Lists rows with no message that were uploaded before the cutoff.
    async fn list_orphans(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Attachment>>;

    /// Deletes an attachment row.
    async fn delete(&self, attachment_id: AttachmentId) -> AppResult<()>;
}

/// Port for the blob backend.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Writes a blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<()>;

    /// Reads a blob.
    async fn get(&self, key: &str) -> AppResult<Vec<u8>>;

    /// Deletes a blob; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// One thumbnail job on the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailJob {
    /// Attachment to thumbnail.
    pub attachment_id: AttachmentId,
    /// Blob key of the original image.
    pub storage_key: String,
}

/// Port for the thumbnail job queue.
#[async_trait]
pub trait ThumbnailQueue: Send + Sync {
    /// Enqueues a job.
    async fn push(&self, job: &ThumbnailJob) -> AppResult<()>;

    /// Waits up to the pop timeout for a job; `None` on timeout.
    async fn pop(&self) -> AppResult<Option<ThumbnailJob>>;
}

/// Application service for uploads.
#[derive(Clone)]
pub struct AttachmentService {
    attachments: Arc<dyn AttachmentRepository>,
    storage: Arc<dyn StorageProvider>,
    thumbnails: Arc<dyn ThumbnailQueue>,
    members: MemberService,
    max_upload_bytes: usize,
}

impl AttachmentService {
    /// Creates a new attachment service.
    #[must_use]
    pub fn new(
        attachments: Arc<dyn AttachmentRepository>,
        storage: Arc<dyn StorageProvider>,
        thumbnails: Arc<dyn ThumbnailQueue>,
        members: MemberService,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            attachments,
            storage,
            thumbnails,
            members,
            max_upload_bytes,
        }
    }

    /// Stores an uploaded blob and its metadata row.
    ///
    /// The blob write lands first; if the row insert then fails the blob
    /// is orphaned and the purge loop collects it later. Image uploads
    /// enqueue a thumbnail job best-effort.
    pub async fn upload(
        &self,
        uploader_id: UserId,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> AppResult<Attachment> {
        if !self.members.is_active_member(uploader_id).await? {
            return Err(AppError::MembershipRequired);
        }
        if bytes.is_empty() {
            return Err(AppError::Validation("upload is empty".to_owned()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "upload exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        let storage_key = build_storage_key(file_name)?;
        self.storage.put(&storage_key, bytes).await?;

        let size = i64::try_from(bytes.len())
            .map_err(|error| AppError::Internal(format!("invalid upload size: {error}")))?;
        let attachment = self
            .attachments
            .create(&storage_key, uploader_id, size, mime_type)
            .await?;

        if attachment.is_image() {
            let job = ThumbnailJob {
                attachment_id: attachment.id,
                storage_key: attachment.storage_key.clone(),
            };
            if let Err(error) = self.thumbnails.push(&job).await {
                warn!(attachment_id = %attachment.id, %error, "failed to enqueue thumbnail job");
            }
        }

        Ok(attachment)
    }

    /// Reads an attachment's bytes for download.
    pub async fn download(&self, attachment_id: AttachmentId) -> AppResult<(Attachment, Vec<u8>)> {
        let attachment = self
            .attachments
            .get(attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("attachment not found".to_owned()))?;
        let bytes = self.storage.get(&attachment.storage_key).await?;
        Ok((attachment, bytes))
    }
}

/// Builds a collision-free storage key that keeps the original extension
/// but none of the rest of the client-supplied name.
fn build_storage_key(file_name: &str) -> AppResult<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate storage key: {error}")))?;

    let mut key = String::with_capacity(40);
    for byte in bytes {
        use std::fmt::Write;
        let _ = write!(key, "{byte:02x}");
    }

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
        });
    if let Some(extension) = extension {
        key.push('.');
        key.push_str(&extension.to_lowercase());
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::build_storage_key;

    #[test]
    fn storage_keys_keep_safe_extensions_only() {
        let key = build_storage_key("photo.JPG").unwrap_or_default();
        assert!(key.ends_with(".jpg"));

        let key = build_storage_key("archive.tar.gz").unwrap_or_default();
        assert!(key.ends_with(".gz"));

        let key = build_storage_key("no-extension").unwrap_or_default();
        assert!(!key.contains('.'));

        let key = build_storage_key("weird.e!xt").unwrap_or_default();
        assert!(!key.contains('.'));
    }

    #[test]
    fn storage_keys_are_unique() {
        let first = build_storage_key("a.png").unwrap_or_default();
        let second = build_storage_key("a.png").unwrap_or_default();
        assert_ne!(first, second);
    }
}
