//! Attachment metadata records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AttachmentId, MessageId, UserId};

/// Metadata for an uploaded blob.
///
/// `message_id` is null between upload and message send; the purge loop
/// collects rows that stay orphaned past the configured TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment identifier.
    pub id: AttachmentId,
    /// Key of the blob in the storage provider.
    pub storage_key: String,
    /// Message the attachment belongs to, once sent.
    pub message_id: Option<MessageId>,
    /// User who uploaded the blob.
    pub uploader_id: UserId,
    /// Blob size in bytes.
    pub size_bytes: i64,
    /// Declared MIME type.
    pub mime_type: String,
    /// Key of the generated thumbnail blob, if one exists.
    pub thumbnail_key: Option<String>,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    /// True when the attachment's MIME type is a thumbnailable image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(
            self.mime_type.as_str(),
            "image/jpeg" | "image/png" | "image/webp"
        )
    }
}
