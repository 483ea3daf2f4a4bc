//! PostgreSQL-backed attachment metadata.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::AttachmentRepository;
use lodge_core::{AppError, AppResult};
use lodge_domain::{Attachment, AttachmentId, MessageId, UserId};

/// PostgreSQL implementation of the attachment repository port.
#[derive(Clone)]
pub struct PostgresAttachmentRepository {
    pool: PgPool,
}

impl PostgresAttachmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: uuid::Uuid,
    storage_key: String,
    message_id: Option<uuid::Uuid>,
    uploader_id: uuid::Uuid,
    size_bytes: i64,
    mime_type: String,
    thumbnail_key: Option<String>,
    uploaded_at: chrono::DateTime<chrono::Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: AttachmentId::from_uuid(row.id),
            storage_key: row.storage_key,
            message_id: row.message_id.map(MessageId::from_uuid),
            uploader_id: UserId::from_uuid(row.uploader_id),
            size_bytes: row.size_bytes,
            mime_type: row.mime_type,
            thumbnail_key: row.thumbnail_key,
            uploaded_at: row.uploaded_at,
        }
    }
}

const ATTACHMENT_COLUMNS: &str =
    "id, storage_key, message_id, uploader_id, size_bytes, mime_type, thumbnail_key, uploaded_at";

#[async_trait]
impl AttachmentRepository for PostgresAttachmentRepository {
    async fn create(
        &self,
        storage_key: &str,
        uploader_id: UserId,
        size_bytes: i64,
        mime_type: &str,
    ) -> AppResult<Attachment> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!(
            r#"
            INSERT INTO attachments (storage_key, uploader_id, size_bytes, mime_type)
            VALUES ($1, $2, $3, $4)
            RETURNING {ATTACHMENT_COLUMNS}
            "#
        ))
        .bind(storage_key)
        .bind(uploader_id.as_uuid())
        .bind(size_bytes)
        .bind(mime_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create attachment: {error}")))?;
        Ok(row.into())
    }

    async fn get(&self, attachment_id: AttachmentId) -> AppResult<Option<Attachment>> {
        let row = sqlx::query_as::<_, AttachmentRow>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = $1 LIMIT 1"
        ))
        .bind(attachment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load attachment: {error}")))?;
        Ok(row.map(Attachment::from))
    }

    async fn set_thumbnail_key(
        &self,
        attachment_id: AttachmentId,
        thumbnail_key: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE attachments SET thumbnail_key = $2 WHERE id = $1")
            .bind(attachment_id.as_uuid())
            .bind(thumbnail_key)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to record thumbnail: {error}"))
            })?;
        Ok(())
    }

    async fn list_orphans(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(&format!(
            r#"
            SELECT {ATTACHMENT_COLUMNS} FROM attachments
            WHERE message_id IS NULL AND uploaded_at < $1
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list orphans: {error}")))?;
        Ok(rows.into_iter().map(Attachment::from).collect())
    }

    async fn delete(&self, attachment_id: AttachmentId) -> AppResult<()> {
        sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(attachment_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete attachment: {error}"))
            })?;
        Ok(())
    }
}
