//! PostgreSQL-backed messages.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{HistoryPage, MessageRepository, NewMessage};
use lodge_core::{AppError, AppResult};
use lodge_domain::{AttachmentId, ChannelId, Message, MessageId, UserId};

const HISTORY_PAGE_CAP: u32 = 100;

/// PostgreSQL implementation of the message repository port.
#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: uuid::Uuid,
    channel_id: uuid::Uuid,
    author_id: uuid::Uuid,
    content: String,
    reply_to: Option<uuid::Uuid>,
    pinned: bool,
    deleted: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    edited_at: Option<chrono::DateTime<chrono::Utc>>,
    attachment_ids: Vec<uuid::Uuid>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::from_uuid(row.id),
            channel_id: ChannelId::from_uuid(row.channel_id),
            author_id: UserId::from_uuid(row.author_id),
            content: row.content,
            reply_to: row.reply_to.map(MessageId::from_uuid),
            pinned: row.pinned,
            deleted: row.deleted,
            attachment_ids: row
                .attachment_ids
                .into_iter()
                .map(AttachmentId::from_uuid)
                .collect(),
            created_at: row.created_at,
            edited_at: row.edited_at,
        }
    }
}

const MESSAGE_QUERY: &str = r#"
SELECT m.id, m.channel_id, m.author_id, m.content, m.reply_to, m.pinned, m.deleted,
       m.created_at, m.edited_at,
       COALESCE(ARRAY_AGG(a.id) FILTER (WHERE a.id IS NOT NULL), '{}') AS attachment_ids
FROM messages m
LEFT JOIN attachments a ON a.message_id = m.id
"#;

impl PostgresMessageRepository {
    async fn fetch_one(&self, message_id: MessageId) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "{MESSAGE_QUERY} WHERE m.id = $1 GROUP BY m.id"
        ))
        .bind(message_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load message: {error}")))?;
        Ok(row.map(Message::from))
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, new_message: &NewMessage) -> AppResult<Message> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        let id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            INSERT INTO messages (channel_id, author_id, content, reply_to)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(new_message.channel_id.as_uuid())
        .bind(new_message.author_id.as_uuid())
        .bind(&new_message.content)
        .bind(new_message.reply_to.map(|reply_to| reply_to.as_uuid()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| AppError::Internal(format!("failed to insert message: {error}")))?;

        for attachment_id in &new_message.attachment_ids {
            // Claim only rows the author uploaded and no message owns yet.
            let claimed = sqlx::query(
                r#"
                UPDATE attachments
                SET message_id = $1
                WHERE id = $2 AND uploader_id = $3 AND message_id IS NULL
                "#,
            )
            .bind(id)
            .bind(attachment_id.as_uuid())
            .bind(new_message.author_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to claim attachment: {error}"))
            })?;

            if claimed.rows_affected() == 0 {
                return Err(AppError::Validation(format!(
                    "attachment {attachment_id} is not claimable"
                )));
            }
        }

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit message: {error}"))
        })?;

        self.fetch_one(MessageId::from_uuid(id))
            .await?
            .ok_or_else(|| AppError::Internal("message vanished after insert".to_owned()))
    }

    async fn get(&self, message_id: MessageId) -> AppResult<Option<Message>> {
        self.fetch_one(message_id).await
    }

    async fn list_channel(
        &self,
        channel_id: ChannelId,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>> {
        let limit = i64::from(page.limit.clamp(1, HISTORY_PAGE_CAP));

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            {MESSAGE_QUERY}
            WHERE m.channel_id = $1
              AND NOT m.deleted
              AND ($2::uuid IS NULL OR m.created_at < (
                  SELECT created_at FROM messages WHERE id = $2
              ))
            GROUP BY m.id
            ORDER BY m.created_at DESC
            LIMIT $3
            "#
        ))
        .bind(channel_id.as_uuid())
        .bind(page.before.map(|before| before.as_uuid()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list history: {error}")))?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn update_content(&self, message_id: MessageId, content: &str) -> AppResult<Message> {
        let updated = sqlx::query(
            "UPDATE messages SET content = $2, edited_at = NOW() WHERE id = $1 AND NOT deleted",
        )
        .bind(message_id.as_uuid())
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to edit message: {error}")))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("message not found".to_owned()));
        }

        self.fetch_one(message_id)
            .await?
            .ok_or_else(|| AppError::Internal("message vanished after edit".to_owned()))
    }

    async fn soft_delete(&self, message_id: MessageId) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE messages SET deleted = TRUE, content = '' WHERE id = $1 AND NOT deleted",
        )
        .bind(message_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete message: {error}")))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("message not found".to_owned()));
        }
        Ok(())
    }

    async fn set_pinned(&self, message_id: MessageId, pinned: bool) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE messages SET pinned = $2 WHERE id = $1 AND NOT deleted",
        )
        .bind(message_id.as_uuid())
        .bind(pinned)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to pin message: {error}")))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("message not found".to_owned()));
        }
        Ok(())
    }

    async fn list_pinned(&self, channel_id: ChannelId) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            {MESSAGE_QUERY}
            WHERE m.channel_id = $1 AND m.pinned AND NOT m.deleted
            GROUP BY m.id
            ORDER BY m.created_at DESC
            "#
        ))
        .bind(channel_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list pinned messages: {error}"))
        })?;

        Ok(rows.into_iter().map(Message::from).collect())
    }
}
