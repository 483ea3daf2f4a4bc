//! PostgreSQL-backed categories, channels, and permission overrides.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{ChannelRepository, ChannelUpdate, NewChannel};
use lodge_core::{AppError, AppResult};
use lodge_domain::{
    Category, CategoryId, Channel, ChannelId, OverrideTarget, PermissionOverride, Permissions,
    RoleId, UserId,
};

/// PostgreSQL implementation of the channel repository port.
#[derive(Clone)]
pub struct PostgresChannelRepository {
    pool: PgPool,
}

impl PostgresChannelRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: uuid::Uuid,
    name: String,
    position: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::from_uuid(row.id),
            name: row.name,
            position: row.position,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: uuid::Uuid,
    category_id: Option<uuid::Uuid>,
    name: String,
    topic: Option<String>,
    position: i32,
    voice: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: ChannelId::from_uuid(row.id),
            category_id: row.category_id.map(CategoryId::from_uuid),
            name: row.name,
            topic: row.topic,
            position: row.position,
            voice: row.voice,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OverrideRow {
    channel_id: uuid::Uuid,
    target_type: String,
    target_id: uuid::Uuid,
    allow: i64,
    deny: i64,
}

impl OverrideRow {
    fn into_override(self) -> AppResult<PermissionOverride> {
        let target = match self.target_type.as_str() {
            "role" => OverrideTarget::Role(RoleId::from_uuid(self.target_id)),
            "user" => OverrideTarget::User(UserId::from_uuid(self.target_id)),
            other => {
                return Err(AppError::Internal(format!(
                    "unknown override target type '{other}'"
                )));
            }
        };
        Ok(PermissionOverride {
            channel_id: ChannelId::from_uuid(self.channel_id),
            target,
            allow: Permissions::from_bits(self.allow as u64),
            deny: Permissions::from_bits(self.deny as u64),
        })
    }
}

fn target_parts(target: OverrideTarget) -> (&'static str, uuid::Uuid) {
    match target {
        OverrideTarget::Role(role_id) => ("role", role_id.as_uuid()),
        OverrideTarget::User(user_id) => ("user", user_id.as_uuid()),
    }
}

#[async_trait]
impl ChannelRepository for PostgresChannelRepository {
    async fn create_category(&self, name: &str, position: i32) -> AppResult<Category> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            INSERT INTO categories (name, position)
            VALUES ($1, $2)
            RETURNING id, name, position, created_at
            "#,
        )
        .bind(name)
        .bind(position)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create category: {error}")))?;
        Ok(row.into())
    }

    async fn update_category(
        &self,
        category_id: CategoryId,
        name: Option<&str>,
        position: Option<i32>,
    ) -> AppResult<Category> {
        let row = sqlx::query_as::<_, CategoryRow>(
            r#"
            UPDATE categories
            SET name = COALESCE($2, name), position = COALESCE($3, position)
            WHERE id = $1
            RETURNING id, name, position, created_at
            "#,
        )
        .bind(category_id.as_uuid())
        .bind(name)
        .bind(position)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update category: {error}")))?
        .ok_or_else(|| AppError::NotFound("category not found".to_owned()))?;
        Ok(row.into())
    }

    async fn delete_category(&self, category_id: CategoryId) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete category: {error}")))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("category not found".to_owned()));
        }
        Ok(())
    }

    async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, position, created_at FROM categories ORDER BY position, created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list categories: {error}")))?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn create_channel(&self, new_channel: &NewChannel) -> AppResult<Channel> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            INSERT INTO channels (category_id, name, topic, position, voice)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, category_id, name, topic, position, voice, created_at
            "#,
        )
        .bind(new_channel.category_id.map(|id| id.as_uuid()))
        .bind(&new_channel.name)
        .bind(&new_channel.topic)
        .bind(new_channel.position)
        .bind(new_channel.voice)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create channel: {error}")))?;
        Ok(row.into())
    }

    async fn get_channel(&self, channel_id: ChannelId) -> AppResult<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, category_id, name, topic, position, voice, created_at
            FROM channels WHERE id = $1 LIMIT 1
            "#,
        )
        .bind(channel_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load channel: {error}")))?;
        Ok(row.map(Channel::from))
    }

    async fn update_channel(
        &self,
        channel_id: ChannelId,
        update: &ChannelUpdate,
    ) -> AppResult<Channel> {
        // Two-state options (change vs clear vs keep) are encoded as a
        // flag + value pair per column.
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            UPDATE channels
            SET name = COALESCE($2, name),
                topic = CASE WHEN $3 THEN $4 ELSE topic END,
                position = COALESCE($5, position),
                category_id = CASE WHEN $6 THEN $7 ELSE category_id END
            WHERE id = $1
            RETURNING id, category_id, name, topic, position, voice, created_at
            "#,
        )
        .bind(channel_id.as_uuid())
        .bind(&update.name)
        .bind(update.topic.is_some())
        .bind(update.topic.clone().flatten())
        .bind(update.position)
        .bind(update.category_id.is_some())
        .bind(update.category_id.flatten().map(|id| id.as_uuid()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update channel: {error}")))?
        .ok_or_else(|| AppError::NotFound("channel not found".to_owned()))?;
        Ok(row.into())
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(channel_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete channel: {error}")))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("channel not found".to_owned()));
        }
        Ok(())
    }

    async fn list_channels(&self) -> AppResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, category_id, name, topic, position, voice, created_at
            FROM channels
            ORDER BY category_id NULLS FIRST, position, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list channels: {error}")))?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn set_override(&self, entry: &PermissionOverride) -> AppResult<()> {
        let (target_type, target_id) = target_parts(entry.target);
        sqlx::query(
            r#"
            INSERT INTO permission_overrides (channel_id, target_type, target_id, allow, deny)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id, target_type, target_id)
            DO UPDATE SET allow = EXCLUDED.allow, deny = EXCLUDED.deny
            "#,
        )
        .bind(entry.channel_id.as_uuid())
        .bind(target_type)
        .bind(target_id)
        .bind(entry.allow.bits() as i64)
        .bind(entry.deny.bits() as i64)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to set override: {error}")))?;
        Ok(())
    }

    async fn remove_override(
        &self,
        channel_id: ChannelId,
        target: OverrideTarget,
    ) -> AppResult<()> {
        let (target_type, target_id) = target_parts(target);
        let deleted = sqlx::query(
            r#"
            DELETE FROM permission_overrides
            WHERE channel_id = $1 AND target_type = $2 AND target_id = $3
            "#,
        )
        .bind(channel_id.as_uuid())
        .bind(target_type)
        .bind(target_id)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to remove override: {error}")))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("override not found".to_owned()));
        }
        Ok(())
    }

    async fn list_overrides(&self, channel_id: ChannelId) -> AppResult<Vec<PermissionOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(
            r#"
            SELECT channel_id, target_type, target_id, allow, deny
            FROM permission_overrides WHERE channel_id = $1
            "#,
        )
        .bind(channel_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list overrides: {error}")))?;
        rows.into_iter().map(OverrideRow::into_override).collect()
    }
}
