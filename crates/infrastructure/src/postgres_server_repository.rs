//! PostgreSQL-backed server configuration row.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::ServerOwnerSource;
use lodge_core::{AppError, AppResult};
use lodge_domain::{ChannelId, ServerConfig, UserId};

/// PostgreSQL access to the single server-configuration row.
#[derive(Clone)]
pub struct PostgresServerRepository {
    pool: PgPool,
}

impl PostgresServerRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the server configuration.
    pub async fn get(&self) -> AppResult<ServerConfig> {
        let row = sqlx::query_as::<_, ServerConfigRow>(
            r#"
            SELECT name, description, icon_key, owner_id, default_channel_id, created_at
            FROM server_config LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load server config: {error}")))?
        .ok_or_else(|| {
            AppError::ServiceUnavailable("server has not been initialised yet".to_owned())
        })?;
        Ok(row.into())
    }

    /// Writes the configuration row if this deployment has none yet,
    /// making `owner` the server owner. Returns whether this call won the
    /// initialisation.
    pub async fn initialize_if_missing(&self, name: &str, owner: UserId) -> AppResult<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO server_config (name, owner_id)
            VALUES ($1, $2)
            ON CONFLICT (onerow) DO NOTHING
            "#,
        )
        .bind(name)
        .bind(owner.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to initialise server config: {error}"))
        })?;
        Ok(inserted.rows_affected() > 0)
    }

    /// Updates the mutable server settings.
    pub async fn update(
        &self,
        name: Option<&str>,
        description: Option<Option<&str>>,
        default_channel_id: Option<Option<ChannelId>>,
    ) -> AppResult<ServerConfig> {
        sqlx::query(
            r#"
            UPDATE server_config
            SET name = COALESCE($1, name),
                description = CASE WHEN $2 THEN $3 ELSE description END,
                default_channel_id = CASE WHEN $4 THEN $5 ELSE default_channel_id END
            "#,
        )
        .bind(name)
        .bind(description.is_some())
        .bind(description.flatten())
        .bind(default_channel_id.is_some())
        .bind(default_channel_id.flatten().map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update server config: {error}")))?;

        self.get().await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServerConfigRow {
    name: String,
    description: Option<String>,
    icon_key: Option<String>,
    owner_id: uuid::Uuid,
    default_channel_id: Option<uuid::Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ServerConfigRow> for ServerConfig {
    fn from(row: ServerConfigRow) -> Self {
        Self {
            name: row.name,
            description: row.description,
            icon_key: row.icon_key,
            owner_id: UserId::from_uuid(row.owner_id),
            default_channel_id: row.default_channel_id.map(ChannelId::from_uuid),
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ServerOwnerSource for PostgresServerRepository {
    async fn owner_id(&self) -> AppResult<UserId> {
        Ok(self.get().await?.owner_id)
    }
}
