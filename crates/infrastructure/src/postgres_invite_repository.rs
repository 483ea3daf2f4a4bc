//! PostgreSQL-backed invites.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{InviteRepository, RedeemOutcome};
use lodge_core::{AppError, AppResult};
use lodge_domain::{ChannelId, Invite, InviteId, UserId};

/// PostgreSQL implementation of the invite repository port.
#[derive(Clone)]
pub struct PostgresInviteRepository {
    pool: PgPool,
}

impl PostgresInviteRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InviteRow {
    id: uuid::Uuid,
    code: String,
    channel_id: uuid::Uuid,
    creator_id: uuid::Uuid,
    max_uses: Option<i32>,
    uses: i32,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<InviteRow> for Invite {
    fn from(row: InviteRow) -> Self {
        Self {
            id: InviteId::from_uuid(row.id),
            code: row.code,
            channel_id: ChannelId::from_uuid(row.channel_id),
            creator_id: UserId::from_uuid(row.creator_id),
            max_uses: row.max_uses,
            uses: row.uses,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

const INVITE_COLUMNS: &str =
    "id, code, channel_id, creator_id, max_uses, uses, expires_at, created_at";

#[async_trait]
impl InviteRepository for PostgresInviteRepository {
    async fn create(
        &self,
        code: &str,
        channel_id: ChannelId,
        creator_id: UserId,
        max_uses: Option<i32>,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> AppResult<Invite> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            r#"
            INSERT INTO invites (code, channel_id, creator_id, max_uses, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {INVITE_COLUMNS}
            "#
        ))
        .bind(code)
        .bind(channel_id.as_uuid())
        .bind(creator_id.as_uuid())
        .bind(max_uses)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create invite: {error}")))?;
        Ok(row.into())
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Invite>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites WHERE code = $1 LIMIT 1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load invite: {error}")))?;
        Ok(row.map(Invite::from))
    }

    async fn list(&self) -> AppResult<Vec<Invite>> {
        let rows = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {INVITE_COLUMNS} FROM invites ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list invites: {error}")))?;
        Ok(rows.into_iter().map(Invite::from).collect())
    }

    async fn delete(&self, invite_id: InviteId) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM invites WHERE id = $1")
            .bind(invite_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to delete invite: {error}")))?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound("invite not found".to_owned()));
        }
        Ok(())
    }

    async fn redeem(
        &self,
        code: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<RedeemOutcome> {
        // Guarded UPDATE: concurrent redemptions serialise on the row and
        // the use cap can never overshoot.
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            r#"
            UPDATE invites
            SET uses = uses + 1
            WHERE code = $1
              AND (expires_at IS NULL OR expires_at > $2)
              AND (max_uses IS NULL OR uses < max_uses)
            RETURNING {INVITE_COLUMNS}
            "#
        ))
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to redeem invite: {error}")))?;

        if let Some(row) = row {
            return Ok(RedeemOutcome::Redeemed(Box::new(row.into())));
        }

        // Distinguish a missing code from a dead one for error mapping.
        match self.find_by_code(code).await? {
            Some(_) => Ok(RedeemOutcome::NotRedeemable),
            None => Ok(RedeemOutcome::NotFound),
        }
    }
}
