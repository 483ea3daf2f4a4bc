//! PostgreSQL-backed email-verification tokens.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::VerificationTokenRepository;
use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;

/// PostgreSQL implementation of the verification-token repository port.
#[derive(Clone)]
pub struct PostgresVerificationRepository {
    pool: PgPool,
}

impl PostgresVerificationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationTokenRepository for PostgresVerificationRepository {
    async fn consume_valid(&self, token_hash: &str) -> AppResult<Option<UserId>> {
        // Single UPDATE … RETURNING: consumption races resolve to exactly
        // one winner, and expired or consumed rows match nothing.
        let user_id = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            UPDATE email_verifications
            SET consumed_at = NOW()
            WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to consume verification token: {error}"))
        })?;

        Ok(user_id.map(UserId::from_uuid))
    }

    async fn replace_after_cooldown(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: chrono::DateTime<chrono::Utc>,
        cooldown: chrono::Duration,
    ) -> AppResult<bool> {
        let cooldown_seconds = cooldown.num_seconds().max(0);

        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        let recent = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM email_verifications
                WHERE user_id = $1
                  AND created_at > NOW() - make_interval(secs => $2::double precision)
            )
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(cooldown_seconds as f64)
        .fetch_one(&mut *tx)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to check verification cooldown: {error}"))
        })?;

        if recent {
            return Ok(false);
        }

        sqlx::query("DELETE FROM email_verifications WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to drop stale verification rows: {error}"))
            })?;

        sqlx::query(
            "INSERT INTO email_verifications (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id.as_uuid())
        .bind(token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to insert verification row: {error}"))
        })?;

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit verification replacement: {error}"))
        })?;
        Ok(true)
    }
}
