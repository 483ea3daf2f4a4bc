//! PostgreSQL-backed recovery codes, tombstones, and login attempts.

use async_trait::async_trait;
use sqlx::PgPool;

use lodge_application::{
    LoginAttemptRepository, RecoveryCodeRecord, RecoveryCodeRepository, TombstoneKind,
    TombstoneRepository,
};
use lodge_core::{AppError, AppResult};
use lodge_domain::UserId;

/// PostgreSQL implementation of the recovery-code repository port.
#[derive(Clone)]
pub struct PostgresRecoveryCodeRepository {
    pool: PgPool,
}

impl PostgresRecoveryCodeRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecoveryCodeRow {
    id: uuid::Uuid,
    code_hash: String,
    used_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
impl RecoveryCodeRepository for PostgresRecoveryCodeRepository {
    async fn list(&self, user_id: UserId) -> AppResult<Vec<RecoveryCodeRecord>> {
        let rows = sqlx::query_as::<_, RecoveryCodeRow>(
            "SELECT id, code_hash, used_at FROM mfa_recovery_codes WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list recovery codes: {error}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| RecoveryCodeRecord {
                id: row.id,
                code_hash: row.code_hash,
                used_at: row.used_at,
            })
            .collect())
    }

    async fn mark_used(&self, code_id: uuid::Uuid) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE mfa_recovery_codes SET used_at = NOW() WHERE id = $1 AND used_at IS NULL",
        )
        .bind(code_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to mark recovery code used: {error}"))
        })?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("recovery code not found".to_owned()));
        }
        Ok(())
    }

    async fn replace_all(&self, user_id: UserId, code_hashes: &[String]) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to open transaction: {error}"))
        })?;

        sqlx::query("DELETE FROM mfa_recovery_codes WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to clear recovery codes: {error}"))
            })?;

        for code_hash in code_hashes {
            sqlx::query("INSERT INTO mfa_recovery_codes (user_id, code_hash) VALUES ($1, $2)")
                .bind(user_id.as_uuid())
                .bind(code_hash)
                .execute(&mut *tx)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to insert recovery code: {error}"))
                })?;
        }

        tx.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit recovery code replacement: {error}"))
        })
    }
}

/// PostgreSQL implementation of the tombstone repository port.
#[derive(Clone)]
pub struct PostgresTombstoneRepository {
    pool: PgPool,
}

impl PostgresTombstoneRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TombstoneRepository for PostgresTombstoneRepository {
    async fn exists(&self, kind: TombstoneKind, identifier_hmac: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM deletion_tombstones
                WHERE identifier_type = $1 AND identifier_hmac = $2
            )
            "#,
        )
        .bind(kind.as_str())
        .bind(identifier_hmac)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to check tombstone: {error}")))
    }

    async fn purge_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM deletion_tombstones WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to purge tombstones: {error}"))
            })?;
        Ok(deleted.rows_affected())
    }
}

/// PostgreSQL implementation of the login-attempt repository port.
#[derive(Clone)]
pub struct PostgresLoginAttemptRepository {
    pool: PgPool,
}

impl PostgresLoginAttemptRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptRepository for PostgresLoginAttemptRepository {
    async fn record(
        &self,
        email: &str,
        user_id: Option<UserId>,
        success: bool,
        reason: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (email, user_id, success, reason)
            VALUES (LOWER($1), $2, $3, $4)
            "#,
        )
        .bind(email)
        .bind(user_id.map(|id| id.as_uuid()))
        .bind(success)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to record login attempt: {error}"))
        })?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM login_attempts WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to purge login attempts: {error}"))
            })?;
        Ok(deleted.rows_affected())
    }
}
